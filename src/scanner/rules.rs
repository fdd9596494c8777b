use crate::profile::{Application, Category};
use std::path::Path;

/// One row of the classification table.
///
/// A path matches when one of its directory segments equals an application marker and
/// its extension is in `extensions`. The category is taken from the first entry of
/// `categories` whose marker is also a directory segment.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub application: Application,
    pub application_markers: &'static [&'static str],
    pub extensions: &'static [&'static str],
    pub categories: &'static [(&'static str, Category)],
}

const PRUSA_EXTENSIONS: &[&str] = &["ini"];
const JSON_EXTENSIONS: &[&str] = &["json", "jso"];

pub const DEFAULT_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        application: Application::PrusaSlicer,
        application_markers: &["prusaslicer"],
        extensions: PRUSA_EXTENSIONS,
        categories: &[("filament", Category::Filament), ("print", Category::Process)],
    },
    ClassificationRule {
        application: Application::OrcaSlicer,
        application_markers: &["orcaslicer"],
        extensions: JSON_EXTENSIONS,
        categories: &[("filament", Category::Filament), ("process", Category::Process)],
    },
    ClassificationRule {
        application: Application::BambuStudio,
        application_markers: &["bambustudio", "bambu studio"],
        extensions: JSON_EXTENSIONS,
        categories: &[("filament", Category::Filament), ("process", Category::Process)],
    },
];

/// Outcome of matching a single path against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Profile(Application, Category),
    /// An application rule claimed the file but no category folder matched.
    Uncategorized(Application),
    Unrecognized,
}

impl Classification {
    pub fn profile(self) -> Option<(Application, Category)> {
        match self {
            Classification::Profile(app, cat) => Some((app, cat)),
            _ => None,
        }
    }
}

pub struct RuleTable {
    rules: Vec<ClassificationRule>,
}

impl RuleTable {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// Classify a path relative to the archive root.
    ///
    /// Separators are normalized and matching is case-insensitive. Rules are tried in
    /// order and the first one whose application marker and extension both match decides.
    pub fn classify(&self, relative_path: &Path) -> Classification {
        self.classify_str(&relative_path.to_string_lossy())
    }

    pub fn classify_str(&self, relative_path: &str) -> Classification {
        let normalized = normalize(relative_path);
        let mut segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();

        let file_name = match segments.pop() {
            Some(name) => name,
            None => return Classification::Unrecognized,
        };
        let extension = match file_name.rsplit_once('.') {
            Some((_, ext)) => ext,
            None => return Classification::Unrecognized,
        };

        for rule in &self.rules {
            let app_match = segments
                .iter()
                .any(|seg| rule.application_markers.contains(seg));
            if !app_match || !rule.extensions.contains(&extension) {
                continue;
            }

            return rule
                .categories
                .iter()
                .find(|(marker, _)| segments.contains(marker))
                .map(|(_, category)| Classification::Profile(rule.application, *category))
                .unwrap_or(Classification::Uncategorized(rule.application));
        }

        Classification::Unrecognized
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.to_vec())
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}
