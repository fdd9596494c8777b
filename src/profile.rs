use crate::error::{InstallerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Slicer applications whose configuration folders receive profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Application {
    PrusaSlicer,
    OrcaSlicer,
    BambuStudio,
}

impl Application {
    pub const ALL: [Application; 3] = [
        Application::PrusaSlicer,
        Application::OrcaSlicer,
        Application::BambuStudio,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Application::PrusaSlicer => "PrusaSlicer",
            Application::OrcaSlicer => "OrcaSlicer",
            Application::BambuStudio => "BambuStudio",
        }
    }

    /// Name of the process category folder for this application.
    pub fn process_label(&self) -> &'static str {
        match self {
            Application::PrusaSlicer => "print",
            Application::OrcaSlicer | Application::BambuStudio => "process",
        }
    }

    fn profile_root(&self, base: &Path) -> PathBuf {
        match self {
            Application::PrusaSlicer => base.join("PrusaSlicer"),
            Application::OrcaSlicer => base.join("OrcaSlicer").join("user").join("default"),
            Application::BambuStudio => base.join("BambuStudio").join("user").join("default"),
        }
    }

    pub fn target_directory(&self, base: &Path, category: Category) -> PathBuf {
        self.profile_root(base).join(category.dir_name(*self))
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Application {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prusaslicer" | "prusa" => Ok(Application::PrusaSlicer),
            "orcaslicer" | "orca" => Ok(Application::OrcaSlicer),
            "bambustudio" | "bambu studio" | "bambu" => Ok(Application::BambuStudio),
            other => Err(format!(
                "Unknown slicer '{}'. Expected one of: PrusaSlicer, OrcaSlicer, BambuStudio",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Filament,
    Process,
}

impl Category {
    pub fn dir_name(&self, application: Application) -> &'static str {
        match self {
            Category::Filament => "filament",
            Category::Process => application.process_label(),
        }
    }
}

/// A profile discovered in an extracted archive.
///
/// Identity is `(application, category, file_name)`; `source_path` points into the
/// transient extraction directory and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub application: Application,
    pub category: Category,
    pub source_path: PathBuf,
    pub file_name: String,
}

impl ProfileEntry {
    pub fn new(application: Application, category: Category, source_path: PathBuf) -> Self {
        let file_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            application,
            category,
            source_path,
            file_name,
        }
    }

    /// Category tag as shown to users: `filament`, `print` or `process`.
    pub fn category_label(&self) -> &'static str {
        self.category.dir_name(self.application)
    }
}

/// Mapping from `(application, category)` to the destination folder, restricted to the
/// applications the user enabled.
#[derive(Debug, Clone, Default)]
pub struct TargetLayout {
    directories: BTreeMap<(Application, Category), PathBuf>,
}

impl TargetLayout {
    pub fn for_applications<P: Into<PathBuf>>(base: P, applications: &[Application]) -> Self {
        let base = base.into();
        let mut directories = BTreeMap::new();
        for app in applications {
            for category in [Category::Filament, Category::Process] {
                directories.insert((*app, category), app.target_directory(&base, category));
            }
        }
        Self { directories }
    }

    pub fn target_directory(&self, application: Application, category: Category) -> Option<&Path> {
        self.directories
            .get(&(application, category))
            .map(PathBuf::as_path)
    }

    /// Destination path for an entry, or `None` when the entry is unplaceable.
    pub fn destination_for(&self, entry: &ProfileEntry) -> Option<PathBuf> {
        self.target_directory(entry.application, entry.category)
            .map(|dir| dir.join(&entry.file_name))
    }

}

/// Platform per-user application-data root: Roaming AppData, `~/Library/Application Support`
/// or `$XDG_CONFIG_HOME` (`~/.config`).
pub fn default_base_directory() -> Result<PathBuf> {
    dirs::config_dir().ok_or_else(|| InstallerError::Config {
        message: "Could not determine the per-user configuration directory".to_string(),
    })
}

/// Applications that look installed under `base`: a target folder or its parent exists.
pub fn detect_applications(base: &Path) -> Vec<Application> {
    Application::ALL
        .iter()
        .copied()
        .filter(|app| {
            [Category::Filament, Category::Process].iter().any(|cat| {
                let dir = app.target_directory(base, *cat);
                dir.exists() || dir.parent().is_some_and(|p| p.exists())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_target_directories() {
        let base = Path::new("/base");
        assert_eq!(
            Application::PrusaSlicer.target_directory(base, Category::Process),
            PathBuf::from("/base/PrusaSlicer/print")
        );
        assert_eq!(
            Application::OrcaSlicer.target_directory(base, Category::Filament),
            PathBuf::from("/base/OrcaSlicer/user/default/filament")
        );
        assert_eq!(
            Application::BambuStudio.target_directory(base, Category::Process),
            PathBuf::from("/base/BambuStudio/user/default/process")
        );
    }

    #[test]
    fn test_application_parsing() {
        assert_eq!("prusa".parse::<Application>(), Ok(Application::PrusaSlicer));
        assert_eq!("OrcaSlicer".parse::<Application>(), Ok(Application::OrcaSlicer));
        assert_eq!(
            "Bambu Studio".parse::<Application>(),
            Ok(Application::BambuStudio)
        );
        assert!("cura".parse::<Application>().is_err());
    }

    #[test]
    fn test_layout_excludes_disabled_applications() {
        let layout = TargetLayout::for_applications("/base", &[Application::OrcaSlicer]);
        let entry = ProfileEntry::new(
            Application::PrusaSlicer,
            Category::Filament,
            PathBuf::from("/tmp/x/PrusaSlicer/filament/PLA.ini"),
        );
        assert!(layout.destination_for(&entry).is_none());
        assert!(layout
            .target_directory(Application::OrcaSlicer, Category::Filament)
            .is_some());
        assert!(layout
            .target_directory(Application::BambuStudio, Category::Process)
            .is_none());
    }

    #[test]
    fn test_category_label() {
        let entry = ProfileEntry::new(
            Application::PrusaSlicer,
            Category::Process,
            PathBuf::from("0.20mm.ini"),
        );
        assert_eq!(entry.category_label(), "print");
        assert_eq!(entry.file_name, "0.20mm.ini");
    }

    #[test]
    fn test_default_base_directory_follows_platform_config_dir() {
        match dirs::config_dir() {
            Some(dir) => assert_eq!(default_base_directory().unwrap(), dir),
            None => assert!(matches!(
                default_base_directory(),
                Err(InstallerError::Config { .. })
            )),
        }
    }

    #[test]
    fn test_detect_applications() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        assert!(detect_applications(base).is_empty());

        std::fs::create_dir_all(base.join("OrcaSlicer/user/default")).unwrap();
        std::fs::create_dir_all(base.join("PrusaSlicer")).unwrap();
        assert_eq!(
            detect_applications(base),
            vec![Application::PrusaSlicer, Application::OrcaSlicer]
        );
    }
}
