use crate::error::{InstallerError, Result};
use crate::profile::{Application, Category, ProfileEntry};
use crate::scanner::rules::{Classification, RuleTable};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Classified contents of an extracted archive, split the way they are offered to users.
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    pub filament: Vec<ProfileEntry>,
    pub process: Vec<ProfileEntry>,
}

impl ProfileCatalog {
    pub fn is_empty(&self) -> bool {
        self.filament.is_empty() && self.process.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filament.len() + self.process.len()
    }

    /// Filament entries followed by process entries.
    pub fn entries(&self) -> impl Iterator<Item = &ProfileEntry> {
        self.filament.iter().chain(self.process.iter())
    }

    pub fn statistics(&self) -> CatalogStatistics {
        let mut by_application: BTreeMap<Application, (usize, usize)> = BTreeMap::new();
        for entry in self.entries() {
            let counts = by_application.entry(entry.application).or_insert((0, 0));
            match entry.category {
                Category::Filament => counts.0 += 1,
                Category::Process => counts.1 += 1,
            }
        }
        CatalogStatistics {
            filament: self.filament.len(),
            process: self.process.len(),
            by_application,
        }
    }
}

#[derive(Debug, Default)]
pub struct CatalogStatistics {
    pub filament: usize,
    pub process: usize,
    pub by_application: BTreeMap<Application, (usize, usize)>,
}

impl CatalogStatistics {
    pub fn display_summary(&self) -> String {
        let mut summary = format!(
            "Profiles found:\n  Filament: {}\n  Print/process: {}\n",
            self.filament, self.process
        );
        for (app, (filament, process)) in &self.by_application {
            summary.push_str(&format!(
                "  {}: {} filament, {} {}\n",
                app,
                filament,
                process,
                app.process_label()
            ));
        }
        summary
    }
}

pub struct ProfileScanner {
    rules: RuleTable,
    max_depth: usize,
}

impl ProfileScanner {
    pub fn new(rules: RuleTable) -> Self {
        Self {
            rules,
            max_depth: 32,
        }
    }

    /// Walk every regular file under `root` and classify it.
    ///
    /// Entries keep traversal order. Files matching no rule are skipped; unreadable
    /// directory entries are logged and skipped. An archive with no profiles at all is
    /// reported as [`InstallerError::ClassificationEmpty`].
    pub fn scan_directory<P: AsRef<Path>>(&self, root: P) -> Result<ProfileCatalog> {
        let root_path = root.as_ref();

        if !root_path.is_dir() {
            return Err(InstallerError::Config {
                message: format!("{} is not a directory", root_path.display()),
            });
        }

        let mut catalog = ProfileCatalog::default();

        let walker = WalkDir::new(root_path)
            .max_depth(self.max_depth)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable archive entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(root_path) {
                Ok(rel) => rel,
                Err(_) => continue,
            };

            match self.rules.classify(relative) {
                Classification::Profile(application, category) => {
                    let profile =
                        ProfileEntry::new(application, category, entry.path().to_path_buf());
                    match category {
                        Category::Filament => catalog.filament.push(profile),
                        Category::Process => catalog.process.push(profile),
                    }
                }
                Classification::Uncategorized(application) => {
                    debug!(path = %relative.display(), %application, "no category folder, ignored");
                }
                Classification::Unrecognized => {}
            }
        }

        if catalog.is_empty() {
            return Err(InstallerError::ClassificationEmpty {
                root: root_path.to_path_buf(),
            });
        }

        Ok(catalog)
    }

    /// Classify a list of relative paths without touching the filesystem.
    pub fn classify_paths<I, P>(&self, source_root: &Path, paths: I) -> ProfileCatalog
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut catalog = ProfileCatalog::default();
        for path in paths {
            let relative: PathBuf = path.into();
            if let Some((application, category)) = self.rules.classify(&relative).profile() {
                let profile = ProfileEntry::new(application, category, source_root.join(&relative));
                match category {
                    Category::Filament => catalog.filament.push(profile),
                    Category::Process => catalog.process.push(profile),
                }
            }
        }
        catalog
    }
}

impl Default for ProfileScanner {
    fn default() -> Self {
        Self::new(RuleTable::default())
    }
}
