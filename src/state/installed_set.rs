use crate::error::{InstallerError, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Destination paths this tool wrote and still considers its own.
pub type OwnedFileSet = BTreeSet<PathBuf>;

/// Plain-text record of owned files: one absolute path per line, no header.
///
/// A missing or unreadable state file loads as an empty set. Saves write a complete
/// temporary file next to the state file and rename it into place.
#[derive(Debug, Clone)]
pub struct InstalledSetStore {
    path: PathBuf,
}

impl InstalledSetStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> OwnedFileSet {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "state file unreadable, treating as empty");
                }
                return OwnedFileSet::new();
            }
        };

        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    pub fn save(&self, set: &OwnedFileSet) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| InstallerError::file_op(&parent, e))?;

        let mut tmp =
            NamedTempFile::new_in(&parent).map_err(|e| InstallerError::file_op(&parent, e))?;
        for path in set {
            writeln!(tmp, "{}", path.display())
                .map_err(|e| InstallerError::file_op(tmp.path(), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| InstallerError::file_op(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| InstallerError::file_op(&self.path, e.error))?;

        debug!(path = %self.path.display(), entries = set.len(), "saved owned file set");
        Ok(())
    }

    /// Load, discard `removed`, add `added`, persist. Returns the new set.
    ///
    /// An added path wins over a simultaneous removal of the same path.
    pub fn update<R, A>(&self, removed: R, added: A) -> Result<OwnedFileSet>
    where
        R: IntoIterator,
        R::Item: AsRef<Path>,
        A: IntoIterator,
        A::Item: AsRef<Path>,
    {
        let mut current = self.load();
        for path in removed {
            current.remove(path.as_ref());
        }
        for path in added {
            current.insert(path.as_ref().to_path_buf());
        }
        self.save(&current)?;
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> InstalledSetStore {
        InstalledSetStore::new(dir.path().join("state").join("installed_files.txt"))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(store_in(&temp_dir).load().is_empty());
    }

    #[test]
    fn test_update_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        store
            .update(Vec::<PathBuf>::new(), [PathBuf::from("/a/one.ini")])
            .unwrap();
        let after = store
            .update(
                Vec::<PathBuf>::new(),
                [PathBuf::from("/a/two.ini"), PathBuf::from("/a/one.ini")],
            )
            .unwrap();

        let loaded = store.load();
        assert_eq!(loaded, after);
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains(Path::new("/a/one.ini")));
        assert!(loaded.contains(Path::new("/a/two.ini")));
    }

    #[test]
    fn test_update_removes_then_adds() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        store
            .update(
                Vec::<PathBuf>::new(),
                [PathBuf::from("/x.json"), PathBuf::from("/y.json")],
            )
            .unwrap();

        let set = store
            .update([PathBuf::from("/x.json")], [PathBuf::from("/z.json")])
            .unwrap();
        assert_eq!(
            set.into_iter().collect::<Vec<_>>(),
            vec![PathBuf::from("/y.json"), PathBuf::from("/z.json")]
        );

        // added wins over removed for the same path
        let set = store
            .update([PathBuf::from("/y.json")], [PathBuf::from("/y.json")])
            .unwrap();
        assert!(set.contains(Path::new("/y.json")));
    }

    #[test]
    fn test_file_format_is_one_path_per_line() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        store
            .update(
                Vec::<PathBuf>::new(),
                [PathBuf::from("/b/2.ini"), PathBuf::from("/a/1.ini")],
            )
            .unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "/a/1.ini\n/b/2.ini\n");
    }

    #[test]
    fn test_blank_lines_and_whitespace_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "\n  /p/a.ini  \n\n/p/a.ini\n").unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
    }
}
