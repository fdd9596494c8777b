use crate::error::{InstallerError, Result};
use crate::reconcile::planner::{CopyOp, Plan};
use crate::state::InstalledSetStore;
use serde::Serialize;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ApplyProgress {
    pub files_processed: usize,
    pub total_files: usize,
    pub bytes_processed: u64,
    pub current_file: Option<String>,
    pub start_time: Instant,
}

impl ApplyProgress {
    pub fn new(total_files: usize) -> Self {
        Self {
            files_processed: 0,
            total_files,
            bytes_processed: 0,
            current_file: None,
            start_time: Instant::now(),
        }
    }

    pub fn update_file(&mut self, filename: String, bytes: u64) {
        self.files_processed += 1;
        self.bytes_processed += bytes;
        self.current_file = Some(filename);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn estimated_remaining(&self) -> Duration {
        if self.files_processed == 0 {
            return Duration::from_secs(0);
        }

        let rate = self.files_processed as f64 / self.elapsed().as_secs_f64();
        let remaining_files = self.total_files.saturating_sub(self.files_processed);

        if rate > 0.0 {
            Duration::from_secs_f64(remaining_files as f64 / rate)
        } else {
            Duration::from_secs(0)
        }
    }
}

/// What an apply run actually did. Only paths in `copied` were recorded as owned.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyOutcome {
    pub copied: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub bytes_copied: u64,
    pub errors: Vec<String>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UninstallOutcome {
    pub deleted: usize,
    pub total: usize,
    pub would_delete: usize,
    pub missing: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

pub struct Applier {
    store: InstalledSetStore,
    preserve_mtime: bool,
    buffer_size: usize,
    running: Arc<AtomicBool>,
}

impl Applier {
    pub fn new(store: InstalledSetStore) -> Self {
        Self {
            store,
            preserve_mtime: true,
            buffer_size: 64 * 1024,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_preserve_mtime(mut self, preserve: bool) -> Self {
        self.preserve_mtime = preserve;
        self
    }

    /// Copies stop early once this flag turns false.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn store(&self) -> &InstalledSetStore {
        &self.store
    }

    /// Execute `plan`: deletes first (best-effort), then copies in plan order.
    ///
    /// Ownership is recorded in two steps so the store never lists a file that was not
    /// written: removed paths right after the delete pass, copied paths after the copy
    /// pass (including a cancelled one).
    pub fn apply(
        &self,
        plan: &Plan,
        progress_callback: Option<&dyn Fn(&ApplyProgress)>,
    ) -> Result<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();

        for path in &plan.deletes {
            match fs::remove_file(path) {
                Ok(()) => {
                    info!(path = %path.display(), "removed deselected profile");
                    outcome.removed.push(path.clone());
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove deselected profile");
                    outcome
                        .errors
                        .push(format!("Failed to remove {}: {}", path.display(), e));
                }
            }
        }

        if !outcome.removed.is_empty() {
            self.store
                .update(outcome.removed.iter(), std::iter::empty::<&Path>())?;
        }

        let mut progress = ApplyProgress::new(plan.copies.len());

        for op in &plan.copies {
            if !self.running.load(Ordering::SeqCst) {
                warn!(
                    remaining = plan.copies.len() - progress.files_processed,
                    "install interrupted, remaining copies skipped"
                );
                outcome.cancelled = true;
                break;
            }

            if let Some(callback) = progress_callback {
                callback(&progress);
            }

            match self.copy_profile(op) {
                Ok(bytes) => {
                    info!(source = %op.source.display(), destination = %op.destination.display(), "copied profile");
                    outcome.copied.push(op.destination.clone());
                    outcome.bytes_copied += bytes;
                    progress.update_file(display_name(&op.destination), bytes);
                }
                Err(e) => {
                    warn!(destination = %op.destination.display(), error = %e, "copy failed");
                    outcome.errors.push(format!(
                        "Failed to copy {} to {}: {}",
                        op.source.display(),
                        op.destination.display(),
                        e
                    ));
                    progress.update_file(display_name(&op.destination), 0);
                }
            }
        }

        if let Some(callback) = progress_callback {
            callback(&progress);
        }

        if !outcome.copied.is_empty() {
            self.store
                .update(std::iter::empty::<&Path>(), outcome.copied.iter())?;
        }

        Ok(outcome)
    }

    /// Remove every owned file that is still present.
    ///
    /// Successfully deleted paths and paths that no longer exist as regular files are
    /// dropped from the store; paths that failed to delete stay tracked. A dry run only
    /// reports and never touches the store.
    pub fn uninstall_all(&self, dry_run: bool) -> Result<UninstallOutcome> {
        let owned = self.store.load();
        let mut outcome = UninstallOutcome {
            total: owned.len(),
            dry_run,
            ..Default::default()
        };
        let mut dropped: Vec<&PathBuf> = Vec::new();

        for path in &owned {
            if !path.is_file() {
                if path.exists() {
                    warn!(
                        path = %path.display(),
                        "uninstall: no longer a regular file, left in place and untracked"
                    );
                } else {
                    info!(path = %path.display(), "uninstall: not found");
                }
                outcome.missing.push(path.clone());
                dropped.push(path);
                continue;
            }

            if dry_run {
                info!(path = %path.display(), "uninstall: would remove");
                outcome.would_delete += 1;
                continue;
            }

            match fs::remove_file(path) {
                Ok(()) => {
                    info!(path = %path.display(), "uninstall: removed");
                    outcome.deleted += 1;
                    dropped.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "uninstall: failed to remove");
                    outcome
                        .errors
                        .push(format!("Failed to remove {}: {}", path.display(), e));
                    outcome.failed.push(path.clone());
                }
            }
        }

        if !dry_run {
            self.store.update(dropped, std::iter::empty::<&Path>())?;
        }

        Ok(outcome)
    }

    fn copy_profile(&self, op: &CopyOp) -> Result<u64> {
        if !op.source.is_file() {
            return Err(InstallerError::file_op(
                &op.source,
                std::io::Error::new(std::io::ErrorKind::NotFound, "source profile missing"),
            ));
        }

        if let Some(parent) = op.destination.parent() {
            fs::create_dir_all(parent).map_err(|e| InstallerError::file_op(parent, e))?;
        }

        self.copy_file_with_buffer(&op.source, &op.destination)
    }

    fn copy_file_with_buffer(&self, source: &Path, dest: &Path) -> Result<u64> {
        let source_file = fs::File::open(source).map_err(|e| InstallerError::file_op(source, e))?;
        let dest_file = fs::File::create(dest).map_err(|e| InstallerError::file_op(dest, e))?;

        let mut reader = BufReader::with_capacity(self.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.buffer_size, dest_file);

        let mut total_bytes = 0u64;
        let mut buffer = vec![0u8; 8192];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| InstallerError::file_op(source, e))?;
            if bytes_read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| InstallerError::file_op(dest, e))?;
            total_bytes += bytes_read as u64;
        }

        writer.flush().map_err(|e| InstallerError::file_op(dest, e))?;

        if self.preserve_mtime {
            if let Ok(modified) = fs::metadata(source).and_then(|m| m.modified()) {
                let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(modified));
            }
        }

        Ok(total_bytes)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Application, Category, ProfileEntry, TargetLayout};
    use crate::reconcile::planner::ReconciliationPlanner;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        extract: PathBuf,
        base: PathBuf,
        store: InstalledSetStore,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let extract = temp.path().join("extract");
        let base = temp.path().join("base");
        fs::create_dir_all(&extract).unwrap();
        let store = InstalledSetStore::new(temp.path().join("cache").join("installed_files.txt"));
        Fixture {
            _temp: temp,
            extract,
            base,
            store,
        }
    }

    fn source(fx: &Fixture, rel: &str, content: &str) -> ProfileEntry {
        let path = fx.extract.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        ProfileEntry::new(Application::PrusaSlicer, Category::Filament, path)
    }

    #[test]
    fn test_apply_copies_and_records_ownership() {
        let fx = fixture();
        let entries = vec![
            source(&fx, "PrusaSlicer/filament/PrusaA.ini", "a"),
            source(&fx, "PrusaSlicer/filament/PrusaB.ini", "b"),
        ];
        let layout = TargetLayout::for_applications(&fx.base, &[Application::PrusaSlicer]);
        let plan = ReconciliationPlanner::new(layout.clone()).plan(&entries, |_| true);

        let applier = Applier::new(fx.store.clone());
        let outcome = applier.apply(&plan, None).unwrap();

        assert_eq!(outcome.copied.len(), 2);
        assert!(outcome.removed.is_empty());
        assert!(outcome.errors.is_empty());
        let a_dest = layout.destination_for(&entries[0]).unwrap();
        assert_eq!(fs::read_to_string(&a_dest).unwrap(), "a");
        assert_eq!(fx.store.load().len(), 2);
        assert!(fx.store.load().contains(&a_dest));
    }

    #[test]
    fn test_apply_twice_is_idempotent() {
        let fx = fixture();
        let entries = vec![source(&fx, "PrusaSlicer/filament/PLA.ini", "pla")];
        let layout = TargetLayout::for_applications(&fx.base, &[Application::PrusaSlicer]);
        let planner = ReconciliationPlanner::new(layout);
        let applier = Applier::new(fx.store.clone());

        applier.apply(&planner.plan(&entries, |_| true), None).unwrap();
        let first = fx.store.load();

        let second_plan = planner.plan(&entries, |_| true);
        assert!(second_plan.deletes.is_empty());
        let outcome = applier.apply(&second_plan, None).unwrap();

        assert_eq!(outcome.copied.len(), 1);
        assert!(outcome.errors.is_empty());
        assert_eq!(fx.store.load(), first);
    }

    #[test]
    fn test_deselection_removes_file_and_ownership() {
        let fx = fixture();
        let entries = vec![
            source(&fx, "PrusaSlicer/filament/PrusaA.ini", "a"),
            source(&fx, "PrusaSlicer/filament/PrusaB.ini", "b"),
        ];
        let layout = TargetLayout::for_applications(&fx.base, &[Application::PrusaSlicer]);
        let planner = ReconciliationPlanner::new(layout.clone());
        let applier = Applier::new(fx.store.clone());
        applier.apply(&planner.plan(&entries, |_| true), None).unwrap();

        let a_dest = layout.destination_for(&entries[0]).unwrap();
        let b_dest = layout.destination_for(&entries[1]).unwrap();

        let plan = planner.plan(&entries, |e| e.file_name == "PrusaA.ini");
        let outcome = applier.apply(&plan, None).unwrap();

        assert_eq!(outcome.removed, vec![b_dest.clone()]);
        assert!(!b_dest.exists());
        assert!(a_dest.exists());
        let owned = fx.store.load();
        assert!(owned.contains(&a_dest));
        assert!(!owned.contains(&b_dest));
    }

    #[test]
    fn test_overwrites_existing_destination() {
        let fx = fixture();
        let entries = vec![source(&fx, "PrusaSlicer/filament/PLA.ini", "new")];
        let layout = TargetLayout::for_applications(&fx.base, &[Application::PrusaSlicer]);
        let dest = layout.destination_for(&entries[0]).unwrap();
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, "user edited").unwrap();

        let plan = ReconciliationPlanner::new(layout).plan(&entries, |_| true);
        Applier::new(fx.store.clone()).apply(&plan, None).unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
    }

    #[test]
    fn test_failed_copy_is_not_owned() {
        let fx = fixture();
        let good = source(&fx, "PrusaSlicer/filament/Good.ini", "g");
        let layout = TargetLayout::for_applications(&fx.base, &[Application::PrusaSlicer]);
        let good_dest = layout.destination_for(&good).unwrap();
        let missing_source = fx.extract.join("PrusaSlicer/filament/Gone.ini");
        let missing_dest = good_dest.with_file_name("Gone.ini");

        let plan = Plan {
            copies: vec![
                CopyOp {
                    source: good.source_path.clone(),
                    destination: good_dest.clone(),
                },
                CopyOp {
                    source: missing_source,
                    destination: missing_dest.clone(),
                },
            ],
            ..Default::default()
        };

        let outcome = Applier::new(fx.store.clone()).apply(&plan, None).unwrap();
        assert_eq!(outcome.copied, vec![good_dest.clone()]);
        assert_eq!(outcome.errors.len(), 1);

        let owned = fx.store.load();
        assert!(owned.contains(&good_dest));
        assert!(!owned.contains(&missing_dest));
    }

    #[test]
    fn test_cancelled_apply_records_only_written_files() {
        let fx = fixture();
        let entries = vec![
            source(&fx, "PrusaSlicer/filament/A.ini", "a"),
            source(&fx, "PrusaSlicer/filament/B.ini", "b"),
        ];
        let layout = TargetLayout::for_applications(&fx.base, &[Application::PrusaSlicer]);
        let plan = ReconciliationPlanner::new(layout).plan(&entries, |_| true);

        let running = Arc::new(AtomicBool::new(true));
        let applier = Applier::new(fx.store.clone()).with_running_flag(running.clone());
        let calls = Cell::new(0);
        let stop_after_first = |progress: &ApplyProgress| {
            calls.set(calls.get() + 1);
            if progress.files_processed == 1 {
                running.store(false, Ordering::SeqCst);
            }
        };

        let outcome = applier.apply(&plan, Some(&stop_after_first)).unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.copied.len(), 1);
        assert_eq!(fx.store.load().len(), 1);
        assert!(calls.get() >= 2);
    }

    #[test]
    fn test_uninstall_drops_deleted_and_missing() {
        let fx = fixture();
        let x = fx.base.join("PrusaSlicer/filament/X.ini");
        let y = fx.base.join("PrusaSlicer/filament/Y.ini");
        fs::create_dir_all(x.parent().unwrap()).unwrap();
        fs::write(&x, "x").unwrap();
        fx.store
            .update(std::iter::empty::<&Path>(), [&x, &y])
            .unwrap();

        let applier = Applier::new(fx.store.clone());
        let outcome = applier.uninstall_all(false).unwrap();

        assert_eq!((outcome.deleted, outcome.total), (1, 2));
        assert_eq!(outcome.missing, vec![y]);
        assert!(!x.exists());
        assert!(fx.store.load().is_empty());
    }

    #[test]
    fn test_uninstall_leaves_directory_at_tracked_path() {
        let fx = fixture();
        let replaced = fx.base.join("PrusaSlicer/filament/Replaced.ini");
        fs::create_dir_all(replaced.join("inner")).unwrap();
        fx.store
            .update(std::iter::empty::<&Path>(), [&replaced])
            .unwrap();

        let outcome = Applier::new(fx.store.clone()).uninstall_all(false).unwrap();

        assert_eq!((outcome.deleted, outcome.total), (0, 1));
        assert_eq!(outcome.missing, vec![replaced.clone()]);
        assert!(outcome.errors.is_empty());
        assert!(replaced.join("inner").is_dir());
        assert!(fx.store.load().is_empty());
    }

    #[test]
    fn test_uninstall_dry_run_changes_nothing() {
        let fx = fixture();
        let x = fx.base.join("OrcaSlicer/user/default/filament/X.json");
        fs::create_dir_all(x.parent().unwrap()).unwrap();
        fs::write(&x, "x").unwrap();
        fx.store.update(std::iter::empty::<&Path>(), [&x]).unwrap();

        let outcome = Applier::new(fx.store.clone()).uninstall_all(true).unwrap();

        assert_eq!(outcome.deleted, 0);
        assert_eq!(outcome.would_delete, 1);
        assert_eq!(outcome.total, 1);
        assert!(x.exists());
        assert_eq!(fx.store.load().len(), 1);
    }

    #[test]
    fn test_uninstall_keeps_paths_that_fail_to_delete() {
        let fx = fixture();
        // read-only parent directory makes remove_file fail
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let locked_dir = fx.base.join("locked");
            let z = locked_dir.join("Z.ini");
            fs::create_dir_all(&locked_dir).unwrap();
            fs::write(&z, "z").unwrap();
            fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o555)).unwrap();
            fx.store.update(std::iter::empty::<&Path>(), [&z]).unwrap();

            let outcome = Applier::new(fx.store.clone()).uninstall_all(false).unwrap();
            fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o755)).unwrap();

            // root can delete regardless of permissions
            if outcome.deleted == 0 {
                assert_eq!(outcome.failed, vec![z.clone()]);
                assert!(fx.store.load().contains(&z));
            } else {
                assert!(fx.store.load().is_empty());
            }
        }
    }

    #[test]
    fn test_progress_tracking() {
        let mut progress = ApplyProgress::new(10);
        assert_eq!(progress.estimated_remaining(), Duration::from_secs(0));

        progress.update_file("PLA.ini".to_string(), 100);
        assert_eq!(progress.files_processed, 1);
        assert_eq!(progress.bytes_processed, 100);
        assert_eq!(progress.current_file.as_deref(), Some("PLA.ini"));
    }
}
