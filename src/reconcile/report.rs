use crate::error::{InstallerError, Result};
use crate::profile::{Application, ProfileEntry};
use crate::reconcile::applier::{ApplyOutcome, UninstallOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// An offered entry that had no target folder for the chosen applications.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub application: Application,
    pub category: String,
    pub file_name: String,
}

impl From<&ProfileEntry> for SkippedEntry {
    fn from(entry: &ProfileEntry) -> Self {
        Self {
            application: entry.application,
            category: entry.category_label().to_string(),
            file_name: entry.file_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub applications: Vec<Application>,
    pub base_directory: PathBuf,
    pub sha256: String,
    pub filament_found: usize,
    pub process_found: usize,
    pub copied: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub unplaceable: Vec<SkippedEntry>,
    pub errors: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl InstallReport {
    pub fn has_issues(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Fields of an [`InstallReport`] known before the apply stage runs.
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub applications: Vec<Application>,
    pub base_directory: PathBuf,
    pub sha256: String,
    pub filament_found: usize,
    pub process_found: usize,
}

impl InstallContext {
    pub fn into_report(self, outcome: ApplyOutcome, unplaceable: &[ProfileEntry]) -> InstallReport {
        InstallReport {
            applications: self.applications,
            base_directory: self.base_directory,
            sha256: self.sha256,
            filament_found: self.filament_found,
            process_found: self.process_found,
            copied: outcome.copied,
            removed: outcome.removed,
            unplaceable: unplaceable.iter().map(SkippedEntry::from).collect(),
            errors: outcome.errors,
            finished_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UninstallReport {
    pub deleted: usize,
    pub total: usize,
    pub would_delete: usize,
    pub missing: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

impl UninstallReport {
    pub fn has_issues(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl From<UninstallOutcome> for UninstallReport {
    fn from(outcome: UninstallOutcome) -> Self {
        Self {
            deleted: outcome.deleted,
            total: outcome.total,
            would_delete: outcome.would_delete,
            missing: outcome.missing,
            failed: outcome.failed,
            errors: outcome.errors,
            dry_run: outcome.dry_run,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub sha256: String,
    pub url: String,
    pub filament: usize,
    pub process: usize,
    pub marker_path: Option<PathBuf>,
}

impl CheckReport {
    pub fn marker_contents(&self) -> String {
        format!(
            "OK\nsha256={}\nurl={}\nfilament={}\nprocess={}\n",
            self.sha256, self.url, self.filament, self.process
        )
    }

    /// Write the download-check marker. The marker is informational, so callers usually
    /// only log a failure.
    pub fn write_marker(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| InstallerError::file_op(parent, e))?;
        }
        let mut file = fs::File::create(path).map_err(|e| InstallerError::file_op(path, e))?;
        file.write_all(self.marker_contents().as_bytes())
            .map_err(|e| InstallerError::file_op(path, e))?;
        Ok(())
    }
}

/// One row of `--list` output.
#[derive(Debug, Clone, Serialize)]
pub struct ListedProfile {
    pub application: Application,
    pub category: String,
    pub file_name: String,
    pub destination: Option<PathBuf>,
}
