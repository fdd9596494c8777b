use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallerError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Archive integrity check failed: {message}")]
    Integrity { message: String },

    #[error("No profiles found in archive")]
    ClassificationEmpty { root: PathBuf },

    #[error("No target directory for {application} {category} profile: {file_name}")]
    UnplaceableEntry {
        application: String,
        category: String,
        file_name: String,
    },

    #[error("File operation failed on {path}: {source}")]
    FileOp {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid source URL: {url}")]
    InvalidUrl { url: String },

    #[error("Operation was cancelled by user")]
    Cancelled,

    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl InstallerError {
    pub fn file_op(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InstallerError::FileOp {
            path: path.into(),
            source,
        }
    }

    /// Process exit code reported by the binary for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallerError::Cancelled => 130,
            InstallerError::Network { .. } | InstallerError::Timeout { .. } => 3,
            InstallerError::Integrity { .. } => 4,
            InstallerError::ClassificationEmpty { .. } => 5,
            InstallerError::FileOp { .. } => 6,
            InstallerError::Config { .. } | InstallerError::InvalidUrl { .. } => 7,
            _ => 1,
        }
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for InstallerError {
    fn user_message(&self) -> String {
        match self {
            InstallerError::Network { message } => {
                format!("Download failed: {}", message)
            }
            InstallerError::Integrity { message } => {
                format!("The downloaded profiles archive is not valid: {}", message)
            }
            InstallerError::ClassificationEmpty { root } => {
                format!(
                    "No filament or print/process profiles were found in {}",
                    root.display()
                )
            }
            InstallerError::UnplaceableEntry {
                application,
                category,
                file_name,
            } => {
                format!(
                    "Skipped {} ({} {}): slicer not selected",
                    file_name, application, category
                )
            }
            InstallerError::FileOp { path, source } => {
                format!("Could not write or remove {}: {}", path.display(), source)
            }
            InstallerError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            InstallerError::InvalidUrl { url } => {
                format!("Invalid source URL: {}", url)
            }
            InstallerError::Cancelled => "Operation was cancelled by user".to_string(),
            InstallerError::Timeout { seconds } => {
                format!("Download timed out after {} seconds", seconds)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            InstallerError::Network { .. } => Some(
                "Check your internet connection and try again. The profile repository might be temporarily unavailable.".to_string()
            ),
            InstallerError::Integrity { .. } => Some(
                "Run with --check-download to fetch a fresh copy. If a sha256 is pinned in the configuration, make sure it matches the current archive.".to_string()
            ),
            InstallerError::ClassificationEmpty { .. } => Some(
                "Check that the source URL points at the profile repository archive and that it still uses PrusaSlicer/OrcaSlicer/BambuStudio folders.".to_string()
            ),
            InstallerError::FileOp { .. } => Some(
                "Close the slicer application and ensure you have write permission for its configuration folder.".to_string()
            ),
            InstallerError::Config { .. } => Some(
                "Check your configuration file syntax or regenerate one with --generate-config.".to_string()
            ),
            InstallerError::InvalidUrl { .. } => Some(
                "Use an https:// URL to a .zip archive, or file:// for a local archive.".to_string()
            ),
            InstallerError::Timeout { .. } => Some(
                "Try again or raise the timeout with --timeout.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<url::ParseError> for InstallerError {
    fn from(error: url::ParseError) -> Self {
        InstallerError::InvalidUrl {
            url: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for InstallerError {
    fn from(error: toml::de::Error) -> Self {
        InstallerError::Config {
            message: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for InstallerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return InstallerError::Network {
                message: format!("request timed out: {}", error),
            };
        }
        InstallerError::Network {
            message: error.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for InstallerError {
    fn from(error: zip::result::ZipError) -> Self {
        InstallerError::Integrity {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InstallerError>;

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_friendly_messages() {
        let error = InstallerError::Integrity {
            message: "sha256 mismatch".to_string(),
        };
        assert!(error.user_message().contains("not valid"));
        assert!(error.suggestion().is_some());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1048576), "1.0 MB");
        assert_eq!(format_bytes(500), "500 B");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(InstallerError::Cancelled.exit_code(), 130);
        assert_eq!(
            InstallerError::Network {
                message: "offline".to_string()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            InstallerError::ClassificationEmpty {
                root: PathBuf::from("x")
            }
            .exit_code(),
            5
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(InstallerError::file_op("a.ini", io).exit_code(), 6);
    }

    #[test]
    fn test_zip_error_is_integrity() {
        let err = InstallerError::from(zip::result::ZipError::InvalidArchive("bad".into()));
        assert!(matches!(err, InstallerError::Integrity { .. }));
    }
}
