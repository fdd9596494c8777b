use crate::error::{InstallerError, Result};
use crate::profile::{default_base_directory, Application};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SOURCE_URL: &str =
    "https://github.com/colorfabb/printer-profiles/archive/refs/heads/main.zip";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub paths: PathsConfig,
    pub install: InstallConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    /// Pinned archive digest; unset means any archive that passes the self-test is accepted.
    pub expected_sha256: Option<String>,
    /// Seconds.
    pub timeout: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root under which the slicer folders live; the platform default when unset.
    pub base_directory: Option<PathBuf>,
    pub cache_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstallConfig {
    pub applications: Vec<Application>,
    pub preserve_mtime: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            expected_sha256: None,
            timeout: 120,
            user_agent: format!("profile-installer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_directory: None,
            cache_root: std::env::temp_dir().join("profile_installer"),
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            applications: Application::ALL.to_vec(),
            preserve_mtime: true,
        }
    }
}

impl PathsConfig {
    /// Absolute base directory; the platform default when none is configured.
    pub fn base_directory(&self) -> Result<PathBuf> {
        match self.base_directory {
            Some(ref base) => absolute_path(base),
            None => default_base_directory().and_then(|dir| absolute_path(&dir)),
        }
    }

    /// Make a configured base directory and the cache root absolute against the current
    /// working directory, so recorded destinations do not depend on where a later run starts.
    pub fn resolve(&mut self) -> Result<()> {
        if let Some(base) = self.base_directory.take() {
            self.base_directory = Some(absolute_path(&base)?);
        }
        self.cache_root = absolute_path(&self.cache_root)?;
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_root.join("cache")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.cache_dir().join("profiles.zip")
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.cache_dir().join("profiles_extracted")
    }

    pub fn state_file(&self) -> PathBuf {
        self.cache_root.join("installed_files.txt")
    }

    pub fn log_file(&self) -> PathBuf {
        self.cache_root.join("installer.log")
    }

    pub fn check_marker(&self) -> PathBuf {
        self.cache_root.join("download_check_ok.txt")
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(InstallerError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| InstallerError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| InstallerError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["profile-installer.toml", ".profile-installer.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref url) = cli_args.url {
            self.source.url = url.clone();
        }

        if let Some(ref sha256) = cli_args.expected_sha256 {
            self.source.expected_sha256 = Some(sha256.trim().to_lowercase());
        }

        if let Some(timeout) = cli_args.timeout {
            self.source.timeout = timeout;
        }

        if let Some(ref base) = cli_args.base_directory {
            self.paths.base_directory = Some(base.clone());
        }

        if let Some(ref cache_root) = cli_args.cache_root {
            self.paths.cache_root = cache_root.clone();
        }

        if let Some(ref applications) = cli_args.applications {
            self.install.applications = applications.clone();
        }

        if let Some(preserve) = cli_args.preserve_mtime {
            self.install.preserve_mtime = preserve;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| InstallerError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| InstallerError::file_op(path, e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(InstallerError::Config {
                message: "Source URL must not be empty".to_string(),
            });
        }

        let parsed = url::Url::parse(&self.source.url).map_err(|_| InstallerError::InvalidUrl {
            url: self.source.url.clone(),
        })?;
        if !matches!(parsed.scheme(), "https" | "http" | "file") {
            return Err(InstallerError::InvalidUrl {
                url: self.source.url.clone(),
            });
        }

        if self.source.timeout == 0 {
            return Err(InstallerError::Config {
                message: "Download timeout must be greater than 0".to_string(),
            });
        }

        if let Some(ref digest) = self.source.expected_sha256 {
            let pattern = Regex::new(r"^[0-9a-fA-F]{64}$").map_err(|e| InstallerError::Config {
                message: e.to_string(),
            })?;
            if !pattern.is_match(digest.trim()) {
                return Err(InstallerError::Config {
                    message: format!("expected_sha256 is not a SHA-256 hex digest: {}", digest),
                });
            }
        }

        if self.paths.cache_root.as_os_str().is_empty() {
            return Err(InstallerError::Config {
                message: "Cache root must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.source.timeout)
    }

    /// Defaults with the platform base directory spelled out.
    pub fn sample() -> Self {
        let mut sample_config = Self::default();
        sample_config.paths.base_directory = default_base_directory().ok();
        sample_config
    }

    pub fn create_sample_config() -> String {
        toml::to_string_pretty(&Self::sample()).unwrap_or_else(|_| String::new())
    }
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| InstallerError::file_op(path, e))
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub url: Option<String>,
    pub expected_sha256: Option<String>,
    pub timeout: Option<u64>,
    pub base_directory: Option<PathBuf>,
    pub cache_root: Option<PathBuf>,
    pub applications: Option<Vec<Application>>,
    pub preserve_mtime: Option<bool>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_expected_sha256(mut self, sha256: Option<String>) -> Self {
        self.expected_sha256 = sha256;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_directory(mut self, base: Option<PathBuf>) -> Self {
        self.base_directory = base;
        self
    }

    pub fn with_cache_root(mut self, cache_root: Option<PathBuf>) -> Self {
        self.cache_root = cache_root;
        self
    }

    pub fn with_applications(mut self, applications: Option<Vec<Application>>) -> Self {
        self.applications = applications;
        self
    }

    pub fn with_preserve_mtime(mut self, preserve: Option<bool>) -> Self {
        self.preserve_mtime = preserve;
        self
    }
}
