use crate::config::{CliOverrides, Config};
use crate::error::Result;
use crate::profile::Application;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "profile-installer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Install filament and print/process profiles into desktop slicers")]
#[command(
    long_about = "Downloads the profile archive, sorts its filament and print/process profiles by \
                  slicer, and keeps the slicer configuration folders in sync with your selection. \
                  Only files this tool installed are ever removed."
)]
#[command(after_help = "EXAMPLES:\n  \
    profile-installer\n  \
    profile-installer --slicers orca,bambu --skip \"Old PLA.json\"\n  \
    profile-installer --all --base ~/.config\n  \
    profile-installer --uninstall --dry-run\n  \
    profile-installer --check-download --output-format json")]
pub struct Cli {
    /// Slicers to install into (comma-separated)
    #[arg(
        short,
        long,
        value_delimiter = ',',
        value_parser = parse_application,
        help = "Slicers to install into: PrusaSlicer, OrcaSlicer, BambuStudio"
    )]
    pub slicers: Option<Vec<Application>>,

    /// Install into every slicer detected under the base directory
    #[arg(long, conflicts_with = "slicers")]
    pub all: bool,

    /// Profile file names to leave out (comma-separated, case-insensitive)
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Base directory containing the slicer configuration folders
    #[arg(short, long)]
    pub base: Option<PathBuf>,

    /// Remove every profile file this tool installed
    #[arg(long, conflicts_with_all = ["check_download", "list"])]
    pub uninstall: bool,

    /// With --uninstall, only report what would be removed
    #[arg(long, requires = "uninstall")]
    pub dry_run: bool,

    /// Download, verify and classify the archive without installing
    #[arg(long, conflicts_with = "list")]
    pub check_download: bool,

    /// List the profiles in the archive and where they would go
    #[arg(long)]
    pub list: bool,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Profile archive URL (https://, http:// or file://)
    #[arg(long)]
    pub url: Option<String>,

    /// Expected SHA-256 of the archive
    #[arg(long, value_parser = validate_sha256)]
    pub sha256: Option<String>,

    /// Download timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Directory for the downloaded archive, state file and log
    #[arg(long, env = "PROFILE_INSTALLER_CACHE")]
    pub cache_root: Option<PathBuf>,

    /// Do not copy modification times from the archive
    #[arg(long)]
    pub no_preserve_mtime: bool,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Print a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

/// Headless operation selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Uninstall { dry_run: bool },
    CheckDownload,
    List,
    GenerateConfig,
}

impl Cli {
    pub fn operation(&self) -> Operation {
        if self.generate_config {
            Operation::GenerateConfig
        } else if self.uninstall {
            Operation::Uninstall {
                dry_run: self.dry_run,
            }
        } else if self.check_download {
            Operation::CheckDownload
        } else if self.list {
            Operation::List
        } else {
            Operation::Install
        }
    }

    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;
        config.paths.resolve()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_url(self.url.clone())
            .with_expected_sha256(self.sha256.clone())
            .with_timeout(self.timeout)
            .with_base_directory(self.base.clone())
            .with_cache_root(self.cache_root.clone())
            .with_preserve_mtime(self.no_preserve_mtime.then_some(false))
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

pub fn parse_application(s: &str) -> std::result::Result<Application, String> {
    s.parse()
}

pub fn validate_sha256(s: &str) -> std::result::Result<String, String> {
    let trimmed = s.trim();
    if trimmed.len() == 64 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(trimmed.to_lowercase())
    } else {
        Err("Expected a 64-character hexadecimal SHA-256 digest".to_string())
    }
}
