pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod profile;
pub mod reconcile;
pub mod scanner;
pub mod state;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, Operation, OutputFormat};
pub use config::{CliOverrides, Config, InstallConfig, PathsConfig, SourceConfig};
pub use error::{InstallerError, Result, UserFriendlyError};

// Core functionality re-exports
pub use fetcher::{ArchiveDownloader, ArchiveValidator, FetchProgress, FetchedArchive};
pub use profile::{Application, Category, ProfileEntry, TargetLayout};
pub use reconcile::{
    Applier, ApplyProgress, CheckReport, InstallReport, ListedProfile, Plan,
    ReconciliationPlanner, UninstallReport,
};
pub use scanner::{ProfileCatalog, ProfileScanner, RuleTable};
pub use state::{InstalledSetStore, OwnedFileSet};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use reconcile::InstallContext;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::task::{self, JoinError};
use tracing::{info, warn};

/// Which slicers to install into and which profiles to leave out.
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    /// Explicit slicer list; wins over everything else.
    pub applications: Option<Vec<Application>>,
    /// Use the slicers found under the base directory.
    pub detect_installed: bool,
    /// File names offered but not selected, compared case-insensitively.
    pub skip: Vec<String>,
}

impl InstallRequest {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            applications: cli.slicers.clone(),
            detect_installed: cli.all,
            skip: cli.skip.clone(),
        }
    }

    pub fn is_skipped(&self, entry: &ProfileEntry) -> bool {
        self.skip
            .iter()
            .any(|name| name.trim().eq_ignore_ascii_case(&entry.file_name))
    }
}

/// A downloaded archive that passed the integrity checks and was classified.
#[derive(Debug, Clone)]
pub struct PreparedArchive {
    pub url: String,
    pub sha256: String,
    pub bytes: u64,
    pub catalog: ProfileCatalog,
}

/// Main library interface: download, classify and reconcile slicer profiles.
pub struct ProfileInstaller {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl ProfileInstaller {
    pub fn new(
        mut config: Config,
        output_mode: OutputMode,
        verbose: u8,
        quiet: bool,
    ) -> Result<Self> {
        config.paths.resolve()?;
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);
        let shutdown = GracefulShutdown::new()?;

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        })
    }

    /// Instance without a Ctrl+C handler or progress bars.
    #[cfg(test)]
    pub fn new_for_test(config: Config) -> Self {
        Self {
            config,
            output_formatter: OutputFormatter::new(OutputMode::Plain, 0, true),
            progress_manager: ProgressManager::new(false),
            shutdown: GracefulShutdown::new_for_test(),
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        Self::new(
            config,
            output_mode_for(cli_args),
            cli_args.verbose,
            cli_args.quiet,
        )
    }

    pub fn store(&self) -> InstalledSetStore {
        InstalledSetStore::new(self.config.paths.state_file())
    }

    pub fn base_directory(&self) -> Result<PathBuf> {
        self.config.paths.base_directory()
    }

    /// Slicers for a run: the explicit list, else the detected ones when asked, else the
    /// configured ones. An empty result means all three.
    pub fn resolve_applications(&self, request: &InstallRequest) -> Result<Vec<Application>> {
        let chosen = match request.applications {
            Some(ref explicit) if !explicit.is_empty() => explicit.clone(),
            _ if request.detect_installed => {
                profile::detect_applications(&self.base_directory()?)
            }
            _ => self.config.install.applications.clone(),
        };

        let mut applications: Vec<Application> = Vec::new();
        for app in chosen {
            if !applications.contains(&app) {
                applications.push(app);
            }
        }

        if applications.is_empty() {
            Ok(Application::ALL.to_vec())
        } else {
            Ok(applications)
        }
    }

    /// Download the archive into the cache with a byte progress bar.
    pub async fn fetch_archive(&self) -> Result<FetchedArchive> {
        self.output_formatter.start_operation("Downloading profile archive");

        let download_progress = self.progress_manager.create_download_progress();
        let progress_callback = {
            let pb = download_progress.clone();
            move |progress: FetchProgress| {
                ui::progress::update_download_progress(&pb, &progress);
            }
        };

        let downloader = ArchiveDownloader::new()
            .with_timeout(self.config.timeout_duration())
            .with_user_agent(self.config.source.user_agent.clone())
            .with_running_flag(self.shutdown.running_flag())
            .with_progress(progress_callback);

        let url = self.config.source.url.clone();
        let dest = self.config.paths.archive_path();
        let result = task::spawn_blocking(move || downloader.fetch_to_file(&url, &dest))
            .await
            .map_err(|e| InstallerError::Network {
                message: format!("Download task failed: {}", e),
            })?;

        match result {
            Ok(fetched) => {
                ui::progress::finish_progress_with_summary(
                    &download_progress,
                    "Archive downloaded",
                    download_progress.elapsed(),
                );
                Ok(fetched)
            }
            Err(e) => {
                download_progress.abandon_with_message("Download failed");
                Err(e)
            }
        }
    }

    /// Self-test, digest check, extraction and classification of a fetched archive, on the
    /// blocking pool.
    pub async fn verify_and_classify(&self, fetched: &FetchedArchive) -> Result<PreparedArchive> {
        let spinner = self.progress_manager.create_spinner("Verifying archive");

        let archive = fetched.path.clone();
        let expected = self.config.source.expected_sha256.clone();
        let extract_dir = self.config.paths.extract_dir();
        let running = self.shutdown.running_flag();
        let stage_spinner = spinner.clone();
        let stage_dir = extract_dir.clone();

        let staged = task::spawn_blocking(move || {
            ArchiveValidator::self_test(&archive)?;
            let sha256 = fetcher::sha256_file(&archive)?;
            ArchiveValidator::verify_checksum(&sha256, expected.as_deref())?;
            info!(%sha256, "archive verified");
            ensure_running(&running)?;

            stage_spinner.set_message("Extracting archive");
            let extracted = fetcher::extract_archive(&archive, &stage_dir)?;
            ensure_running(&running)?;

            stage_spinner.set_message("Classifying profiles");
            let catalog = ProfileScanner::default().scan_directory(&stage_dir)?;
            Ok::<_, InstallerError>((sha256, extracted, catalog))
        })
        .await
        .map_err(|e| task_failed(&fetched.path, e))
        .and_then(|staged| staged);
        spinner.finish_and_clear();
        let (sha256, extracted, catalog) = staged?;

        self.output_formatter
            .debug(&format!("Extracted {} files to {}", extracted, extract_dir.display()));
        self.output_formatter
            .debug(&catalog.statistics().display_summary());

        Ok(PreparedArchive {
            url: fetched.url.clone(),
            sha256,
            bytes: fetched.bytes,
            catalog,
        })
    }

    /// Fetch, verify, extract and classify.
    pub async fn prepare(&self) -> Result<PreparedArchive> {
        self.shutdown.check_shutdown()?;
        let fetched = self.fetch_archive().await?;
        self.shutdown.check_shutdown()?;
        self.verify_and_classify(&fetched).await
    }

    /// Full run: prepare the archive, then plan and apply for the requested slicers.
    pub async fn install(&self, request: &InstallRequest) -> Result<InstallReport> {
        let prepared = self.prepare().await?;
        self.shutdown.check_shutdown()?;
        self.install_prepared(&prepared, request).await
    }

    /// Plan and apply against an already classified archive.
    ///
    /// Every offered entry of an enabled slicer is selected unless its name is in
    /// `request.skip`.
    pub async fn install_prepared(
        &self,
        prepared: &PreparedArchive,
        request: &InstallRequest,
    ) -> Result<InstallReport> {
        let applications = self.resolve_applications(request)?;
        let base = self.base_directory()?;
        self.output_formatter.start_operation(&format!(
            "Installing profiles for {}",
            applications
                .iter()
                .map(|a| a.display_name())
                .collect::<Vec<_>>()
                .join(", ")
        ));

        let layout = TargetLayout::for_applications(&base, &applications);
        let offered: Vec<ProfileEntry> = prepared.catalog.entries().cloned().collect();
        let mut plan =
            ReconciliationPlanner::new(layout).plan(&offered, |e| !request.is_skipped(e));

        info!(
            copies = plan.copies.len(),
            deletes = plan.deletes.len(),
            unplaceable = plan.unplaceable.len(),
            "reconciliation planned"
        );
        for entry in &plan.unplaceable {
            let skipped = InstallerError::UnplaceableEntry {
                application: entry.application.to_string(),
                category: entry.category_label().to_string(),
                file_name: entry.file_name.clone(),
            };
            self.output_formatter.debug(&skipped.user_message());
        }

        let file_progress = self.progress_manager.create_file_progress(plan.copies.len() as u64);
        let progress_callback = {
            let pb = file_progress.clone();
            move |progress: &ApplyProgress| {
                ui::progress::update_file_progress(&pb, progress);
            }
        };

        let applier = Applier::new(self.store())
            .with_preserve_mtime(self.config.install.preserve_mtime)
            .with_running_flag(self.shutdown.running_flag());
        let unplaceable = std::mem::take(&mut plan.unplaceable);
        let start = Instant::now();
        let outcome = task::spawn_blocking(move || applier.apply(&plan, Some(&progress_callback)))
            .await
            .map_err(|e| task_failed(&base, e))??;

        if outcome.cancelled {
            file_progress.abandon_with_message("Install interrupted");
            return Err(InstallerError::Cancelled);
        }

        ui::progress::finish_progress_with_summary(
            &file_progress,
            &format!("Copied {} profiles", outcome.copied.len()),
            start.elapsed(),
        );

        let context = InstallContext {
            applications,
            base_directory: base,
            sha256: prepared.sha256.clone(),
            filament_found: prepared.catalog.filament.len(),
            process_found: prepared.catalog.process.len(),
        };

        Ok(context.into_report(outcome, &unplaceable))
    }

    /// Remove every tracked file. Never downloads anything.
    pub async fn uninstall(&self, dry_run: bool) -> Result<UninstallReport> {
        self.output_formatter.start_operation(if dry_run {
            "Checking installed profiles (dry run)"
        } else {
            "Removing installed profiles"
        });

        let store = self.store();
        let state_file = store.path().to_path_buf();
        let outcome = task::spawn_blocking(move || Applier::new(store).uninstall_all(dry_run))
            .await
            .map_err(|e| task_failed(&state_file, e))??;
        Ok(UninstallReport::from(outcome))
    }

    /// Fetch and validate only; writes nothing outside the cache root.
    pub async fn check_download(&self) -> Result<CheckReport> {
        let prepared = self.prepare().await?;

        let mut report = CheckReport {
            sha256: prepared.sha256.clone(),
            url: prepared.url.clone(),
            filament: prepared.catalog.filament.len(),
            process: prepared.catalog.process.len(),
            marker_path: None,
        };

        let marker = self.config.paths.check_marker();
        match report.write_marker(&marker) {
            Ok(()) => report.marker_path = Some(marker),
            Err(e) => {
                warn!(error = %e, "could not write download check marker");
                self.output_formatter
                    .warning(&format!("Could not write {}: {}", marker.display(), e));
            }
        }

        Ok(report)
    }

    /// Classified profiles with the destination each would get for the requested slicers.
    pub async fn list(&self, request: &InstallRequest) -> Result<Vec<ListedProfile>> {
        let prepared = self.prepare().await?;
        self.list_prepared(&prepared, request)
    }

    pub fn list_prepared(
        &self,
        prepared: &PreparedArchive,
        request: &InstallRequest,
    ) -> Result<Vec<ListedProfile>> {
        let layout = TargetLayout::for_applications(
            self.base_directory()?,
            &self.resolve_applications(request)?,
        );

        Ok(prepared
            .catalog
            .entries()
            .map(|entry| ListedProfile {
                application: entry.application,
                category: entry.category_label().to_string(),
                file_name: entry.file_name.clone(),
                destination: layout.destination_for(entry),
            })
            .collect())
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        Config::sample().save_to_file(output_path)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn progress_manager(&self) -> &ProgressManager {
        &self.progress_manager
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    pub fn handle_error(&self, error: &InstallerError) {
        self.progress_manager.clear();
        self.output_formatter.print_user_friendly_error(error);
    }
}

fn ensure_running(running: &AtomicBool) -> Result<()> {
    if running.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(InstallerError::Cancelled)
    }
}

/// A blocking stage that panicked or was aborted, reported against the path it worked on.
fn task_failed(path: &Path, error: JoinError) -> InstallerError {
    InstallerError::file_op(path, std::io::Error::other(error))
}

pub fn output_mode_for(cli: &Cli) -> OutputMode {
    match cli.output_format {
        OutputFormat::Human => OutputMode::Human,
        OutputFormat::Json => OutputMode::Json,
        OutputFormat::Plain => OutputMode::Plain,
    }
}
