use clap::Parser;
use profile_installer::{
    logging, output_mode_for, Cli, InstallRequest, InstallerError, Operation, OutputFormatter,
    OutputMode, ProfileInstaller, UserFriendlyError,
};
use std::process;
use std::time::Instant;
use tracing::error;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();
    let operation = cli.operation();

    if operation == Operation::GenerateConfig {
        return handle_generate_config(&cli);
    }

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            print_startup_error(&e);
            return e.exit_code();
        }
    };

    // held until exit so the file layer is flushed
    let _log_guard = logging::init_logging(
        Some(&config.paths.log_file()),
        cli.verbosity_level(),
        cli.quiet,
    );

    let installer =
        match ProfileInstaller::new(config, output_mode_for(&cli), cli.verbose, cli.quiet) {
            Ok(installer) => installer,
            Err(e) => {
                print_startup_error(&e);
                return e.exit_code();
            }
        };

    let request = InstallRequest::from_cli(&cli);
    let start = Instant::now();
    let formatter = installer.output_formatter();

    let result = match operation {
        Operation::Install => installer.install(&request).await.map(|report| {
            formatter.print_install_report(&report, start.elapsed());
            report.has_issues()
        }),
        Operation::Uninstall { dry_run } => installer.uninstall(dry_run).await.map(|report| {
            formatter.print_uninstall_report(&report);
            report.has_issues()
        }),
        Operation::CheckDownload => installer.check_download().await.map(|report| {
            let bytes = std::fs::metadata(installer.config().paths.archive_path())
                .map(|m| m.len())
                .unwrap_or(0);
            formatter.print_check_report(&report, bytes);
            false
        }),
        Operation::List => installer.list(&request).await.map(|profiles| {
            formatter.print_profile_list(&profiles);
            false
        }),
        Operation::GenerateConfig => Ok(false),
    };

    match result {
        Ok(false) => 0,
        Ok(true) => 2,
        Err(e) => {
            error!(error = %e, "run failed");
            installer.handle_error(&e);
            e.exit_code()
        }
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let Some(config_path) = cli.config.as_ref() else {
        print!("{}", profile_installer::Config::create_sample_config());
        return 0;
    };

    match ProfileInstaller::generate_sample_config(config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path.display());
            println!("\nTo use this configuration:");
            println!("  profile-installer --config {}", config_path.display());
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            e.exit_code()
        }
    }
}

fn print_startup_error(error: &InstallerError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_generate_config_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("installer.toml");
        let cli = Cli::try_parse_from([
            "profile-installer",
            "--generate-config",
            "--config",
            config_path.to_str().unwrap(),
        ])
        .unwrap();

        assert_eq!(handle_generate_config(&cli), 0);
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[paths]"));
    }

    #[test]
    fn test_generate_config_into_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("missing").join("installer.toml");
        let cli = Cli::try_parse_from([
            "profile-installer",
            "--generate-config",
            "--config",
            config_path.to_str().unwrap(),
        ])
        .unwrap();

        assert_eq!(handle_generate_config(&cli), 6);
    }
}
