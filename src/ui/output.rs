use crate::error::{format_bytes, InstallerError, UserFriendlyError};
use crate::reconcile::{CheckReport, InstallReport, ListedProfile, UninstallReport};
use crate::ui::progress::format_duration;
use console::{style, Emoji};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

impl OutputMode {
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputMode::Json,
            "plain" => OutputMode::Plain,
            _ => OutputMode::Human,
        }
    }
}

static CHECKMARK: Emoji = Emoji("✅ ", "+ ");
static CROSS: Emoji = Emoji("❌ ", "x ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static ROCKET: Emoji = Emoji("🚀 ", "> ");
static SPARKLES: Emoji = Emoji("✨ ", "* ");

pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors = match mode {
            OutputMode::Human => console::Term::stdout().features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Success, message),
            OutputMode::Json => self.print_json_message("success", message),
            OutputMode::Plain => println!("SUCCESS: {}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn debug(&self, message: &str) {
        if self.should_show_message(2) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("  {}", style(message).dim());
                    } else {
                        println!("  DEBUG: {}", message);
                    }
                }
                OutputMode::Json => self.print_json_message("debug", message),
                OutputMode::Plain => println!("DEBUG: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", ROCKET, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &InstallerError) {
        self.error(&error.user_message());

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    eprintln!();
                    if self.use_colors {
                        eprintln!(
                            "{}{}",
                            INFO,
                            style(format!("Suggestion: {}", suggestion)).cyan()
                        );
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => eprintln!("SUGGESTION: {}", suggestion),
            }
        }
    }

    pub fn print_install_report(&self, report: &InstallReport, duration: Duration) {
        match self.mode {
            OutputMode::Json => self.print_json_report("install_report", report),
            OutputMode::Plain => {
                println!("COMPLETED: Install");
                println!("Base directory: {}", report.base_directory.display());
                println!("Found: {} filament, {} print/process", report.filament_found, report.process_found);
                println!("Copied: {}", report.copied.len());
                println!("Removed: {}", report.removed.len());
                println!("Skipped: {}", report.unplaceable.len());
                println!("Duration: {}", format_duration(duration));
                for error in &report.errors {
                    println!("ERROR: {}", error);
                }
            }
            OutputMode::Human => {
                if self.quiet {
                    return;
                }
                println!();
                self.print_separator();
                if report.has_issues() {
                    self.print_human_message(MessageType::Warning, "Install finished with issues");
                } else {
                    self.print_human_message(MessageType::Success, "Profiles installed");
                }
                println!();

                let slicers: Vec<&str> =
                    report.applications.iter().map(|a| a.display_name()).collect();
                println!("  Slicers:        {}", slicers.join(", "));
                println!("  Base directory: {}", report.base_directory.display());
                println!(
                    "  Found:          {} filament, {} print/process",
                    self.highlight(report.filament_found),
                    self.highlight(report.process_found)
                );
                println!("  Copied:         {}", self.highlight(report.copied.len()));
                println!("  Removed:        {}", self.highlight(report.removed.len()));
                if !report.unplaceable.is_empty() {
                    println!("  Not placed:     {}", report.unplaceable.len());
                }
                println!("  Time taken:     {}", format_duration(duration));

                if self.verbose_level > 0 {
                    for path in &report.removed {
                        println!("    - {}", path.display());
                    }
                    for skipped in &report.unplaceable {
                        println!(
                            "    ~ {} ({} {})",
                            skipped.file_name, skipped.application, skipped.category
                        );
                    }
                }

                if !report.errors.is_empty() {
                    println!();
                    println!("Issues encountered:");
                    for error in &report.errors {
                        println!("  - {}", error);
                    }
                }
                self.print_separator();
            }
        }
    }

    pub fn print_uninstall_report(&self, report: &UninstallReport) {
        match self.mode {
            OutputMode::Json => self.print_json_report("uninstall_report", report),
            OutputMode::Plain => {
                if report.dry_run {
                    println!("DRY RUN: would remove {} of {} tracked files", report.would_delete, report.total);
                } else {
                    println!("COMPLETED: Uninstall");
                    println!("Removed: {} of {}", report.deleted, report.total);
                }
                println!("Missing: {}", report.missing.len());
                for error in &report.errors {
                    println!("ERROR: {}", error);
                }
            }
            OutputMode::Human => {
                if self.quiet {
                    return;
                }
                if report.total == 0 {
                    self.print_human_message(MessageType::Info, "Nothing to uninstall");
                    return;
                }
                if report.dry_run {
                    self.print_human_message(
                        MessageType::Info,
                        &format!(
                            "Dry run: {} of {} tracked files would be removed",
                            report.would_delete, report.total
                        ),
                    );
                } else if report.has_issues() {
                    self.print_human_message(
                        MessageType::Warning,
                        &format!(
                            "Removed {} of {} files, {} could not be removed",
                            report.deleted,
                            report.total,
                            report.failed.len()
                        ),
                    );
                } else {
                    self.print_human_message(
                        MessageType::Success,
                        &format!("Removed {} of {} files", report.deleted, report.total),
                    );
                }
                if !report.missing.is_empty() {
                    println!("  Already gone:   {}", report.missing.len());
                }
                for error in &report.errors {
                    println!("  - {}", error);
                }
            }
        }
    }

    pub fn print_check_report(&self, report: &CheckReport, archive_bytes: u64) {
        match self.mode {
            OutputMode::Json => self.print_json_report("check_report", report),
            OutputMode::Plain => {
                println!("OK");
                println!("sha256={}", report.sha256);
                println!("url={}", report.url);
                println!("filament={}", report.filament);
                println!("process={}", report.process);
            }
            OutputMode::Human => {
                if self.quiet {
                    return;
                }
                self.print_human_message(MessageType::Success, "Download check passed");
                println!("  Archive:  {} ({})", report.url, format_bytes(archive_bytes));
                println!("  SHA-256:  {}", report.sha256);
                println!(
                    "  Profiles: {} filament, {} print/process",
                    self.highlight(report.filament),
                    self.highlight(report.process)
                );
                if let Some(ref marker) = report.marker_path {
                    println!("  Marker:   {}", marker.display());
                }
            }
        }
    }

    pub fn print_profile_list(&self, profiles: &[ListedProfile]) {
        match self.mode {
            OutputMode::Json => self.print_json_report("profile_list", &profiles),
            OutputMode::Plain => {
                for p in profiles {
                    let dest = p
                        .destination
                        .as_ref()
                        .map(|d| d.display().to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{}\t{}\t{}\t{}", p.application, p.category, p.file_name, dest);
                }
            }
            OutputMode::Human => {
                self.print_header("Profiles in archive");
                for p in profiles {
                    let name = format!("[{} {}] {}", p.application, p.category, p.file_name);
                    match p.destination {
                        Some(ref dest) => println!("  {}\n      -> {}", name, style(dest.display()).dim()),
                        None => println!("  {}  {}", name, style("(slicer not selected)").yellow()),
                    }
                }
                println!();
                println!("{} profiles", profiles.len());
            }
        }
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                println!();
                if self.use_colors {
                    println!("{} {}", SPARKLES, style(title).bold().cyan());
                } else {
                    println!("=== {} ===", title);
                }
                println!();
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => println!("=== {} ===", title),
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    println!("{}", style("─".repeat(60)).dim());
                } else {
                    println!("{}", "-".repeat(60));
                }
            }
            OutputMode::Plain => println!("{}", "-".repeat(60)),
            OutputMode::Json => {}
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn highlight<T: std::fmt::Display>(&self, value: T) -> String {
        if self.use_colors {
            style(value).cyan().bold().to_string()
        } else {
            value.to_string()
        }
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        if self.use_colors {
            let (emoji, styled) = match msg_type {
                MessageType::Success => (&CHECKMARK, style(message).green().bold()),
                MessageType::Error => (&CROSS, style(message).red().bold()),
                MessageType::Warning => (&WARNING, style(message).yellow().bold()),
                MessageType::Info => (&INFO, style(message).cyan()),
            };
            match msg_type {
                MessageType::Error => eprintln!("{}{}", emoji, styled),
                _ => println!("{}{}", emoji, styled),
            }
        } else {
            let prefix = match msg_type {
                MessageType::Success => "+",
                MessageType::Error => "x",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };
            match msg_type {
                MessageType::Error => eprintln!("{} {}", prefix, message),
                _ => println!("{} {}", prefix, message),
            }
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    /// One line per report so callers can pick it out of the message stream.
    fn print_json_report<T: Serialize>(&self, kind: &str, report: &T) {
        self.print_json_object(&serde_json::json!({
            "type": kind,
            "report": report,
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_mode_parsing() {
        assert_eq!(OutputMode::from_string("human"), OutputMode::Human);
        assert_eq!(OutputMode::from_string("JSON"), OutputMode::Json);
        assert_eq!(OutputMode::from_string("plain"), OutputMode::Plain);
        assert_eq!(OutputMode::from_string("invalid"), OutputMode::Human);
    }

    #[test]
    fn test_quiet_mode() {
        let formatter = OutputFormatter::new(OutputMode::Human, 2, true);
        assert_eq!(formatter.verbose_level, 0);
        assert!(!formatter.should_show_message(0));
    }

    #[test]
    fn test_should_show_message() {
        let formatter = OutputFormatter::new(OutputMode::Plain, 1, false);
        assert!(formatter.should_show_message(0));
        assert!(formatter.should_show_message(1));
        assert!(!formatter.should_show_message(2));
        assert!(!formatter.use_colors);
    }

    #[test]
    fn test_highlight_without_colors() {
        let formatter = OutputFormatter::new(OutputMode::Json, 0, false);
        assert_eq!(formatter.highlight(42), "42");
        assert_eq!(formatter.mode(), OutputMode::Json);
    }
}
