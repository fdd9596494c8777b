use crate::fetcher::FetchProgress;
use crate::reconcile::ApplyProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct ProgressManager {
    multi_progress: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            enabled,
        }
    }

    /// Byte bar for the archive download. Starts as length 0 and is sized once the
    /// server reports a content length.
    pub fn create_download_progress(&self) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new(0));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>9}/{total_bytes:9} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb.set_message("Downloading profiles...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn create_file_progress(&self, total_files: u64) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new(total_files));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>5}/{len:5} profiles {msg}"
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
        );
        pb.set_message("Copying profiles...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn create_spinner(&self, message: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new_spinner());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        pb.set_message(message.to_string());
        pb
    }

    pub fn clear(&self) {
        if self.enabled {
            self.multi_progress.clear().ok();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new(true)
    }
}

pub fn update_download_progress(pb: &ProgressBar, progress: &FetchProgress) {
    if progress.total > 0 && pb.length() != Some(progress.total) {
        pb.set_length(progress.total);
    }
    pb.set_position(progress.bytes_so_far);
}

pub fn update_file_progress(pb: &ProgressBar, progress: &ApplyProgress) {
    pb.set_position(progress.files_processed as u64);

    match progress.current_file {
        Some(ref current_file) => {
            let remaining = progress.estimated_remaining();
            let eta = if progress.files_processed > 0 && remaining.as_secs() > 0 {
                format!(" (ETA: {})", format_duration(remaining))
            } else {
                String::new()
            };
            pb.set_message(format!("{}{}", current_file, eta));
        }
        None => pb.set_message("Copying profiles..."),
    }
}

pub fn finish_progress_with_summary(pb: &ProgressBar, message: &str, duration: Duration) {
    let final_message = format!("{} (completed in {})", message, format_duration(duration));
    pb.finish_with_message(final_message);
}

pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_progress_bars() {
        let manager = ProgressManager::new(false);
        assert!(!manager.is_enabled());

        assert!(manager.create_download_progress().is_hidden());
        assert!(manager.create_file_progress(10).is_hidden());
        assert!(manager.create_spinner("classifying").is_hidden());
    }

    #[test]
    fn test_download_progress_sizes_bar() {
        let pb = ProgressBar::hidden();
        pb.set_length(0);

        update_download_progress(
            &pb,
            &FetchProgress {
                bytes_so_far: 10,
                total: 0,
            },
        );
        assert_eq!(pb.position(), 10);

        update_download_progress(
            &pb,
            &FetchProgress {
                bytes_so_far: 50,
                total: 100,
            },
        );
        assert_eq!(pb.length(), Some(100));
        assert_eq!(pb.position(), 50);
    }

    #[test]
    fn test_file_progress_position() {
        let pb = ProgressBar::hidden();
        pb.set_length(4);
        let mut progress = ApplyProgress::new(4);
        progress.update_file("PLA.json".to_string(), 12);

        update_file_progress(&pb, &progress);
        assert_eq!(pb.position(), 1);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
    }
}
