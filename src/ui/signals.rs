use crate::error::{InstallerError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ctrl+C handling. The first signal clears the running flag so the current stage can
/// stop at its next check; a second one exits immediately.
pub struct GracefulShutdown {
    running: Arc<AtomicBool>,
}

impl GracefulShutdown {
    pub fn new() -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let message_shown = AtomicBool::new(false);
        let running_clone = running.clone();

        ctrlc::set_handler(move || {
            running_clone.store(false, Ordering::SeqCst);

            if !message_shown.swap(true, Ordering::SeqCst) {
                eprintln!("\nStopping after the current file... (press Ctrl+C again to force exit)");
            } else {
                eprintln!("\nForce stopping.");
                std::process::exit(130);
            }
        })
        .map_err(|e| InstallerError::Config {
            message: format!("Failed to set signal handler: {}", e),
        })?;

        Ok(Self { running })
    }

    /// Instance without a signal handler, for tests.
    pub fn new_for_test() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Shared flag handed to long-running workers; `false` means stop.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn check_shutdown(&self) -> Result<()> {
        if !self.is_running() {
            return Err(InstallerError::Cancelled);
        }
        Ok(())
    }

    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
