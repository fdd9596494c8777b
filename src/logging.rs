use std::path::Path;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directive for the terminal layer from `-v`/`-q`.
pub fn stderr_directive(verbosity: u8, quiet: bool) -> String {
    let level = match (quiet, verbosity) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    format!("warn,profile_installer={}", level)
}

/// Install the global subscriber: a terminal layer on stderr and, when `log_file` can be
/// opened, a plain-text file layer that always records `info` and above.
///
/// `RUST_LOG` replaces the terminal filter. The returned guard flushes the file layer on
/// drop and must be held for the life of the process.
pub fn init_logging(log_file: Option<&Path>, verbosity: u8, quiet: bool) -> Option<WorkerGuard> {
    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(stderr_directive(verbosity, quiet)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_ansi(console::Term::stderr().features().colors_supported())
        .with_filter(stderr_filter);

    let (file_layer, guard) = match log_file.and_then(open_appender) {
        Some(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(LevelFilter::INFO);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        debug!(log_file = ?log_file, "logging initialised");
    }

    guard
}

fn open_appender(path: &Path) -> Option<RollingFileAppender> {
    let dir = path.parent()?;
    let file_name = path.file_name()?.to_str()?;
    std::fs::create_dir_all(dir).ok()?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .ok()
}
