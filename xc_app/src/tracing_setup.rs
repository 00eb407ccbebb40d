use std::io;

use tracing::Level;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::InitError;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

fn env_filter(default_level: Level) -> EnvFilter {
    // Respects RUST_LOG, falls back to default_level
    EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy()
}

/// Daily rolling `<app_name>.log` files under `log_dir`, creating the directory
pub fn file_appender(app_name: &str, log_dir: &str) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder().rotation(Rotation::DAILY).filename_prefix(format!("{app_name}.log")).build(log_dir)
}

/// Initialise tracing on stderr, keeping stdout free for response output
pub fn init(default_level: Level) {
    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(true).with_line_number(true).compact();

    tracing_subscriber::registry().with(env_filter(default_level)).with(stderr_layer).init();
}

/// Initialise tracing on stderr plus a non-blocking daily log file.
///
/// Falls back to stderr only when the log directory cannot be used.
pub fn init_with_file(app_name: &str, log_dir: &str, default_level: Level) -> Option<WorkerGuard> {
    let appender = match file_appender(app_name, log_dir) {
        Ok(appender) => appender,
        Err(err) => {
            init(default_level);
            warn!(log_dir, "Failed to open log directory, file logging disabled: {err}");
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer().with_writer(non_blocking).with_target(true).with_line_number(true).with_ansi(false).compact();
    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(true).with_line_number(true).compact();

    tracing_subscriber::registry().with(env_filter(default_level)).with(file_layer).with(stderr_layer).init();

    Some(guard)
}
