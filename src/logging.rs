use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "logs/live-duper.log";

/// Console output is filtered by `TRACING_LEVEL`; the log file by
/// `LOG_FILE_LEVEL`, falling back to the console level.
pub fn init_logger() -> WorkerGuard {
    let console_level = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let file_level = env::var("LOG_FILE_LEVEL").unwrap_or_else(|_| console_level.clone());
    let requested = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());

    let (directory, file_name) = log_file_location(&requested);
    let created = fs::create_dir_all(&directory);
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&directory, &file_name));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .with_thread_names(true)
                .without_time()
                .with_filter(EnvFilter::new(&console_level)),
        )
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true)
                .with_filter(EnvFilter::new(&file_level)),
        )
        .init();

    match created {
        Ok(()) => info!(
            "Logging to stdout ({}) and {} ({})",
            console_level,
            directory.join(&file_name).display(),
            file_level
        ),
        Err(e) => warn!("Unable to create log directory {}: {}", directory.display(), e),
    }

    guard
}

/// Split a log file path into the directory to create and the file name.
/// A bare name lands in the working directory; a path ending in a
/// separator gets the default file name.
fn log_file_location(requested: &str) -> (PathBuf, OsString) {
    let path = Path::new(requested);
    let default_name = || {
        Path::new(DEFAULT_LOG_FILE)
            .file_name()
            .map(OsString::from)
            .unwrap_or_default()
    };
    if requested.ends_with('/') || requested.ends_with(std::path::MAIN_SEPARATOR) {
        return (path.to_path_buf(), default_name());
    }
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path.file_name().map(OsString::from).unwrap_or_else(default_name);
    (directory, file_name)
}
