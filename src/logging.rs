use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::LogConfig;

/// Installs the global subscriber: stderr always, plus `log.file` when set.
/// Keep the returned guard alive until exit so buffered file lines flush.
pub fn init(log: &LogConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut open_error = None;
    let mut guard = None;
    let file_layer = log.file.as_deref().and_then(|path| match file_appender(path) {
        Ok(appender) => {
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        Err(err) => {
            open_error = Some((path.to_path_buf(), err));
            None
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(file_layer)
        .init();

    if let Some((path, err)) = open_error {
        tracing::warn!(
            file = %path.display(),
            error = %err,
            "log file unavailable; logging to stderr only"
        );
    }
    guard
}

/// Appends to exactly `path`, creating its directory when missing.
pub(crate) fn file_appender(path: &Path) -> io::Result<RollingFileAppender> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "log file needs a file name")
        })?;
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(io::Error::other)
}
