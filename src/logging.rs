//! Structured logging: console plus a daily rolling file.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Maximum number of log files to keep.
pub const MAX_LOG_FILES: usize = 10;

/// File name prefix of the rolling log files (`cafe-export.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "cafe-export";

const DEFAULT_FILTER: &str = "info,cafe_export=debug";

/// Per-user data directory for log files when none is configured.
pub fn default_log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("cafe-export").join("logs")
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// The returned guard flushes the file writer when dropped; hold it for the
/// life of the process.
pub fn init(log_dir: &Path, format: LogFormat) -> anyhow::Result<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fs::create_dir_all(log_dir)?;
    prune_old_logs(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let plain_layer = (format == LogFormat::Plain).then(|| fmt::layer().with_target(true));
    let json_layer = (format == LogFormat::Json).then(|| fmt::layer().json().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(plain_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

/// Prune old log files in `log_dir`, keeping only the most recent
/// `MAX_LOG_FILES`. Files not written by this service are left alone.
pub fn prune_old_logs(log_dir: &Path) -> usize {
    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    let Ok(entries) = fs::read_dir(log_dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(&format!("{LOG_FILE_PREFIX}.")));
        if ours {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::UNIX_EPOCH);
            log_files.push((path, modified));
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "failed to prune log file"),
        }
    }
    removed
}
