//! Logging for the native host.
//!
//! Stdout carries the protocol, so logs go to stderr (the browser captures it)
//! and to a daily file under `~/.tabgroup/logs/`.

use std::env;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "tabgroup-host.log";

pub fn default_log_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".tabgroup").join("logs"))
}

fn debug_forced() -> bool {
    env::var("TABGROUP_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

fn log_filter() -> EnvFilter {
    if debug_forced() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

pub fn prepare_log_dir(dir: &Path) -> Result<(), String> {
    fs_err::create_dir_all(dir).map_err(|err| format!("Failed to create log directory: {}", err))
}

/// Installs the global subscriber. The returned guard flushes the file writer
/// on drop and must live until exit. Without a usable log directory only the
/// stderr layer is installed.
pub fn init_logging(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let dir = log_dir.map(Ok).unwrap_or_else(default_log_dir);
    let file_dir = match dir.and_then(|dir| prepare_log_dir(&dir).map(|()| dir)) {
        Ok(dir) => Some(dir),
        Err(err) => {
            eprintln!("tabgroup-host: file logging disabled: {}", err);
            None
        }
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false);

    match file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(log_filter())
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(log_filter())
                .with(stderr_layer)
                .init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_log_dir_creates_nested_directories() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let dir = temp_dir.path().join("a").join("logs");
        prepare_log_dir(&dir).expect("create");
        assert!(dir.is_dir());
        prepare_log_dir(&dir).expect("idempotent");
    }

    #[test]
    fn prepare_log_dir_reports_file_in_the_way() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let blocker = temp_dir.path().join("logs");
        fs_err::write(&blocker, "not a dir").expect("write");
        let err = prepare_log_dir(&blocker.join("nested")).unwrap_err();
        assert!(err.starts_with("Failed to create log directory"));
    }
}
