use crate::config::LoggingConfig;
use crate::constants::APP_DIR_NAME;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `<data dir>/nanoedit/logs/nanoedit.log`
pub fn log_file_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("logs")
        .join(format!("{}.log", APP_DIR_NAME))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber: stderr always, plus an append-only log
/// file when enabled. `RUST_LOG` overrides the configured level for the
/// console; the file records debug and up.
pub fn init(config: &LoggingConfig) {
    let console = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(filter(&config.level));

    let (file_layer, file_error) = if config.file {
        let path = log_file_path();
        match open_log_file(&path) {
            Ok(file) => {
                let layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter("debug"));
                (Some(layer), None)
            }
            Err(e) => (None, Some(e)),
        }
    } else {
        (None, None)
    };

    if tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        // Already installed (tests, embedding).
        return;
    }

    match file_error {
        Some(e) => tracing::warn!("File logging disabled: {:#}", e),
        None if config.file => tracing::debug!("Logging to {}", log_file_path().display()),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path() {
        let path = log_file_path();
        assert!(path.ends_with("nanoedit/logs/nanoedit.log"));
    }

    #[test]
    fn test_open_log_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("x.log");
        open_log_file(&path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            file: false,
        };
        init(&config);
        init(&config);
        tracing::debug!("still alive");
    }
}
