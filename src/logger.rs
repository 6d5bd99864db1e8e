//! Logging support for bootcfg
//!
//! Warnings and errors always go to stderr; `-v` raises the level. When debug
//! logging is enabled in the config, everything at debug level and above is
//! also appended to /var/log/bootcfg.log if writable, otherwise
//! ~/.bootcfg/bootcfg.log.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

const VAR_LOG_DIR: &str = "/var/log";
const LOG_FILE_NAME: &str = "bootcfg.log";

/// Stderr filter for the given `-v` count; `RUST_LOG` overrides it.
fn stderr_filter(verbosity: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    EnvFilter::new(format!("bootcfg={}", level))
}

/// Initialize the logging system
///
/// Returns the path of the debug log file, or None if file logging is off or
/// the file could not be opened.
pub fn init_logging(debug_enabled: bool, verbosity: u8) -> Result<Option<PathBuf>> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_filter(verbosity));

    let file_layer = if debug_enabled {
        match open_log_dir() {
            Ok(dir) => Some(dir),
            Err(e) => {
                // Logging must never stop a config change
                eprintln!("Warning: Could not create log file: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let log_path = file_layer.as_ref().map(|dir| dir.join(LOG_FILE_NAME));
    let file_layer = file_layer.map(|dir| {
        fmt::layer()
            .with_writer(tracing_appender::rolling::never(dir, LOG_FILE_NAME))
            .with_ansi(false)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_filter(EnvFilter::new("bootcfg=debug"))
    });

    registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    Ok(log_path)
}

/// Directory for the debug log, created if needed and checked for writability
fn open_log_dir() -> Result<PathBuf> {
    let dir = get_log_dir()?;

    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let path = dir.join(LOG_FILE_NAME);
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    Ok(dir)
}

/// Get the log directory
///
/// Tries /var/log first, falls back to ~/.bootcfg
fn get_log_dir() -> Result<PathBuf> {
    if can_write_to(Path::new(VAR_LOG_DIR)) {
        return Ok(PathBuf::from(VAR_LOG_DIR));
    }

    let home_dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home_dir.join(".bootcfg"))
}

/// Check if a directory is writable by creating and removing a probe file
fn can_write_to(dir: &Path) -> bool {
    let probe = dir.join(".bootcfg_test_write");
    match fs::write(&probe, b"") {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_can_write_to() {
        let temp_dir = TempDir::new().unwrap();
        assert!(can_write_to(temp_dir.path()));
        assert!(!can_write_to(&temp_dir.path().join("missing")));
    }
}
