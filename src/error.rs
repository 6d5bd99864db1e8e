//! Typed failures that callers need to tell apart
//!
//! I/O problems travel as `anyhow::Error` with path context attached. The
//! variants here are the ones the binary matches on to pick an exit status.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootConfigError {
    /// Setting or annotation name that cannot be represented as a single line key
    #[error("Invalid setting name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Value that would break the one-setting-per-line format
    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: &'static str },

    /// The device is not the hardware this tool manages
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// `restore` was asked for but no safe-mode snapshot exists
    #[error("No safe-mode snapshot at {}", .0.display())]
    NoSnapshot(PathBuf),

    /// A multi-file update where at least one file failed
    #[error("{failed} of {total} config files failed to update: {summary}")]
    PartialFailure {
        failed: usize,
        total: usize,
        summary: String,
    },
}

impl BootConfigError {
    pub fn invalid_name(name: &str, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.to_string(),
            reason,
        }
    }

    pub fn invalid_value(name: &str, reason: &'static str) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            reason,
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}

/// Reject names the line format cannot hold.
pub fn validate_name(name: &str) -> Result<(), BootConfigError> {
    if name.is_empty() {
        return Err(BootConfigError::invalid_name(name, "name is empty"));
    }
    if name.contains('=') {
        return Err(BootConfigError::invalid_name(name, "name contains '='"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(BootConfigError::invalid_name(name, "name contains whitespace"));
    }
    Ok(())
}

/// Values may contain anything except a line break.
pub fn validate_value(name: &str, value: &str) -> Result<(), BootConfigError> {
    if value.contains('\n') || value.contains('\r') {
        return Err(BootConfigError::invalid_value(name, "value contains a line break"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("hdmi_mode").is_ok());
        assert!(validate_name("dtparam").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a=b").is_err());
        assert!(validate_name("two words").is_err());
        assert!(validate_name("line\nbreak").is_err());
    }

    #[test]
    fn test_validate_value() {
        assert!(validate_value("x", "1").is_ok());
        assert!(validate_value("x", "spi=on").is_ok());
        assert!(validate_value("x", "").is_ok());
        assert!(validate_value("x", "1\nfoo=2").is_err());
    }

    #[test]
    fn test_error_display() {
        let err = BootConfigError::PartialFailure {
            failed: 1,
            total: 3,
            summary: "/boot/config_pi1_backup.txt: Permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "1 of 3 config files failed to update: /boot/config_pi1_backup.txt: Permission denied"
        );

        let err = BootConfigError::NoSnapshot(PathBuf::from("/boot/config.txt.orig"));
        assert!(err.to_string().contains("/boot/config.txt.orig"));
    }
}
