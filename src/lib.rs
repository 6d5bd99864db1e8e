//! bootcfg: crash-safe editing of key=value boot configuration files
//!
//! The library holds the mutation engine and its collaborators; the binary
//! at src/main.rs is a thin command-line front end over it.

pub mod boot_config;
pub mod cli;
pub mod config;
pub mod config_set;
pub mod diff_formatter;
pub mod disk_space;
pub mod error;
pub mod error_helpers;
pub mod exit_codes;
pub mod file_access;
pub mod hardware;
pub mod line_matcher;
pub mod logger;
pub mod safe_mode;

// Re-export commonly used types for convenience
pub use boot_config::{BootConfig, Mutation, SettingValue, WriteStatus};
pub use config::Config;
pub use config_set::{ConfigSet, FanOutReport, Target};
pub use error::BootConfigError;
pub use line_matcher::{find_setting, SettingMatcher};
pub use safe_mode::SafeModeBackup;
