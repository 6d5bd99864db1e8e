//! Configuration management for bootcfg
//!
//! The configuration names the well-known files this tool manages. It is read
//! from `--config`, `$BOOTCFG_CONFIG`, `/etc/bootcfg/config.toml` or
//! `~/.bootcfg/config.toml`, in that order. A missing file means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "BOOTCFG_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/bootcfg/config.toml";

/// Line that third-party installers write before their appended settings.
pub const NOOBS_SENTINEL: &str = "# NOOBS Auto-generated Settings:";

/// bootcfg configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Well-known file locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Engine behaviour
    #[serde(default)]
    pub engine: EngineConfig,

    /// Safe-mode snapshot settings
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Boot config the firmware reads
    #[serde(default = "default_primary")]
    pub primary: String,

    /// Hardware-variant backup for first-generation boards
    #[serde(default = "default_pi1_backup")]
    pub pi1_backup: String,

    /// Hardware-variant backup for second-generation boards
    #[serde(default = "default_pi2_backup")]
    pub pi2_backup: String,

    /// Safe-mode snapshot of the primary file
    #[serde(default = "default_safemode_backup")]
    pub safemode_backup: String,

    /// Display service binary whose presence identifies the hardware
    #[serde(default = "default_tvservice")]
    pub tvservice: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            pi1_backup: default_pi1_backup(),
            pi2_backup: default_pi2_backup(),
            safemode_backup: default_safemode_backup(),
            tvservice: default_tvservice(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Start every handle in dry-run mode
    #[serde(default)]
    pub dry_run: bool,

    /// Sentinel used by `remove-block` when none is given
    #[serde(default = "default_noobs_sentinel")]
    pub noobs_sentinel: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            noobs_sentinel: default_noobs_sentinel(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Maximum percentage of free space a snapshot may use
    #[serde(default = "default_max_disk_usage_percent")]
    pub max_disk_usage_percent: f64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_disk_usage_percent: default_max_disk_usage_percent(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write a debug log file in addition to stderr
    #[serde(default)]
    pub debug: bool,
}

// Default functions for serde
fn default_primary() -> String { "/boot/config.txt".to_string() }
fn default_pi1_backup() -> String { "/boot/config_pi1_backup.txt".to_string() }
fn default_pi2_backup() -> String { "/boot/config_pi2_backup.txt".to_string() }
fn default_safemode_backup() -> String { "/boot/config.txt.orig".to_string() }
fn default_tvservice() -> String { "/usr/bin/tvservice".to_string() }
fn default_noobs_sentinel() -> String { NOOBS_SENTINEL.to_string() }
fn default_max_disk_usage_percent() -> f64 { 60.0 }

/// Get the configuration file path
///
/// An explicit path wins, then `$BOOTCFG_CONFIG`, then the system-wide file if
/// it exists, then the per-user file.
pub fn config_file_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let system = PathBuf::from(SYSTEM_CONFIG_PATH);
    if system.exists() {
        return Ok(system);
    }

    let home_dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home_dir.join(".bootcfg").join("config.toml"))
}

/// Get the default configuration file content with comments
fn get_default_config_content() -> &'static str {
    r##"# bootcfg Configuration File
#
# Paths of the files bootcfg manages and how it treats them.

[paths]
# Boot config the firmware reads
primary = "/boot/config.txt"

# Hardware-variant backups that receive the same settings
pi1_backup = "/boot/config_pi1_backup.txt"
pi2_backup = "/boot/config_pi2_backup.txt"

# Safe-mode snapshot; while this file exists the device is in restored state
safemode_backup = "/boot/config.txt.orig"

# Display service binary used to recognise the hardware.
# A bare name is looked up on PATH.
tvservice = "/usr/bin/tvservice"

[engine]
# Compute and log changes without writing them (default: false)
dry_run = false

# Line marking the start of a block appended by third-party installers
noobs_sentinel = "# NOOBS Auto-generated Settings:"

[snapshot]
# Maximum percentage of free space a snapshot may use (default: 60)
max_disk_usage_percent = 60.0

[logging]
# Also log to /var/log/bootcfg.log or ~/.bootcfg/bootcfg.log (default: false)
debug = false
"##
}

/// Write the default commented configuration file to `path`
pub fn save_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    fs::write(path, get_default_config_content())
        .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

    Ok(())
}

/// Load configuration from `path`
///
/// A missing file yields the defaults. A malformed file is an error: it names
/// system paths, so it is never silently replaced.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    validate_config(&config)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;

    Ok(config)
}

/// Resolve the config location and load it
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, PathBuf)> {
    let path = config_file_path(explicit)?;
    let config = load_config_from(&path)?;
    Ok((config, path))
}

/// Render configuration as TOML
pub fn to_toml(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}

/// Validate configuration values
pub fn validate_config(config: &Config) -> Result<()> {
    let paths = [
        ("primary", &config.paths.primary),
        ("pi1_backup", &config.paths.pi1_backup),
        ("pi2_backup", &config.paths.pi2_backup),
        ("safemode_backup", &config.paths.safemode_backup),
        ("tvservice", &config.paths.tvservice),
    ];
    for (key, value) in paths {
        if value.trim().is_empty() {
            anyhow::bail!("Invalid paths.{}: must not be empty", key);
        }
    }

    if config.paths.safemode_backup == config.paths.primary {
        anyhow::bail!("Invalid paths.safemode_backup: must differ from paths.primary");
    }

    let percent = config.snapshot.max_disk_usage_percent;
    if !(0.0..=100.0).contains(&percent) {
        anyhow::bail!("Invalid max_disk_usage_percent: {} (must be 0-100)", percent);
    }

    if config.engine.noobs_sentinel.is_empty() {
        anyhow::bail!("Invalid noobs_sentinel: must not be empty");
    }

    Ok(())
}
