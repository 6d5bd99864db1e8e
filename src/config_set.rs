//! The primary boot config and its hardware-variant backups
//!
//! Settings that must survive a board swap are written to all three files.
//! Each file is updated independently: a failure on one does not roll back
//! the others, and the caller gets a per-file report.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::error;

use crate::boot_config::BootConfig;
use crate::config::PathsConfig;
use crate::error::BootConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Primary,
    Pi1Backup,
    Pi2Backup,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::Primary, Target::Pi1Backup, Target::Pi2Backup];

    pub fn label(self) -> &'static str {
        match self {
            Target::Primary => "primary",
            Target::Pi1Backup => "pi1",
            Target::Pi2Backup => "pi2",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one operation on one file.
#[derive(Debug)]
pub struct FileOutcome<T> {
    pub target: Target,
    pub path: PathBuf,
    pub result: Result<T>,
}

/// Per-file results of an operation applied to several files.
#[derive(Debug)]
pub struct FanOutReport<T> {
    pub outcomes: Vec<FileOutcome<T>>,
}

impl<T> FanOutReport<T> {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_count() == 0
    }

    /// `Err(PartialFailure)` naming every file that failed.
    pub fn check(&self) -> Result<(), BootConfigError> {
        let failures: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|o| {
                o.result
                    .as_ref()
                    .err()
                    .map(|e| format!("{}: {:#}", o.path.display(), e))
            })
            .collect();

        if failures.is_empty() {
            return Ok(());
        }

        Err(BootConfigError::PartialFailure {
            failed: failures.len(),
            total: self.outcomes.len(),
            summary: failures.join("; "),
        })
    }
}

/// Handles on the primary file and both variant backups.
#[derive(Debug, Clone)]
pub struct ConfigSet {
    primary: BootConfig,
    pi1_backup: BootConfig,
    pi2_backup: BootConfig,
}

impl ConfigSet {
    pub fn new(primary: BootConfig, pi1_backup: BootConfig, pi2_backup: BootConfig) -> Self {
        Self {
            primary,
            pi1_backup,
            pi2_backup,
        }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self::new(
            BootConfig::new(&paths.primary),
            BootConfig::new(&paths.pi1_backup),
            BootConfig::new(&paths.pi2_backup),
        )
    }

    /// Put every handle into dry-run mode.
    pub fn set_dry_run(&mut self) {
        self.primary.set_dry_run();
        self.pi1_backup.set_dry_run();
        self.pi2_backup.set_dry_run();
    }

    pub fn get(&self, target: Target) -> &BootConfig {
        match target {
            Target::Primary => &self.primary,
            Target::Pi1Backup => &self.pi1_backup,
            Target::Pi2Backup => &self.pi2_backup,
        }
    }

    pub fn primary(&self) -> &BootConfig {
        &self.primary
    }

    pub fn path_of(&self, target: Target) -> &Path {
        self.get(target).path()
    }

    /// Run `op` on each target in order, collecting every result.
    ///
    /// All targets are attempted even after a failure.
    pub fn apply<T, F>(&self, targets: &[Target], mut op: F) -> FanOutReport<T>
    where
        F: FnMut(&BootConfig) -> Result<T>,
    {
        let outcomes = targets
            .iter()
            .map(|&target| {
                let config = self.get(target);
                let result = op(config);
                if let Err(e) = &result {
                    error!("Failed to update {}: {:#}", config.path().display(), e);
                }
                FileOutcome {
                    target,
                    path: config.path().to_path_buf(),
                    result,
                }
            })
            .collect();

        FanOutReport { outcomes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_set(dir: &Path) -> ConfigSet {
        let paths = PathsConfig {
            primary: dir.join("config.txt").display().to_string(),
            pi1_backup: dir.join("config_pi1_backup.txt").display().to_string(),
            pi2_backup: dir.join("config_pi2_backup.txt").display().to_string(),
            safemode_backup: dir.join("config.txt.orig").display().to_string(),
            tvservice: "tvservice".to_string(),
        };
        ConfigSet::from_paths(&paths)
    }

    #[test]
    fn test_apply_to_all_targets() {
        let temp_dir = TempDir::new().unwrap();
        let set = create_test_set(temp_dir.path());
        for target in Target::ALL {
            fs::write(set.path_of(target), "a=1\n").unwrap();
        }

        let report = set.apply(&Target::ALL, |config| config.set_value("hdmi_mode", Some("4")));
        assert!(report.is_complete());
        assert!(report.check().is_ok());
        for target in Target::ALL {
            assert_eq!(
                fs::read_to_string(set.path_of(target)).unwrap(),
                "a=1\nhdmi_mode=4\n"
            );
        }
    }

    #[test]
    fn test_partial_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let set = create_test_set(temp_dir.path());
        fs::write(set.path_of(Target::Primary), "a=1\n").unwrap();
        fs::write(set.path_of(Target::Pi2Backup), "a=1\n").unwrap();
        // A directory where a file is expected makes the write fail
        fs::create_dir(set.path_of(Target::Pi1Backup)).unwrap();

        let report = set.apply(&Target::ALL, |config| config.set_value("b", Some("2")));
        assert_eq!(report.failed_count(), 1);
        assert!(report.outcomes[1].result.is_err());

        // The other files were still updated
        assert_eq!(fs::read_to_string(set.path_of(Target::Primary)).unwrap(), "a=1\nb=2\n");
        assert_eq!(fs::read_to_string(set.path_of(Target::Pi2Backup)).unwrap(), "a=1\nb=2\n");

        match report.check() {
            Err(BootConfigError::PartialFailure { failed, total, summary }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 3);
                assert!(summary.contains("config_pi1_backup.txt"));
            }
            other => panic!("expected PartialFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_set_dry_run_applies_to_every_handle() {
        let temp_dir = TempDir::new().unwrap();
        let mut set = create_test_set(temp_dir.path());
        set.set_dry_run();
        for target in Target::ALL {
            assert!(set.get(target).is_dry_run());
        }
    }

    #[test]
    fn test_target_labels() {
        assert_eq!(Target::Primary.to_string(), "primary");
        assert_eq!(Target::Pi1Backup.label(), "pi1");
        assert_eq!(Target::Pi2Backup.label(), "pi2");
    }
}
