//! Safe-mode snapshot and restore of the primary boot config
//!
//! Before a risky change (display mode, overclocking) the primary file is
//! copied to a fixed backup path. The existence of that copy is the only
//! state: while it exists the device is running a config that has not been
//! confirmed good, and `restore` puts the snapshot back.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::disk_space::check_disk_space_for_snapshot;
use crate::error::BootConfigError;
use crate::error_helpers::access_error;
use crate::file_access;

/// What `bootcfg status` reports about the snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStatus {
    pub primary: PathBuf,
    pub snapshot: PathBuf,
    pub restored_state: bool,
    pub size_bytes: Option<u64>,
    pub modified: Option<DateTime<Local>>,
}

pub struct SafeModeBackup {
    primary: PathBuf,
    snapshot: PathBuf,
    max_disk_usage_percent: f64,
}

impl SafeModeBackup {
    pub fn new(primary: impl Into<PathBuf>, snapshot: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            snapshot: snapshot.into(),
            max_disk_usage_percent: 60.0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            primary: PathBuf::from(&config.paths.primary),
            snapshot: PathBuf::from(&config.paths.safemode_backup),
            max_disk_usage_percent: config.snapshot.max_disk_usage_percent,
        }
    }

    pub fn with_max_disk_usage_percent(mut self, percent: f64) -> Self {
        self.max_disk_usage_percent = percent;
        self
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot
    }

    /// Copy the primary file to the snapshot path, keeping permissions and
    /// timestamps. Overwrites an earlier snapshot.
    ///
    /// The copy is staged in a temporary file next to the snapshot and renamed
    /// into place once synced, so a failed snapshot leaves no new file behind.
    pub fn snapshot(&self) -> Result<()> {
        let metadata = fs::metadata(&self.primary).map_err(|e| {
            let msg = access_error(&self.primary, "taking safe-mode snapshot of", &e);
            anyhow::Error::new(e).context(msg)
        })?;

        let target_dir = self
            .snapshot
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        check_disk_space_for_snapshot(target_dir, metadata.len(), self.max_disk_usage_percent)
            .context("Cannot take safe-mode snapshot")?;

        let staged = tempfile::Builder::new()
            .prefix(".bootcfg-snapshot")
            .tempfile_in(target_dir)
            .with_context(|| format!("Failed to stage snapshot in {}", target_dir.display()))?;

        fs::copy(&self.primary, staged.path()).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                self.primary.display(),
                self.snapshot.display()
            )
        })?;

        let mut times = FileTimes::new();
        if let Ok(accessed) = metadata.accessed() {
            times = times.set_accessed(accessed);
        }
        if let Ok(modified) = metadata.modified() {
            times = times.set_modified(modified);
        }
        if let Err(e) = staged.as_file().set_times(times) {
            warn!("Could not preserve timestamps on {}: {}", self.snapshot.display(), e);
        }
        staged
            .as_file()
            .sync_all()
            .with_context(|| format!("Failed to sync snapshot: {}", self.snapshot.display()))?;

        staged
            .persist(&self.snapshot)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to save snapshot: {}", self.snapshot.display()))?;

        info!("Snapshot of {} saved to {}", self.primary.display(), self.snapshot.display());
        Ok(())
    }

    /// True while a snapshot exists, i.e. the current config is unconfirmed.
    pub fn is_restored_state(&self) -> bool {
        self.snapshot.is_file()
    }

    /// Move the snapshot back over the primary file, consuming it.
    pub fn restore(&self) -> Result<()> {
        if !self.is_restored_state() {
            return Err(BootConfigError::NoSnapshot(self.snapshot.clone()).into());
        }

        match fs::rename(&self.snapshot, &self.primary) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                let content = fs::read(&self.snapshot).with_context(|| {
                    format!("Failed to read snapshot: {}", self.snapshot.display())
                })?;
                file_access::write_bytes(&self.primary, &content)?;
                fs::remove_file(&self.snapshot).with_context(|| {
                    format!("Failed to remove snapshot: {}", self.snapshot.display())
                })?;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "Failed to move {} to {}",
                        self.snapshot.display(),
                        self.primary.display()
                    )
                });
            }
        }

        File::open(&self.primary)
            .and_then(|f| f.sync_all())
            .with_context(|| format!("Failed to sync {}", self.primary.display()))?;

        info!("Restored {} from {}", self.primary.display(), self.snapshot.display());
        Ok(())
    }

    pub fn status(&self) -> SnapshotStatus {
        let metadata = fs::metadata(&self.snapshot).ok().filter(|m| m.is_file());

        SnapshotStatus {
            primary: self.primary.clone(),
            snapshot: self.snapshot.clone(),
            restored_state: metadata.is_some(),
            size_bytes: metadata.as_ref().map(|m| m.len()),
            modified: metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Local>::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_backup(content: &str) -> (SafeModeBackup, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let primary = temp_dir.path().join("config.txt");
        fs::write(&primary, content).unwrap();
        let backup = SafeModeBackup::new(primary, temp_dir.path().join("config.txt.orig"))
            .with_max_disk_usage_percent(100.0);
        (backup, temp_dir)
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let (backup, _dir) = create_test_backup("hdmi_mode=4\n");
        assert!(!backup.is_restored_state());

        backup.snapshot().unwrap();
        assert!(backup.is_restored_state());

        fs::write(backup.primary(), "hdmi_mode=99\n").unwrap();
        backup.restore().unwrap();

        assert_eq!(fs::read_to_string(backup.primary()).unwrap(), "hdmi_mode=4\n");
        assert!(!backup.is_restored_state());
        assert!(!backup.snapshot_path().exists());
    }

    #[test]
    fn test_snapshot_overwrites_previous() {
        let (backup, _dir) = create_test_backup("a=1\n");
        backup.snapshot().unwrap();
        fs::write(backup.primary(), "a=2\n").unwrap();
        backup.snapshot().unwrap();
        assert_eq!(fs::read_to_string(backup.snapshot_path()).unwrap(), "a=2\n");
    }

    #[test]
    fn test_snapshot_preserves_mtime() {
        let (backup, _dir) = create_test_backup("a=1\n");
        let original = fs::metadata(backup.primary()).unwrap().modified().unwrap();
        backup.snapshot().unwrap();
        let copied = fs::metadata(backup.snapshot_path()).unwrap().modified().unwrap();
        assert_eq!(original, copied);
    }

    #[cfg(unix)]
    #[test]
    fn test_snapshot_of_read_only_primary() {
        use std::os::unix::fs::PermissionsExt;

        let (backup, _dir) = create_test_backup("hdmi_mode=4\n");
        fs::set_permissions(backup.primary(), fs::Permissions::from_mode(0o444)).unwrap();

        backup.snapshot().unwrap();
        assert!(backup.is_restored_state());
        let mode = fs::metadata(backup.snapshot_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o444);

        // A second snapshot replaces the read-only copy
        backup.snapshot().unwrap();
        assert_eq!(fs::read_to_string(backup.snapshot_path()).unwrap(), "hdmi_mode=4\n");

        backup.restore().unwrap();
        assert!(!backup.is_restored_state());
        assert_eq!(fs::read_to_string(backup.primary()).unwrap(), "hdmi_mode=4\n");
    }

    #[test]
    fn test_failed_snapshot_leaves_no_restored_state() {
        let (backup, dir) = create_test_backup("a=1\n");
        let backup = SafeModeBackup::new(
            backup.primary(),
            dir.path().join("missing_dir").join("config.txt.orig"),
        );
        assert!(backup.snapshot().is_err());
        assert!(!backup.is_restored_state());
    }

    #[test]
    fn test_snapshot_leaves_no_staging_files() {
        let (backup, dir) = create_test_backup("a=1\n");
        backup.snapshot().unwrap();
        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        names.sort();
        assert_eq!(names, vec!["config.txt", "config.txt.orig"]);
    }

    #[test]
    fn test_snapshot_missing_primary_fails() {
        let temp_dir = TempDir::new().unwrap();
        let backup = SafeModeBackup::new(
            temp_dir.path().join("missing.txt"),
            temp_dir.path().join("missing.txt.orig"),
        );
        assert!(backup.snapshot().is_err());
        assert!(!backup.is_restored_state());
    }

    #[test]
    fn test_restore_without_snapshot() {
        let (backup, _dir) = create_test_backup("a=1\n");
        let err = backup.restore().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootConfigError>(),
            Some(BootConfigError::NoSnapshot(_))
        ));
        assert_eq!(fs::read_to_string(backup.primary()).unwrap(), "a=1\n");
    }

    #[test]
    fn test_status() {
        let (backup, _dir) = create_test_backup("a=1\n");
        let status = backup.status();
        assert!(!status.restored_state);
        assert_eq!(status.size_bytes, None);

        backup.snapshot().unwrap();
        let status = backup.status();
        assert!(status.restored_state);
        assert_eq!(status.size_bytes, Some(4));
        assert!(status.modified.is_some());
    }
}
