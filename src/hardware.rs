//! Checks that the tool is running on the board it manages

use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::config::PathsConfig;
use crate::error::BootConfigError;

/// Locate the display-service binary.
///
/// Absolute or relative paths are checked as given; a bare name is looked up
/// on `PATH`.
pub fn find_display_service(tvservice: &str) -> Option<PathBuf> {
    let candidate = Path::new(tvservice);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.exists().then(|| candidate.to_path_buf());
    }
    which::which(tvservice).ok()
}

/// Fail unless the display service binary and the primary boot config exist.
pub fn enforce_expected_hardware(paths: &PathsConfig) -> Result<(), BootConfigError> {
    let service = find_display_service(&paths.tvservice);
    let primary_exists = Path::new(&paths.primary).exists();
    debug!(
        "Hardware check: display service {:?}, primary config present: {}",
        service, primary_exists
    );

    if service.is_some() && primary_exists {
        return Ok(());
    }

    let mut missing = Vec::new();
    if service.is_none() {
        missing.push(format!("display service '{}'", paths.tvservice));
    }
    if !primary_exists {
        missing.push(format!("boot config '{}'", paths.primary));
    }

    error!("need to run on a Raspberry Pi");
    Err(BootConfigError::precondition(format!(
        "need to run on a Raspberry Pi (missing {})",
        missing.join(" and ")
    )))
}
