//! Process exit statuses for the `bootcfg` binary

use crate::error::BootConfigError;
use std::io;

pub const SUCCESS: i32 = 0;
pub const UNEXPECTED_ERROR: i32 = 1;
pub const MISSING_DEPENDENCIES: i32 = 11;
pub const INCORRECT_ARGS: i32 = 12;
pub const REQUIRES_ROOT: i32 = 13;

/// Exit status for a failed argument parse: `--help` and `--version` are
/// not failures.
pub fn for_parse_error(err: &clap::Error) -> i32 {
    match err.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => SUCCESS,
        _ => INCORRECT_ARGS,
    }
}

/// Pick the exit status for an error returned from a command.
pub fn for_error(err: &anyhow::Error) -> i32 {
    if let Some(typed) = err.downcast_ref::<BootConfigError>() {
        return match typed {
            BootConfigError::Precondition(_) => MISSING_DEPENDENCIES,
            BootConfigError::InvalidName { .. } | BootConfigError::InvalidValue { .. } => {
                INCORRECT_ARGS
            }
            BootConfigError::NoSnapshot(_) | BootConfigError::PartialFailure { .. } => {
                UNEXPECTED_ERROR
            }
        };
    }

    let denied = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(crate::error_helpers::is_permission_denied);
    if denied { REQUIRES_ROOT } else { UNEXPECTED_ERROR }
}
