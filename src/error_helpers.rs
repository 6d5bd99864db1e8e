//! Error helper functions for creating actionable error messages

use std::io;
use std::path::Path;

/// Check if an IO error is a permission denied error
pub fn is_permission_denied(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}

/// Check if an IO error is a "not found" error
pub fn is_not_found(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}

/// Check if an IO error comes from a read-only filesystem
pub fn is_read_only_fs(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::ReadOnlyFilesystem
}

fn parent_of(path: &Path) -> String {
    path.parent()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_string())
}

/// Create an enhanced error message for a failed access to a boot config file
pub fn access_error(path: &Path, operation: &str, err: &io::Error) -> String {
    if is_permission_denied(err) {
        format!(
            "Permission denied when {} '{}'\n\n\
             Possible fixes:\n\
             1. Run bootcfg as root: sudo bootcfg ...\n\
             2. Check file permissions: ls -l '{}'\n\
             3. Check directory permissions: ls -ld '{}'",
            operation,
            path.display(),
            path.display(),
            parent_of(path)
        )
    } else if is_read_only_fs(err) {
        format!(
            "Read-only filesystem when {} '{}'\n\n\
             Possible fixes:\n\
             1. Remount the boot partition read-write: mount -o remount,rw '{}'",
            operation,
            path.display(),
            parent_of(path)
        )
    } else if is_not_found(err) {
        not_found_error(path, operation)
    } else {
        format!("Failed {} '{}': {}", operation, path.display(), err)
    }
}

/// Create an enhanced error message for file not found issues
pub fn not_found_error(path: &Path, context: &str) -> String {
    format!(
        "File not found: '{}'\n\n\
         Context: {}\n\n\
         Possible fixes:\n\
         1. Check the [paths] section of the bootcfg configuration\n\
         2. Make sure the boot partition is mounted at '{}'\n\
         3. Create a managed file first: bootcfg ensure",
        path.display(),
        context,
        parent_of(path)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn test_is_permission_denied() {
        let perm_err = io::Error::new(ErrorKind::PermissionDenied, "access denied");
        assert!(is_permission_denied(&perm_err));

        let not_found_err = io::Error::new(ErrorKind::NotFound, "not found");
        assert!(!is_permission_denied(&not_found_err));
    }

    #[test]
    fn test_is_not_found() {
        let not_found_err = io::Error::new(ErrorKind::NotFound, "not found");
        assert!(is_not_found(&not_found_err));

        let perm_err = io::Error::new(ErrorKind::PermissionDenied, "access denied");
        assert!(!is_not_found(&perm_err));
    }

    #[test]
    fn test_access_error_permission() {
        let path = Path::new("/boot/config.txt");
        let err = io::Error::new(ErrorKind::PermissionDenied, "denied");
        let msg = access_error(path, "writing", &err);
        assert!(msg.contains("Permission denied"));
        assert!(msg.contains("writing"));
        assert!(msg.contains("/boot/config.txt"));
        assert!(msg.contains("sudo"));
    }

    #[test]
    fn test_access_error_read_only() {
        let path = Path::new("/boot/config.txt");
        let err = io::Error::new(ErrorKind::ReadOnlyFilesystem, "ro");
        let msg = access_error(path, "writing", &err);
        assert!(msg.contains("remount"));
        assert!(msg.contains("'/boot'"));
    }

    #[test]
    fn test_not_found_error_formatting() {
        let path = Path::new("/boot/config_pi1_backup.txt");
        let msg = not_found_error(path, "taking snapshot");
        assert!(msg.contains("File not found"));
        assert!(msg.contains("/boot/config_pi1_backup.txt"));
        assert!(msg.contains("taking snapshot"));
        assert!(msg.contains("Possible fixes"));
    }
}
