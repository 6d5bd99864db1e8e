//! Free space on the boot partition
//!
//! The boot partition on these devices is small, so a safe-mode snapshot is
//! only taken when it leaves enough room for the partition to stay usable.

use anyhow::{Context, Result};
use std::path::Path;

/// Bytes available to unprivileged users on the filesystem holding `path`.
///
/// `path` must exist; pass the directory that will hold the new file.
#[cfg(unix)]
pub fn available_bytes(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("Path contains a NUL byte: {}", path.display()))?;

    // # Safety
    //
    // `libc::statvfs` is plain old data, so an all-zero value is valid, and
    // the call only writes into it. `c_path` outlives the call. The return
    // value is checked before `stat` is read.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("Failed to query free space on {}", path.display()));
    }

    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn available_bytes(_path: &Path) -> Result<u64> {
    Err(anyhow::anyhow!("Free space query is only implemented on Unix targets"))
}

/// Check that a snapshot of `file_size` bytes fits in `target_dir`
///
/// Fails when the copy would use more than `max_percent` of the free space
/// left on the filesystem holding `target_dir`.
pub fn check_disk_space_for_snapshot(
    target_dir: &Path,
    file_size: u64,
    max_percent: f64,
) -> Result<()> {
    let available = available_bytes(target_dir)?;

    let percent_of_free = if available > 0 {
        (file_size as f64 / available as f64) * 100.0
    } else {
        100.0
    };

    if percent_of_free > max_percent {
        return Err(anyhow::anyhow!(
            "Insufficient disk space for snapshot\n\
             partition: {}\n\
             available: {} bytes\n\
             snapshot required: {} bytes ({:.1}% of free space)\n\
             maximum allowed: {:.1}% of free space\n\
             \n\
             Free space on the boot partition or raise\n\
             [snapshot] max_disk_usage_percent in the bootcfg config",
            target_dir.display(),
            available,
            file_size,
            percent_of_free,
            max_percent
        ));
    }

    Ok(())
}
