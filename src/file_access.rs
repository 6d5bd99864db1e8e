//! Locked, durable access to a line-oriented config file
//!
//! Lines are raw bytes: boot partitions are written by many tools and a
//! single stray Latin-1 byte must not make the file unreadable.
//!
//! Every write replaces the whole file: the new content is rendered in memory
//! first, then the locked file is truncated, written, flushed and fsynced in
//! one go. Consistency comes from flush+fsync while holding an advisory
//! `flock`, not from a temp-file rename. The file keeps its inode, owner and
//! mode.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error_helpers::{access_error, is_not_found};

/// Content written by `ensure_exists`. Without at least one line the engine
/// treats the file as unmanaged and refuses to write to it.
pub const PLACEHOLDER_LINE: &[u8] = b"#";

/// One line of a config file without its terminator.
pub type Line = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// An open config file holding an advisory lock until dropped.
///
/// Read-modify-write cycles go through a single `LockedFile` so that no other
/// cooperating process can write between the read and the fsync.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
    path: PathBuf,
}

impl LockedFile {
    /// Open an existing file for read-modify-write under an exclusive lock.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn open_for_update(path: &Path) -> Result<Option<Self>> {
        let opened = OpenOptions::new().read(true).write(true).open(path);
        Self::from_open(opened, path, LockMode::Exclusive, "opening for update")
    }

    /// Open an existing file for reading under a shared lock.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn open_for_read(path: &Path) -> Result<Option<Self>> {
        let opened = OpenOptions::new().read(true).open(path);
        Self::from_open(opened, path, LockMode::Shared, "opening for read")
    }

    fn from_open(
        opened: io::Result<File>,
        path: &Path,
        mode: LockMode,
        operation: &str,
    ) -> Result<Option<Self>> {
        let file = match opened {
            Ok(file) => file,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => {
                let msg = access_error(path, operation, &e);
                return Err(anyhow::Error::new(e).context(msg));
            }
        };

        lock(&file, mode)
            .with_context(|| format!("Failed to lock {}", path.display()))?;
        debug!("Locked {} ({:?})", path.display(), mode);

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file as lines, without line terminators.
    pub fn read_lines(&mut self) -> Result<Vec<Line>> {
        self.file
            .seek(SeekFrom::Start(0))
            .with_context(|| format!("Failed to seek {}", self.path.display()))?;

        let mut content = Vec::new();
        self.file
            .read_to_end(&mut content)
            .with_context(|| format!("Failed to read file: {}", self.path.display()))?;

        Ok(split_lines(&content))
    }

    /// Replace the file content with `lines`, each followed by a newline.
    ///
    /// The content is fully rendered before the file is truncated. Returns
    /// once the data has been flushed and fsynced.
    pub fn rewrite(&mut self, lines: &[Line]) -> Result<()> {
        self.replace_content(&render_lines(lines))?;
        debug!("Wrote {} lines to {}", lines.len(), self.path.display());
        Ok(())
    }

    /// Replace the file content with `content` verbatim, then flush and fsync.
    pub fn replace_content(&mut self, content: &[u8]) -> Result<()> {
        let path = self.path.clone();
        let fail = |e: io::Error| {
            let msg = access_error(&path, "writing", &e);
            anyhow::Error::new(e).context(msg)
        };

        self.file.set_len(0).map_err(fail)?;
        self.file.seek(SeekFrom::Start(0)).map_err(fail)?;
        self.file.write_all(content).map_err(fail)?;
        self.file.flush().map_err(fail)?;
        self.file.sync_all().map_err(fail)?;
        Ok(())
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock anyway
        let _ = unlock(&self.file);
    }
}

/// Create `path` holding a single placeholder line if it does not exist yet.
///
/// Returns `true` when the file was created, `false` when it already existed.
///
/// The lock is taken right after `create_new`. A concurrent mutation that
/// opens the file inside that window sees it empty and skips, which is the
/// same outcome as running before the file existed.
pub fn ensure_exists(path: &Path) -> Result<bool> {
    let opened = OpenOptions::new().write(true).create_new(true).open(path);
    let file = match opened {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            let msg = access_error(path, "creating", &e);
            return Err(anyhow::Error::new(e).context(msg));
        }
    };

    lock(&file, LockMode::Exclusive)
        .with_context(|| format!("Failed to lock {}", path.display()))?;

    let mut locked = LockedFile {
        file,
        path: path.to_path_buf(),
    };
    locked.rewrite(&[PLACEHOLDER_LINE.to_vec()])?;
    Ok(true)
}

/// Read all lines of `path`; an absent file reads as no lines.
pub fn read_lines(path: &Path) -> Result<Vec<Line>> {
    match LockedFile::open_for_read(path)? {
        Some(mut locked) => locked.read_lines(),
        None => Ok(Vec::new()),
    }
}

/// Replace the content of `path` with `lines`, creating it if needed.
pub fn write_lines(path: &Path, lines: &[Line]) -> Result<()> {
    write_bytes(path, &render_lines(lines))
}

/// Replace the content of `path` with `content` byte for byte, creating it
/// if needed.
pub fn write_bytes(path: &Path, content: &[u8]) -> Result<()> {
    let opened = OpenOptions::new().write(true).create(true).truncate(false).open(path);
    let file = opened.map_err(|e| {
        let msg = access_error(path, "opening for write", &e);
        anyhow::Error::new(e).context(msg)
    })?;

    lock(&file, LockMode::Exclusive)
        .with_context(|| format!("Failed to lock {}", path.display()))?;

    let mut locked = LockedFile {
        file,
        path: path.to_path_buf(),
    };
    locked.replace_content(content)
}

/// Split file content into lines, dropping `\n` / `\r\n` terminators.
pub fn split_lines(content: &[u8]) -> Vec<Line> {
    content
        .split_inclusive(|&b| b == b'\n')
        .map(|chunk| match chunk.strip_suffix(b"\n") {
            Some(line) => line.strip_suffix(b"\r").unwrap_or(line),
            None => chunk,
        })
        .map(<[u8]>::to_vec)
        .collect()
}

/// Render lines as file content: every line ends with `\n`.
pub fn render_lines(lines: &[Line]) -> Vec<u8> {
    let capacity = lines.iter().map(|l| l.len() + 1).sum();
    let mut content = Vec::with_capacity(capacity);
    for line in lines {
        content.extend_from_slice(line);
        content.push(b'\n');
    }
    content
}

#[cfg(unix)]
fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    loop {
        // # Safety
        //
        // `flock` only reads the descriptor number, which stays valid for the
        // lifetime of the borrowed `File`. The return value is checked.
        let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(unix)]
fn lock(file: &File, mode: LockMode) -> io::Result<()> {
    let operation = match mode {
        LockMode::Shared => libc::LOCK_SH,
        LockMode::Exclusive => libc::LOCK_EX,
    };
    flock(file, operation)
}

#[cfg(unix)]
fn unlock(file: &File) -> io::Result<()> {
    flock(file, libc::LOCK_UN)
}

/// Advisory locking is not available; access is not serialised.
#[cfg(not(unix))]
fn lock(_file: &File, _mode: LockMode) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_config::BootConfig;
    use std::fs;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn lines(items: &[&str]) -> Vec<Line> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_ensure_exists_creates_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.txt");

        assert!(ensure_exists(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "#\n");
    }

    #[test]
    fn test_ensure_exists_is_noop_on_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.txt");
        fs::write(&path, "hdmi_mode=4\n").unwrap();

        assert!(!ensure_exists(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "hdmi_mode=4\n");
    }

    #[test]
    fn test_ensure_exists_racing_set_value() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.txt");

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            BootConfig::new(writer_path).set_value("x", Some("1")).unwrap()
        });
        assert!(ensure_exists(&path).unwrap());
        writer.join().unwrap();

        // Either the update ran first and skipped, or it saw the placeholder
        let content = fs::read_to_string(&path).unwrap();
        assert!(content == "#\n" || content == "#\nx=1\n", "got {:?}", content);
    }

    #[test]
    fn test_read_lines_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.txt");
        assert!(read_lines(&path).unwrap().is_empty());
    }

    #[test]
    fn test_read_lines_empty_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.txt");
        fs::write(&path, "").unwrap();
        assert!(read_lines(&path).unwrap().is_empty());
    }

    #[test]
    fn test_read_lines_strips_terminators() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.txt");
        fs::write(&path, "a=1\r\nb=2\n#c=3").unwrap();
        assert_eq!(read_lines(&path).unwrap(), lines(&["a=1", "b=2", "#c=3"]));
    }

    #[test]
    fn test_read_lines_keeps_non_utf8_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.txt");
        fs::write(&path, b"# caf\xe9 display\nhdmi_mode=4\n").unwrap();

        let read = read_lines(&path).unwrap();
        assert_eq!(read, vec![b"# caf\xe9 display".to_vec(), b"hdmi_mode=4".to_vec()]);

        write_lines(&path, &read).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"# caf\xe9 display\nhdmi_mode=4\n");
    }

    #[test]
    fn test_split_lines() {
        assert!(split_lines(b"").is_empty());
        assert_eq!(split_lines(b"\n"), lines(&[""]));
        assert_eq!(split_lines(b"a\n\nb"), lines(&["a", "", "b"]));
        assert_eq!(split_lines(b"a\r"), lines(&["a\r"]));
    }

    #[test]
    fn test_write_lines_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.txt");
        fs::write(&path, "a much longer original line\nsecond\nthird\n").unwrap();

        write_lines(&path, &lines(&["x=1"])).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x=1\n");
    }

    #[test]
    fn test_write_bytes_is_verbatim() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.txt");
        fs::write(&path, "old content that is longer\n").unwrap();

        write_bytes(&path, b"a=1\r\nno_newline").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"a=1\r\nno_newline");
    }

    #[test]
    fn test_update_cycle_under_one_lock() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.txt");
        fs::write(&path, "a=1\nb=2\n").unwrap();

        let mut locked = LockedFile::open_for_update(&path).unwrap().unwrap();
        let mut current = locked.read_lines().unwrap();
        current.push(b"c=3".to_vec());
        locked.rewrite(&current).unwrap();
        drop(locked);

        assert_eq!(fs::read_to_string(&path).unwrap(), "a=1\nb=2\nc=3\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_serialises_writers() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.txt");
        fs::write(&path, "a=1\n").unwrap();

        let mut held = LockedFile::open_for_update(&path).unwrap().unwrap();
        let mut current = held.read_lines().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            BootConfig::new(writer_path).set_value("b", Some("2")).unwrap();
            done_tx.send(()).unwrap();
        });

        // The second writer must block on the lock
        assert!(done_rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "a=1\n");

        current.push(b"c=3".to_vec());
        held.rewrite(&current).unwrap();
        drop(held);

        done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        writer.join().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a=1\nc=3\nb=2\n");
    }

    #[test]
    fn test_open_for_update_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.txt");
        assert!(LockedFile::open_for_update(&path).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_render_lines() {
        assert_eq!(render_lines(&[]), b"");
        assert_eq!(render_lines(&lines(&["a", "", "b"])), b"a\n\nb\n");
    }
}
