//! Reading and rewriting settings in a boot configuration file
//!
//! Every operation re-reads the file from disk. Mutations are planned as a
//! pure function from the current lines to the new lines, then written back
//! through a [`LockedFile`] held across the whole read-modify-write cycle.
//!
//! Empty or absent files are left alone by every mutation: a file that should
//! be managed must first be created with [`BootConfig::ensure_exists`].

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{validate_name, validate_value};
use crate::file_access::{self, Line, LockedFile};
use crate::line_matcher::{self, SettingMatcher};

/// Value read back from a setting line.
///
/// Absent settings read as `Integer(0)`, the same as a setting explicitly set
/// to `0`; callers cannot tell the two apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Integer(i64),
    Text(String),
}

impl SettingValue {
    /// Integer literals become `Integer`, anything else stays text.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) => SettingValue::Integer(n),
            Err(_) => SettingValue::Text(raw.to_string()),
        }
    }

    /// Same as [`parse`](Self::parse) for a raw value read from disk.
    /// Bytes that are not valid UTF-8 come back as U+FFFD.
    pub fn from_bytes(raw: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(raw))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SettingValue::Integer(n) => Some(*n),
            SettingValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Integer(_) => None,
            SettingValue::Text(s) => Some(s),
        }
    }
}

impl Default for SettingValue {
    fn default() -> Self {
        SettingValue::Integer(0)
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Integer(n) => write!(f, "{}", n),
            SettingValue::Text(s) => f.write_str(s),
        }
    }
}

/// What happened to the file during a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    /// New content was written and fsynced.
    Written,
    /// Dry-run mode: new content was computed but not written.
    DryRun,
    /// Planned content equals the current content; nothing was written.
    Unchanged,
    /// File is absent or empty; nothing was done.
    SkippedEmpty,
}

/// Result of a mutating operation: the file's lines before and after.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub path: PathBuf,
    pub status: WriteStatus,
    pub before: Vec<Line>,
    pub after: Vec<Line>,
}

impl Mutation {
    fn skipped(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            status: WriteStatus::SkippedEmpty,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// True if the content differs, whether or not it was written.
    pub fn is_change(&self) -> bool {
        self.before != self.after
    }
}

/// New lines for setting `name` to `value`, or disabling it when `value` is `None`.
///
/// The first matching line (active or disabled) is replaced with `name=value`,
/// or with the literal `#name=0` when disabling. Later duplicates pass through
/// untouched. With no match, `name=value` is appended; disabling a setting
/// that has no line adds nothing.
pub fn plan_set_value(
    lines: &[Line],
    matcher: &SettingMatcher,
    value: Option<&str>,
) -> Vec<Line> {
    let name = matcher.name();
    let replacement = match value {
        Some(v) => format!("{}={}", name, v),
        None => format!("#{}=0", name),
    }
    .into_bytes();

    let mut planned = lines.to_vec();
    match matcher.find_in(lines) {
        Some(index) => planned[index] = replacement,
        None if value.is_some() => planned.push(replacement),
        None => {}
    }
    planned
}

/// New lines with `### name: value` at the top.
///
/// Any existing line that contains `### name` anywhere is dropped first.
/// This is a substring test, so a tag whose name extends `name` (for example
/// `### name_extra: 1`) is dropped too.
pub fn plan_set_comment(lines: &[Line], name: &str, value: &str) -> Vec<Line> {
    let tag = line_matcher::comment_tag(name);

    let mut planned = Vec::with_capacity(lines.len() + 1);
    planned.push(line_matcher::comment_line(name, value).into_bytes());
    planned.extend(
        lines
            .iter()
            .filter(|line| !line_matcher::contains(line, tag.as_bytes()))
            .cloned(),
    );
    planned
}

/// Lines strictly before the first line equal to `sentinel`, or `None` when
/// the sentinel does not occur.
pub fn plan_remove_trailing_block(lines: &[Line], sentinel: &str) -> Option<Vec<Line>> {
    lines
        .iter()
        .position(|line| line.as_slice() == sentinel.as_bytes())
        .map(|index| lines[..index].to_vec())
}

/// Handle on one boot configuration file.
///
/// Holds no file content between calls. In dry-run mode mutations are
/// computed and logged but never written.
#[derive(Debug, Clone)]
pub struct BootConfig {
    path: PathBuf,
    dry_run: bool,
}

impl BootConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Switch to dry-run mode for all subsequent mutations on this handle.
    pub fn set_dry_run(&mut self) {
        self.dry_run = true;
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Create the file with a placeholder line if it does not exist.
    ///
    /// Returns `true` if the file was (or in dry-run mode, would be) created.
    pub fn ensure_exists(&self) -> Result<bool> {
        if self.dry_run {
            let missing = !self.exists();
            debug!("Ensuring {} exists (would create: {})", self.path.display(), missing);
            return Ok(missing);
        }

        let created = file_access::ensure_exists(&self.path)?;
        if created {
            info!("Created {}", self.path.display());
        }
        Ok(created)
    }

    /// Set `name` to `value`, or disable it with `#name=0` when `value` is `None`.
    pub fn set_value(&self, name: &str, value: Option<&str>) -> Result<Mutation> {
        validate_name(name)?;
        if let Some(v) = value {
            validate_value(name, v)?;
        }
        let matcher = SettingMatcher::new(name)?;
        let shown = value.unwrap_or("None");

        self.mutate(|lines| {
            info!("writing value to {} {} {}", self.path.display(), name, shown);
            if self.dry_run {
                debug!("Setting config value {} in {} to {}", name, self.path.display(), shown);
            }
            Some(plan_set_value(lines, &matcher, value))
        })
    }

    /// Value of the first active `name=` line, `0` when there is none.
    pub fn get_value(&self, name: &str) -> Result<SettingValue> {
        let lines = file_access::read_lines(&self.path)?;
        Ok(line_matcher::find_active_value(&lines, name)
            .map(SettingValue::from_bytes)
            .unwrap_or_default())
    }

    /// Put `### name: value` at the top of the file, replacing any previous tag.
    pub fn set_comment(&self, name: &str, value: &str) -> Result<Mutation> {
        validate_name(name)?;
        validate_value(name, value)?;

        self.mutate(|lines| {
            info!("writing comment to {} {} {}", self.path.display(), name, value);
            if self.dry_run {
                debug!("setting comment {} in {} to {}", name, self.path.display(), value);
            }
            Some(plan_set_comment(lines, name, value))
        })
    }

    /// True if the exact line `### name: value` is present.
    pub fn get_comment(&self, name: &str, value: &str) -> Result<bool> {
        let lines = file_access::read_lines(&self.path)?;
        let wanted = line_matcher::comment_line(name, value);
        Ok(lines.iter().any(|line| line.as_slice() == wanted.as_bytes()))
    }

    /// True if any line starts with `### name:`.
    pub fn has_comment(&self, name: &str) -> Result<bool> {
        let lines = file_access::read_lines(&self.path)?;
        let prefix = line_matcher::comment_prefix(name);
        Ok(lines.iter().any(|line| line.starts_with(prefix.as_bytes())))
    }

    /// Drop `sentinel` and every line after it.
    ///
    /// Returns `true` if the sentinel was found (and in dry-run mode, would
    /// have been removed).
    pub fn remove_trailing_block(&self, sentinel: &str) -> Result<bool> {
        Ok(self.strip_trailing_block(sentinel)?.is_change())
    }

    /// Same as [`remove_trailing_block`](Self::remove_trailing_block), returning
    /// the full before/after content.
    pub fn strip_trailing_block(&self, sentinel: &str) -> Result<Mutation> {
        self.mutate(|lines| {
            let planned = plan_remove_trailing_block(lines, sentinel);
            if planned.is_some() {
                info!("Removing block after '{}' from {}", sentinel, self.path.display());
                if self.dry_run {
                    debug!("Removing trailing block from {}", self.path.display());
                }
            }
            planned
        })
    }

    /// Read, plan and write under one exclusive lock.
    ///
    /// `plan` returns `None` when there is nothing to change.
    fn mutate<F>(&self, plan: F) -> Result<Mutation>
    where
        F: FnOnce(&[Line]) -> Option<Vec<Line>>,
    {
        if self.dry_run {
            let before = file_access::read_lines(&self.path)?;
            if before.is_empty() {
                return Ok(Mutation::skipped(&self.path));
            }
            let after = plan(&before).unwrap_or_else(|| before.clone());
            return Ok(Mutation {
                path: self.path.clone(),
                status: WriteStatus::DryRun,
                before,
                after,
            });
        }

        let Some(mut locked) = LockedFile::open_for_update(&self.path)? else {
            debug!("{} does not exist, nothing to do", self.path.display());
            return Ok(Mutation::skipped(&self.path));
        };

        let before = locked.read_lines()?;
        if before.is_empty() {
            debug!("{} is empty, nothing to do", self.path.display());
            return Ok(Mutation::skipped(&self.path));
        }

        let Some(after) = plan(&before) else {
            return Ok(Mutation {
                path: self.path.clone(),
                after: before.clone(),
                before,
                status: WriteStatus::Unchanged,
            });
        };

        let status = if after == before {
            WriteStatus::Unchanged
        } else {
            locked.rewrite(&after)?;
            WriteStatus::Written
        };

        Ok(Mutation {
            path: self.path.clone(),
            status,
            before,
            after,
        })
    }
}
