//! Locating settings and annotations inside a line set
//!
//! A setting line may be active (`name=value`) or disabled (`#name=value`),
//! optionally padded with whitespace before and after the `#`. Only the first
//! matching line is ever considered "the" entry for a name.

use anyhow::{Context, Result};
use regex::bytes::Regex;

use crate::file_access::Line;

/// Matches the physical line that represents one setting name.
#[derive(Debug, Clone)]
pub struct SettingMatcher {
    name: String,
    pattern: Regex,
}

impl SettingMatcher {
    pub fn new(name: &str) -> Result<Self> {
        // The name is escaped so that `.` or `+` in it are literal, and the
        // trailing `=` keeps `foo` from matching `foobar=...`.
        let source = format!(r"^\s*#?\s*{}=", regex::escape(name));
        let pattern = Regex::new(&source)
            .with_context(|| format!("Failed to build matcher for setting '{}'", name))?;

        Ok(Self {
            name: name.to_string(),
            pattern,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if `line` is an active or disabled entry for this setting.
    pub fn matches(&self, line: &[u8]) -> bool {
        self.pattern.is_match(line)
    }

    /// Index of the first line that represents this setting.
    pub fn find_in(&self, lines: &[Line]) -> Option<usize> {
        lines.iter().position(|line| self.matches(line))
    }
}

/// Index of the first active or disabled line for `name`.
pub fn find_setting(lines: &[Line], name: &str) -> Result<Option<usize>> {
    Ok(SettingMatcher::new(name)?.find_in(lines))
}

/// Value of the first active `name=value` line.
///
/// Disabled lines are not considered, and neither is leading whitespace:
/// the line must start with `name=` exactly.
pub fn find_active_value<'a>(lines: &'a [Line], name: &str) -> Option<&'a [u8]> {
    lines.iter().find_map(|line| {
        line.strip_prefix(name.as_bytes())
            .and_then(|rest| rest.strip_prefix(b"="))
    })
}

/// True if `needle` occurs anywhere in `line`.
pub fn contains(line: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || line.windows(needle.len()).any(|window| window == needle)
}

/// `### name: value`
pub fn comment_line(name: &str, value: &str) -> String {
    format!("### {}: {}", name, value)
}

/// `### name`, the tag removed by `set_comment` wherever it appears in a line.
pub fn comment_tag(name: &str) -> String {
    format!("### {}", name)
}

/// `### name:`, the prefix tested by `has_comment`.
pub fn comment_prefix(name: &str) -> String {
    format!("### {}:", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<Line> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_matches_active_and_disabled_forms() {
        let matcher = SettingMatcher::new("hdmi_mode").unwrap();
        assert!(matcher.matches(b"hdmi_mode=4"));
        assert!(matcher.matches(b"#hdmi_mode=4"));
        assert!(matcher.matches(b"   hdmi_mode=4"));
        assert!(matcher.matches(b"\t# hdmi_mode=0"));
        assert!(matcher.matches(b"hdmi_mode="));
        assert!(matcher.matches(b"hdmi_mode=caf\xe9"));
    }

    #[test]
    fn test_does_not_match_other_names() {
        let matcher = SettingMatcher::new("foo").unwrap();
        assert!(!matcher.matches(b"foobar=1"));
        assert!(!matcher.matches(b"xfoo=1"));
        assert!(!matcher.matches(b"##foo=1"));
        assert!(!matcher.matches(b"foo =1"));
        assert!(!matcher.matches(b"FOO=1"));
    }

    #[test]
    fn test_name_is_literal() {
        let matcher = SettingMatcher::new("a.b").unwrap();
        assert!(matcher.matches(b"a.b=1"));
        assert!(!matcher.matches(b"axb=1"));
    }

    #[test]
    fn test_first_match_wins() {
        let content = lines(&["a=1", "#b=2", "b=3"]);
        assert_eq!(find_setting(&content, "b").unwrap(), Some(1));
        assert_eq!(find_setting(&content, "a").unwrap(), Some(0));
        assert_eq!(find_setting(&content, "c").unwrap(), None);
    }

    #[test]
    fn test_find_active_value() {
        let content = lines(&["#c=3", " c=4", "c=5", "c=6"]);
        assert_eq!(find_active_value(&content, "c"), Some(&b"5"[..]));
        assert_eq!(find_active_value(&content, "d"), None);

        let content = lines(&["dtoverlay=vc4-kms-v3d,cma=256"]);
        assert_eq!(
            find_active_value(&content, "dtoverlay"),
            Some(&b"vc4-kms-v3d,cma=256"[..])
        );
    }

    #[test]
    fn test_contains() {
        assert!(contains(b"x ### screen_used: 1", b"### screen"));
        assert!(!contains(b"## screen", b"### screen"));
        assert!(!contains(b"", b"### screen"));
    }

    #[test]
    fn test_comment_helpers() {
        assert_eq!(comment_line("kano_screen_used", "xxx"), "### kano_screen_used: xxx");
        assert_eq!(comment_tag("kano_screen_used"), "### kano_screen_used");
        assert_eq!(comment_prefix("kano_screen_used"), "### kano_screen_used:");
    }
}
