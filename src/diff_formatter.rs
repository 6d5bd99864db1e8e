use crate::boot_config::{Mutation, WriteStatus};
use crate::file_access::render_lines;
use colored::*;
use similar::{ChangeTag, TextDiff};
use std::io::IsTerminal;

pub struct DiffFormatter;

impl DiffFormatter {
    /// Auto-detect if we should use colors
    pub fn should_use_color() -> bool {
        // Check NO_COLOR env var (https://no-color.org/)
        if std::env::var_os("NO_COLOR").is_some() {
            return false;
        }

        std::io::stdout().is_terminal()
    }

    /// One-line summary of what a mutation did to its file
    pub fn format_status(mutation: &Mutation) -> String {
        let path = mutation.path.display();
        match mutation.status {
            WriteStatus::Written => format!("{}: updated", path),
            WriteStatus::DryRun if mutation.is_change() => format!("{}: would update (dry run)", path),
            WriteStatus::DryRun | WriteStatus::Unchanged => format!("{}: unchanged", path),
            WriteStatus::SkippedEmpty => format!("{}: skipped (missing or empty)", path),
        }
    }

    /// Format a mutation as a line diff with `context_size` unchanged lines
    /// around each change
    pub fn format_mutation(mutation: &Mutation, context_size: usize, use_color: bool) -> String {
        let mut output = String::new();
        let header = mutation.path.display().to_string();
        if use_color {
            output.push_str(&format!("{}\n", header.bold().cyan()));
        } else {
            output.push_str(&format!("{}\n", header));
        }

        if !mutation.is_change() {
            output.push_str("No changes would be made.\n");
            return output;
        }

        let old = String::from_utf8_lossy(&render_lines(&mutation.before)).into_owned();
        let new = String::from_utf8_lossy(&render_lines(&mutation.after)).into_owned();
        let diff = TextDiff::from_lines(old.as_str(), new.as_str());

        let mut added = 0usize;
        let mut deleted = 0usize;

        for (group_index, group) in diff.grouped_ops(context_size).iter().enumerate() {
            if group_index > 0 {
                if use_color {
                    output.push_str(&format!("{}\n", "...".dimmed()));
                } else {
                    output.push_str("...\n");
                }
            }

            for op in group {
                for change in diff.iter_changes(op) {
                    let content = change.value().trim_end_matches('\n');
                    let (indicator, line_num) = match change.tag() {
                        ChangeTag::Equal => ("=", change.new_index()),
                        ChangeTag::Insert => {
                            added += 1;
                            ("+", change.new_index())
                        }
                        ChangeTag::Delete => {
                            deleted += 1;
                            ("-", change.old_index())
                        }
                    };
                    let line_num = line_num.map(|n| n + 1).unwrap_or(0);

                    if use_color {
                        let line = match change.tag() {
                            ChangeTag::Equal => format!("L{}: {} {}\n", line_num, indicator.dimmed(), content.dimmed()),
                            ChangeTag::Insert => format!("L{}: {} {}\n", line_num, indicator.green().bold(), content.green().bold()),
                            ChangeTag::Delete => format!("L{}: {} {}\n", line_num, indicator.red().bold(), content.red()),
                        };
                        output.push_str(&line);
                    } else {
                        output.push_str(&format!("L{}: {} {}\n", line_num, indicator, content));
                    }
                }
            }
        }

        if use_color {
            output.push_str(&format!(
                "\nTotal: {} {}, {} {}\n",
                added.to_string().bold(),
                "added".green(),
                deleted.to_string().bold(),
                "deleted".red()
            ));
        } else {
            output.push_str(&format!("\nTotal: {} added, {} deleted\n", added, deleted));
        }

        output
    }
}
