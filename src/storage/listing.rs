//! Directory listing formatters.
//!
//! LIST emits the conventional unix `ls -l` line format, which is what
//! interoperable clients parse; NLST emits bare names. Both are stable
//! textual conventions the tests pin down.

use chrono::{DateTime, Datelike, Local};

use crate::storage::operations::EntryInfo;

/// Formats one `ls -l` style line, CRLF excluded.
///
/// Timestamps from the current year show `Mmm dd HH:MM`, older ones
/// `Mmm dd  yyyy`, matching the format clients expect.
pub fn format_list_line(entry: &EntryInfo) -> String {
    let type_char = if entry.is_dir { 'd' } else { '-' };
    let mode = if entry.is_dir { "rwxr-xr-x" } else { "rw-r--r--" };

    let timestamp = match entry.modified {
        Some(modified) => {
            let local: DateTime<Local> = modified.into();
            let now = Local::now();
            if local.year() == now.year() {
                local.format("%b %e %H:%M").to_string()
            } else {
                local.format("%b %e  %Y").to_string()
            }
        }
        None => "Jan  1  1970".to_string(),
    };

    format!(
        "{}{} 1 ftp ftp {:>12} {} {}",
        type_char, mode, entry.size, timestamp, entry.name
    )
}

/// Renders the full LIST payload for a directory.
pub fn render_list(entries: &[EntryInfo]) -> String {
    let mut output = String::new();
    for entry in entries {
        output.push_str(&format_list_line(entry));
        output.push_str("\r\n");
    }
    output
}

/// Renders the NLST payload: bare names, one per line.
pub fn render_nlst(entries: &[EntryInfo]) -> String {
    let mut output = String::new();
    for entry in entries {
        output.push_str(&entry.name);
        output.push_str("\r\n");
    }
    output
}
