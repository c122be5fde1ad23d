use crate::shared::errors::AppResult;
use chrono::{DateTime, Local, TimeZone};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Creates and configures a new `ProgressBar` with a custom style and
/// optional message.
pub fn generate_progress_bar(total: usize, msg: Option<String>) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{wide_bar}] {percent}% ({msg})")
            .unwrap()
            .progress_chars("█▓▒░")
            .tick_chars("⠋⠙⠚⠉"),
    );
    pb.set_message(msg.unwrap_or_else(|| "Processing".to_string()));
    pb
}

/// Parses a date string into a `DateTime<Local>`, falling back to the
/// Unix epoch when the input is empty or unparseable.
pub fn datetime_from_str(date_str: &str) -> DateTime<Local> {
    if date_str.is_empty() {
        return Local.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(date_str) {
        return parsed.with_timezone(&Local);
    } else if let Ok(parsed) = DateTime::parse_from_rfc3339(date_str) {
        return parsed.with_timezone(&Local);
    }

    let mut date_str = date_str.to_string();
    if regex::Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap().is_match(&date_str) {
        date_str.push_str(" 00:00:00+0000");
    } else if regex::Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$")
        .unwrap()
        .is_match(&date_str)
    {
        date_str.push_str("+0000");
    } else if !date_str.ends_with('+') && !date_str.ends_with('-') {
        date_str.push_str("+0000");
    }
    match DateTime::parse_from_str(&date_str, "%Y-%m-%d %H:%M:%S%z") {
        Ok(date) => date.with_timezone(&Local),
        Err(_) => Local.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// Slugify a topic string for use as a workspace directory name:
/// lowercased, non-alphanumeric runs collapsed to a single underscore.
pub fn slugify(topic: &str) -> String {
    let lowered = topic.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_sep = false;
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_matches('_').to_string()
}

/// Normalize a title for dedup/identity comparisons: lowercased,
/// whitespace-collapsed, punctuation-stripped, TeX commands removed.
/// Idempotent: `normalize_title(normalize_title(t)) == normalize_title(t)`.
pub fn normalize_title(title: &str) -> String {
    let tex_stripped = regex::Regex::new(r"\\[a-zA-Z]+\{([^}]*)\}")
        .unwrap()
        .replace_all(title, "$1")
        .to_string();
    let lowered = tex_stripped.to_lowercase();
    let alnum_only: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    alnum_only.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Write `contents` to `path` atomically: write to a sibling temp file,
/// then rename over the destination. Prevents corrupted output on
/// cancellation or crash mid-write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp.{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("out"),
        std::process::id()
    ));
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Serialize `value` as two-space-indented JSON and write it atomically.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> AppResult<()> {
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    write_atomic(path, &buf)
}

/// Serialize `rows` as RFC4180 CSV (with a header row) and write it
/// atomically. Used for the Snowball round intermediates, which the
/// workspace layout documents as CSV rather than JSON.
pub fn write_csv_atomic<T: serde::Serialize>(path: &Path, rows: &[T]) -> AppResult<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let buf = writer.into_inner().map_err(|e| crate::shared::errors::AppError::InternalAppError(e.to_string()))?;
    write_atomic(path, &buf)
}
