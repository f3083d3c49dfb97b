//! Failure summary extraction from the fatal-termination record.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct FatalLine {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error: String,
}

/// Human readable reason the run process died.
///
/// Scans the record backwards; the first JSON line with a non-empty
/// `message` wins, rendered as `message: error` when an error is present.
/// If no line qualifies the whole record is returned. `None` when the
/// record is missing or empty.
pub fn extract_failure(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    extract_failure_from(&content)
}

pub fn extract_failure_from(content: &str) -> Option<String> {
    for line in content.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(parsed) = serde_json::from_str::<FatalLine>(line) else {
            continue;
        };
        if parsed.message.is_empty() {
            continue;
        }
        if parsed.error.is_empty() {
            return Some(parsed.message);
        }
        return Some(format!("{}: {}", parsed.message, parsed.error));
    }

    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
