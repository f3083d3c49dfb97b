/// Fatal-termination record
/// Appends one JSON line per fatal event to the termination file so the
/// init process can explain why the run process died, even when the regular
/// log has been torn down.
use crate::config::types::{Result, SupervisorError};
use log::error;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_TERMINATION_PATH: &str = "/tmp/opencoder/termination";

#[derive(Clone, Debug)]
pub struct FatalRecorder {
    path: PathBuf,
}

impl Default for FatalRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINATION_PATH)
    }
}

impl FatalRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log the event at error level and append it to the termination file.
    pub fn record(&self, message: &str, err: Option<&str>) -> Result<()> {
        match err {
            Some(err) => error!("{}: {}", message, err),
            None => error!("{}", message),
        }

        let entry = serde_json::json!({
            "time": chrono::Utc::now().to_rfc3339(),
            "level": "fatal",
            "message": message,
            "error": err.unwrap_or_default(),
        });

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SupervisorError::Fatal(format!("failed to create termination log directory: {}", e))
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SupervisorError::Fatal(format!("failed to open termination log: {}", e)))?;
        writeln!(file, "{}", entry)?;
        file.flush()?;
        Ok(())
    }

    /// Record and swallow any failure to persist the record itself.
    pub fn record_best_effort(&self, message: &str, err: Option<&str>) {
        if let Err(e) = self.record(message, err) {
            error!("failed to write termination record to {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = FatalRecorder::new(dir.path().join("nested").join("termination"));
        recorder.record("first", None).unwrap();
        recorder.record("editor failed", Some("exit status 1")).unwrap();

        let content = std::fs::read_to_string(recorder.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["message"], "editor failed");
        assert_eq!(lines[1]["error"], "exit status 1");
        assert_eq!(lines[1]["level"], "fatal");
        assert_eq!(lines[0]["error"], "");
    }
}
