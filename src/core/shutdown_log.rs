//! Shutdown record.
//!
//! Plain-text, append-as-you-go file written only during shutdown. Every
//! line is prefixed with the time elapsed since shutdown started. Lines are
//! mirrored to the `log` facade, but the file is written directly and stays
//! readable after the container's log collection has stopped.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_SHUTDOWN_LOG_PATH: &str = "/tmp/opencoder/supervisor-termination";

pub struct ShutdownLog {
    start: Instant,
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
}

impl ShutdownLog {
    /// Open (truncating) the shutdown log. If the file cannot be created the
    /// record is kept on stderr only.
    pub fn create(path: &Path) -> Self {
        let file = path
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .and_then(|_| {
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(path)
            });

        let (file, recorded_path) = match file {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "supervisor shutdown started at {}",
                    chrono::Utc::now().to_rfc3339()
                );
                (Some(file), Some(path.to_path_buf()))
            }
            Err(e) => {
                eprintln!("cannot create shutdown log {}: {}", path.display(), e);
                (None, None)
            }
        };

        Self {
            start: Instant::now(),
            path: recorded_path,
            file: Mutex::new(file),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::info!("slog: {}", message);
        let line = format_line(self.start.elapsed(), message);
        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_mut() {
            Some(file) => {
                let _ = file.write_all(line.as_bytes());
                let _ = file.flush();
            }
            None => eprint!("{}", line),
        }
    }
}

fn format_line(elapsed: Duration, message: &str) -> String {
    format!("[{:>9.3}s] {}\n", elapsed.as_secs_f64(), message)
}
