//! Logger initialisation.
//!
//! `env_logger` behind the `log` facade. The run process logs one JSON
//! object per line; the init process logs plain text. Both tee to stderr
//! and to the supervisor log file.

use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

pub const DEFAULT_LOG_FILE: &str = "/tmp/opencoder/log/supervisor.log";

#[derive(Clone, Debug)]
pub struct LogOptions {
    pub json: bool,
    pub debug: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            json: false,
            debug: debug_from_env(),
            log_file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
        }
    }
}

/// `SUPERVISOR_DEBUG_ENABLE=true` switches to debug level.
pub fn debug_from_env() -> bool {
    std::env::var("SUPERVISOR_DEBUG_ENABLE")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Writes every buffer to all sinks; a failing file sink never blocks
/// stderr.
struct Tee {
    sinks: Vec<Box<dyn Write + Send>>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for sink in &mut self.sinks {
            let _ = sink.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.sinks {
            let _ = sink.flush();
        }
        Ok(())
    }
}

fn open_log_file(path: &PathBuf) -> Option<Box<dyn Write + Send>> {
    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return None;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .ok()
        .map(|f| Box::new(f) as Box<dyn Write + Send>)
}

fn json_line(level: log::Level, target: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "time": chrono::Utc::now().to_rfc3339(),
        "level": level.as_str().to_ascii_lowercase(),
        "target": target,
        "message": message,
    })
}

/// Install the global logger. Calling it twice is harmless.
pub fn init(options: &LogOptions) {
    let level = if options.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut sinks: Vec<Box<dyn Write + Send>> = vec![Box::new(io::stderr())];
    if let Some(path) = &options.log_file {
        match open_log_file(path) {
            Some(file) => sinks.push(file),
            None => eprintln!("cannot open log file {}, logging to stderr only", path.display()),
        }
    }

    let mut builder = Builder::new();
    builder
        .filter_level(level)
        .parse_env(Env::default())
        .target(Target::Pipe(Box::new(Tee { sinks })));

    if options.json {
        builder.format(|buf, record| {
            let line = json_line(record.level(), record.target(), &record.args().to_string());
            writeln!(buf, "{}", line)
        });
    } else {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        });
    }

    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_carry_level_and_message() {
        let line = json_line(log::Level::Warn, "wsvisor::editor", "editor restarted");
        assert_eq!(line["level"], "warn");
        assert_eq!(line["message"], "editor restarted");
        assert_eq!(line["target"], "wsvisor::editor");
        assert!(line["time"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn tee_writes_to_every_sink() {
        let a = std::sync::Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
        struct Sink(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl Write for Sink {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let mut tee = Tee {
            sinks: vec![Box::new(Sink(a.clone())), Box::new(Sink(a.clone()))],
        };
        tee.write_all(b"x").unwrap();
        assert_eq!(a.lock().unwrap().as_slice(), b"xx");
    }

    #[test]
    fn unwritable_log_file_is_skipped() {
        assert!(open_log_file(&PathBuf::from("/proc/version/cannot/log")).is_none());
    }
}
