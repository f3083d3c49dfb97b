//! Editor supervision: launch, readiness, crash-restart and graceful stop.

pub mod env;
pub mod readiness;
pub mod state;
pub mod watchdog;

pub use readiness::{probe_for, HttpProbe, ProcessProbe, ReadinessProbe};
pub use state::{EditorProcessState, ReadyState};
pub use watchdog::{CommandLauncher, EditorLauncher, EditorWatchdog, LaunchedEditor};

use crate::config::types::{Result, SupervisorError};
use crate::config::Config;
use std::sync::Arc;

/// Build the watchdog for the configured editor.
pub fn watchdog_from_config(config: &Config) -> Result<EditorWatchdog> {
    let editor = &config.editor;
    if editor.entrypoint.is_empty() {
        return Err(SupervisorError::Config(format!(
            "editor {} has no entrypoint",
            editor.name
        )));
    }

    let env = env::build_env(
        std::env::vars(),
        &config.runtime.env,
        &config.supervisor_addr(),
    );
    let launcher = CommandLauncher::new(
        &editor.entrypoint,
        editor.entrypoint_args.clone(),
        env,
        config.editor_log_rate_limit(),
        config.tunables.output_retention_bytes,
    );
    let probe = probe_for(&editor.readiness_probe, config.tunables.readiness_interval)?;

    Ok(EditorWatchdog::new(
        editor.name.clone(),
        Box::new(launcher),
        Arc::from(probe),
        config.tunables.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entrypoint_is_config_error() {
        let config = Config::default();
        let err = watchdog_from_config(&config).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn builds_from_config() {
        let mut config = Config::default();
        config.editor.name = "code".to_string();
        config.editor.entrypoint = "/bin/true".to_string();
        let wd = watchdog_from_config(&config).unwrap();
        assert_eq!(wd.name(), "code");
        assert_eq!(wd.state(), EditorProcessState::NotStarted);
    }
}
