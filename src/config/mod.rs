//! Configuration inputs
//!
//! Static (file next to the executable), editor (JSON), workspace
//! (environment) and runtime (`.opencoder.yml`) configuration, plus the
//! shared error taxonomy.

pub mod editor;
pub mod runtime;
pub mod static_config;
pub mod types;
pub mod workspace;

pub use editor::EditorConfig;
pub use runtime::RuntimeConfig;
pub use static_config::StaticConfig;
pub use types::{Result, SupervisorError, SupervisorTunables};
pub use workspace::WorkspaceConfig;

use std::path::Path;

/// Complete configuration of the run process.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub static_config: StaticConfig,
    pub workspace: WorkspaceConfig,
    pub editor: EditorConfig,
    pub runtime: RuntimeConfig,
    pub tunables: SupervisorTunables,
}

impl Config {
    /// Load every layer. Static, editor and workspace failures are fatal;
    /// a broken runtime config is logged and replaced by the empty one.
    pub fn load() -> Result<Self> {
        log::debug!("loading static config from file...");
        let static_path = StaticConfig::default_location()?;
        let static_config = StaticConfig::load(&static_path)?;

        log::debug!("loading editor config...");
        let editor = EditorConfig::load(&static_config.editor_config_location)?;

        log::debug!("loading workspace config...");
        let workspace = WorkspaceConfig::from_env()?;

        log::debug!("loading runtime config...");
        let runtime = match RuntimeConfig::load(Path::new(&workspace.workspace_location)) {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!(
                    "failed to load runtime config from {}: {}",
                    workspace.workspace_location,
                    e
                );
                RuntimeConfig::default()
            }
        };

        let tunables = SupervisorTunables::from_env();

        log::debug!("configuration loaded successfully");
        Ok(Self {
            static_config,
            workspace,
            editor,
            runtime,
            tunables,
        })
    }

    /// Editor log rate limit in kb/sec, 0 when disabled. The smaller of the
    /// workspace and editor limits wins; a zero workspace limit defers to
    /// the editor.
    pub fn editor_log_rate_limit(&self) -> u64 {
        let workspace = self.workspace.log_rate_limit;
        let editor = self.editor.log_rate_limit;
        if workspace == 0 {
            return editor;
        }
        if editor == 0 {
            return workspace;
        }
        workspace.min(editor)
    }

    /// Address of the local RPC endpoint as seen by child processes.
    pub fn supervisor_addr(&self) -> String {
        format!("localhost:{}", self.static_config.api_endpoint_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(workspace: u64, editor: u64) -> Config {
        let mut cfg = Config::default();
        cfg.workspace.log_rate_limit = workspace;
        cfg.editor.log_rate_limit = editor;
        cfg
    }

    #[test]
    fn smallest_rate_limit_wins() {
        assert_eq!(config(0, 0).editor_log_rate_limit(), 0);
        assert_eq!(config(0, 64).editor_log_rate_limit(), 64);
        assert_eq!(config(32, 64).editor_log_rate_limit(), 32);
        assert_eq!(config(128, 64).editor_log_rate_limit(), 64);
        assert_eq!(config(16, 0).editor_log_rate_limit(), 16);
    }
}
