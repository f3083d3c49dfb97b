//! Per-workspace runtime configuration (`.opencoder.yml`).

use crate::config::types::{Result, SupervisorError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const RUNTIME_CONFIG_FILE: &str = ".opencoder.yml";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Environment overrides for the editor; values may reference host
    /// variables as `${VAR}`.
    pub env: BTreeMap<String, String>,
}

impl RuntimeConfig {
    /// A missing file yields the empty configuration.
    pub fn load(workspace_location: &Path) -> Result<Self> {
        let path = workspace_location.join(RUNTIME_CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(SupervisorError::Config(format!(
                    "failed to open {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|e| {
            SupervisorError::Config(format!("failed to decode {}: {}", path.display(), e))
        })
    }
}
