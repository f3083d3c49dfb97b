//! Supervisor-wide static configuration shipped next to the executable.

use crate::config::types::{Result, SupervisorError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const STATIC_CONFIG_FILE: &str = "supervisor-config.json";
pub const DEFAULT_API_ENDPOINT_PORT: u16 = 22999;

/// Package entry as declared in the static config catalogue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StaticConfig {
    pub editor_config_location: PathBuf,
    pub api_endpoint_port: u16,
    pub packages: Vec<PackageSpec>,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            editor_config_location: PathBuf::new(),
            api_endpoint_port: DEFAULT_API_ENDPOINT_PORT,
            packages: Vec::new(),
        }
    }
}

impl StaticConfig {
    /// Resolve the config location: `SUPERVISOR_CONFIG_PATH` if set, else
    /// the file next to the running executable.
    pub fn default_location() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("SUPERVISOR_CONFIG_PATH") {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        let exe = std::env::current_exe().map_err(|e| {
            SupervisorError::Config(format!("cannot get executable path: {}", e))
        })?;
        let dir = exe.parent().unwrap_or_else(|| Path::new("/"));
        Ok(dir.join(STATIC_CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::Config(format!(
                "cannot read supervisor config file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            SupervisorError::Config(format!(
                "cannot unmarshal supervisor config file {}: {}",
                path.display(),
                e
            ))
        })
    }
}
