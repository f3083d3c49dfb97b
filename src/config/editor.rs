//! Editor launch and readiness configuration (JSON file).

use crate::config::types::{Result, SupervisorError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default editor port probed when none is configured.
pub const DEFAULT_EDITOR_PORT: u16 = 3000;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessProbeType {
    /// Ready as soon as the process has started.
    #[default]
    #[serde(rename = "")]
    Process,
    /// Ready once an HTTP GET answered 200.
    #[serde(rename = "http")]
    Http,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProbeConfig {
    /// "http" or "https"; defaults to "http".
    pub schema: String,
    /// Defaults to "localhost".
    pub host: String,
    /// Defaults to the editor port.
    pub port: u16,
    /// Defaults to "/".
    pub path: String,
}

impl HttpProbeConfig {
    /// Build the probe URL, defaulting each part independently.
    pub fn url(&self) -> String {
        let schema = if self.schema.is_empty() { "http" } else { &self.schema };
        let host = if self.host.is_empty() { "localhost" } else { &self.host };
        let port = if self.port == 0 { DEFAULT_EDITOR_PORT } else { self.port };
        let path = self.path.trim_start_matches('/');
        format!("{}://{}:{}/{}", schema, host, port, path)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessProbeConfig {
    #[serde(rename = "type")]
    pub probe_type: ReadinessProbeType,
    pub http: HttpProbeConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    pub name: String,
    pub version: String,
    /// Command started (and restarted) by the watchdog.
    pub entrypoint: String,
    pub entrypoint_args: Vec<String>,
    /// kb/sec, 0 = disabled. The workspace limit wins when smaller.
    pub log_rate_limit: u64,
    pub readiness_probe: ReadinessProbeConfig,
}

impl EditorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::Config(format!(
                "failed to open editor config {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut cfg: EditorConfig = serde_json::from_str(&content).map_err(|e| {
            SupervisorError::Config(format!(
                "failed to parse editor config {}: {}",
                path.display(),
                e
            ))
        })?;

        if cfg.name.is_empty() {
            cfg.name = path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        if cfg.entrypoint.is_empty() {
            return Err(SupervisorError::Config(format!(
                "editor config {} has no entrypoint",
                path.display()
            )));
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn probe_url_defaults_every_part() {
        assert_eq!(HttpProbeConfig::default().url(), "http://localhost:3000/");
    }

    #[test]
    fn probe_url_strips_leading_slash() {
        let probe = HttpProbeConfig {
            schema: "https".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            path: "/healthz".into(),
        };
        assert_eq!(probe.url(), "https://127.0.0.1:8080/healthz");
    }

    #[test]
    fn load_defaults_name_to_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let editor_dir = dir.path().join("code-server");
        std::fs::create_dir_all(&editor_dir).unwrap();
        let path = editor_dir.join("editor.json");
        std::fs::write(
            &path,
            r#"{
                "entrypoint": "/ide/bin/code-server",
                "entrypointArgs": ["--port", "3000"],
                "logRateLimit": 64,
                "readinessProbe": {"type": "http", "http": {"path": "/healthz"}}
            }"#,
        )
        .unwrap();

        let cfg = EditorConfig::load(&path).unwrap();
        assert_eq!(cfg.name, "code-server");
        assert_eq!(cfg.entrypoint_args, vec!["--port", "3000"]);
        assert_eq!(cfg.log_rate_limit, 64);
        assert_eq!(cfg.readiness_probe.probe_type, ReadinessProbeType::Http);
        assert_eq!(cfg.readiness_probe.http.url(), "http://localhost:3000/healthz");
    }

    #[test]
    fn missing_probe_type_means_process_probe() {
        let cfg: EditorConfig = serde_json::from_str(r#"{"entrypoint": "/bin/true"}"#).unwrap();
        assert_eq!(cfg.readiness_probe.probe_type, ReadinessProbeType::Process);
    }

    #[test]
    fn missing_entrypoint_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("editor.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(
            EditorConfig::load(&path),
            Err(SupervisorError::Config(_))
        ));
    }
}
