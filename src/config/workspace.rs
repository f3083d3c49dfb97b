//! Workspace identity and policy, read from the container environment.

use crate::config::types::{Result, SupervisorError};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(15);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkspaceConfig {
    pub workspace_id: i64,
    /// Root of the workspace storage; disk usage is measured here.
    pub workspace_location: String,
    pub workspace_url: String,
    pub owner_id: i64,
    /// Editor log rate limit in kb/sec, 0 = disabled.
    pub log_rate_limit: u64,
    pub workspace_cluster_host: String,
    pub termination_grace_period_seconds: Option<i64>,
    /// Resource flavor label reported alongside resource status.
    pub flavor_name: String,
}

impl WorkspaceConfig {
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            workspace_id: parse_var(vars, "OPENCODER_WORKSPACE_ID")?.unwrap_or_default(),
            workspace_location: string_var(vars, "OPENCODER_WORKSPACE_PATH"),
            workspace_url: string_var(vars, "OPENCODER_WORKSPACE_URL"),
            owner_id: parse_var(vars, "OPENCODER_OWNER_ID")?.unwrap_or_default(),
            log_rate_limit: parse_var(vars, "OPENCODER_RATE_LIMIT_LOG")?.unwrap_or_default(),
            workspace_cluster_host: string_var(vars, "OPENCODER_WORKSPACE_CLUSTER_HOST"),
            termination_grace_period_seconds: parse_var(
                vars,
                "OPENCODER_TERMINATION_GRACE_PERIOD_SECONDS",
            )?,
            flavor_name: string_var(vars, "OPENCODER_FLAVOR"),
        })
    }

    /// Bound on the whole shutdown sweep. Unset or non-positive values fall
    /// back to 15s.
    pub fn termination_grace_period(&self) -> Duration {
        match self.termination_grace_period_seconds {
            Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
            _ => DEFAULT_GRACE_PERIOD,
        }
    }
}

fn string_var(vars: &HashMap<String, String>, name: &str) -> String {
    vars.get(name).cloned().unwrap_or_default()
}

fn parse_var<T>(vars: &HashMap<String, String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(name).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
            SupervisorError::Config(format!("invalid value {:?} for {}: {}", raw, name, e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn grace_period_defaults_to_fifteen_seconds() {
        let cfg = WorkspaceConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(cfg.termination_grace_period(), Duration::from_secs(15));

        let cfg = WorkspaceConfig::from_vars(&vars(&[(
            "OPENCODER_TERMINATION_GRACE_PERIOD_SECONDS",
            "-3",
        )]))
        .unwrap();
        assert_eq!(cfg.termination_grace_period(), Duration::from_secs(15));
    }

    #[test]
    fn grace_period_from_env() {
        let cfg = WorkspaceConfig::from_vars(&vars(&[(
            "OPENCODER_TERMINATION_GRACE_PERIOD_SECONDS",
            "42",
        )]))
        .unwrap();
        assert_eq!(cfg.termination_grace_period(), Duration::from_secs(42));
    }

    #[test]
    fn identity_fields_are_read() {
        let cfg = WorkspaceConfig::from_vars(&vars(&[
            ("OPENCODER_WORKSPACE_ID", "7"),
            ("OPENCODER_WORKSPACE_PATH", "/workspace"),
            ("OPENCODER_OWNER_ID", "99"),
            ("OPENCODER_RATE_LIMIT_LOG", "128"),
        ]))
        .unwrap();
        assert_eq!(cfg.workspace_id, 7);
        assert_eq!(cfg.workspace_location, "/workspace");
        assert_eq!(cfg.owner_id, 99);
        assert_eq!(cfg.log_rate_limit, 128);
    }

    #[test]
    fn malformed_numbers_are_config_errors() {
        let result = WorkspaceConfig::from_vars(&vars(&[("OPENCODER_WORKSPACE_ID", "seven")]));
        assert!(matches!(result, Err(SupervisorError::Config(_))));
    }
}
