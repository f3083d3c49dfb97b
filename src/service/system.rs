//! Workspace information and resource status.

use crate::config::editor::DEFAULT_EDITOR_PORT;
use crate::config::types::{Result, SeverityThresholds};
use crate::service::resource::{resources_status, ResourceMonitor, ResourcesReport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub workspace_id: i64,
    pub checkout_location: String,
    pub user_home: String,
    pub owner_id: i64,
    pub cluster_host: String,
    pub workspace_url: String,
    pub editor_alias: String,
    pub editor_port: u16,
}

pub struct SystemService {
    pub workspace_id: i64,
    pub workspace_location: String,
    pub workspace_url: String,
    pub owner_id: i64,
    pub cluster_host: String,
    pub flavor: String,
    pub editor_name: String,
    pub thresholds: SeverityThresholds,
    monitor: Box<dyn ResourceMonitor>,
}

impl SystemService {
    pub fn new(config: &crate::config::Config, monitor: Box<dyn ResourceMonitor>) -> Self {
        Self {
            workspace_id: config.workspace.workspace_id,
            workspace_location: config.workspace.workspace_location.clone(),
            workspace_url: config.workspace.workspace_url.clone(),
            owner_id: config.workspace.owner_id,
            cluster_host: config.workspace.workspace_cluster_host.clone(),
            flavor: config.workspace.flavor_name.clone(),
            editor_name: config.editor.name.clone(),
            thresholds: config.tunables.severity,
            monitor,
        }
    }

    pub fn resources_status(&self) -> Result<ResourcesReport> {
        let path = if self.workspace_location.is_empty() {
            PathBuf::from("/")
        } else {
            PathBuf::from(&self.workspace_location)
        };
        resources_status(self.monitor.as_ref(), &path, &self.flavor, &self.thresholds)
    }

    pub fn workspace_info(&self) -> WorkspaceInfo {
        WorkspaceInfo {
            workspace_id: self.workspace_id,
            checkout_location: format!("{}/devel", self.workspace_location),
            user_home: self.workspace_location.clone(),
            owner_id: self.owner_id,
            cluster_host: self.cluster_host.clone(),
            workspace_url: self.workspace_url.clone(),
            editor_alias: self.editor_name.clone(),
            editor_port: DEFAULT_EDITOR_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::service::resource::SimulatedMonitor;
    use pretty_assertions::assert_eq;

    #[test]
    fn workspace_info_derives_locations() {
        let mut config = Config::default();
        config.workspace.workspace_id = 7;
        config.workspace.workspace_location = "/workspace".to_string();
        config.workspace.workspace_url = "https://7.ws.example.com".to_string();
        config.workspace.owner_id = 42;
        config.workspace.workspace_cluster_host = "ws.example.com".to_string();
        config.editor.name = "code".to_string();

        let svc = SystemService::new(&config, Box::new(SimulatedMonitor::default()));
        assert_eq!(
            svc.workspace_info(),
            WorkspaceInfo {
                workspace_id: 7,
                checkout_location: "/workspace/devel".to_string(),
                user_home: "/workspace".to_string(),
                owner_id: 42,
                cluster_host: "ws.example.com".to_string(),
                workspace_url: "https://7.ws.example.com".to_string(),
                editor_alias: "code".to_string(),
                editor_port: 3000,
            }
        );
    }

    #[test]
    fn resources_carry_flavor() {
        let mut config = Config::default();
        config.workspace.flavor_name = "standard-2".to_string();
        let svc = SystemService::new(&config, Box::new(SimulatedMonitor::default()));
        let report = svc.resources_status().unwrap();
        assert_eq!(report.flavor, "standard-2");
        assert!(!report.authoritative);
    }
}
