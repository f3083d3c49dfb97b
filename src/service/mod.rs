//! Service layer
//!
//! Services are listed as descriptors that state up front whether they are
//! reachable through the local endpoint. Requests and responses are plain
//! serde enums so the wire format is one JSON object per line.

pub mod endpoint;
pub mod package;
pub mod resource;
pub mod system;
pub mod utility;

pub use endpoint::Endpoint;
pub use package::{PackageInfo, PackageService, PackageStatus};
pub use resource::{ResourceMonitor, ResourcesReport};
pub use system::{SystemService, WorkspaceInfo};
pub use utility::UtilityService;

use crate::config::types::{Result, SupervisorError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    Ping,
    WorkspaceInfo,
    ResourcesStatus,
    ListPackages,
    GetPackage { id: i64 },
    InstallPackage { id: i64 },
    UninstallPackage { id: i64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    Unavailable,
    Internal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Pong { message: String },
    WorkspaceInfo(WorkspaceInfo),
    Resources(ResourcesReport),
    Packages { packages: Vec<PackageInfo> },
    Package(PackageInfo),
    PackageStatus { id: i64, status: PackageStatus },
    Error { code: ErrorCode, message: String },
}

impl Response {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
        }
    }

    fn from_error(err: SupervisorError) -> Self {
        let code = match &err {
            SupervisorError::NotFound(_) => ErrorCode::NotFound,
            _ => ErrorCode::Internal,
        };
        Response::error(code, err.to_string())
    }
}

/// How a service is exposed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// Reachable through the local endpoint.
    Endpoint,
    /// Used from inside the run process only.
    InProcess,
}

pub enum ServiceKind {
    System(Arc<SystemService>),
    Package(Arc<PackageService>),
    Utility(UtilityService),
}

impl ServiceKind {
    /// `None` when this service does not serve `request`.
    fn handle(&self, request: &Request) -> Option<Result<Response>> {
        match (self, request) {
            (ServiceKind::Utility(svc), Request::Ping) => Some(Ok(Response::Pong {
                message: svc.ping().to_string(),
            })),
            (ServiceKind::System(svc), Request::WorkspaceInfo) => {
                Some(Ok(Response::WorkspaceInfo(svc.workspace_info())))
            }
            (ServiceKind::System(svc), Request::ResourcesStatus) => {
                Some(svc.resources_status().map(Response::Resources))
            }
            (ServiceKind::Package(svc), Request::ListPackages) => Some(Ok(Response::Packages {
                packages: svc.list(),
            })),
            (ServiceKind::Package(svc), Request::GetPackage { id }) => {
                Some(svc.get(*id).map(Response::Package))
            }
            (ServiceKind::Package(svc), Request::InstallPackage { id }) => Some(
                svc.install(*id)
                    .map(|status| Response::PackageStatus { id: *id, status }),
            ),
            (ServiceKind::Package(svc), Request::UninstallPackage { id }) => Some(
                svc.uninstall(*id)
                    .map(|status| Response::PackageStatus { id: *id, status }),
            ),
            _ => None,
        }
    }
}

pub struct ServiceDescriptor {
    pub name: &'static str,
    pub registration: Registration,
    pub service: ServiceKind,
}

impl ServiceDescriptor {
    pub fn endpoint(name: &'static str, service: ServiceKind) -> Self {
        Self {
            name,
            registration: Registration::Endpoint,
            service,
        }
    }
}

#[derive(Default)]
pub struct ServiceRegistry {
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceRegistry {
    pub fn new(descriptors: Vec<ServiceDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Dispatch to the first endpoint-registered service serving `request`.
    pub fn handle(&self, request: &Request) -> Response {
        for descriptor in &self.descriptors {
            if descriptor.registration != Registration::Endpoint {
                continue;
            }
            if let Some(result) = descriptor.service.handle(request) {
                return result.unwrap_or_else(|e| {
                    log::warn!("{} failed to handle {:?}: {}", descriptor.name, request, e);
                    Response::from_error(e)
                });
            }
        }
        Response::error(
            ErrorCode::Unavailable,
            format!("no service handles {:?}", request),
        )
    }
}

/// The standard service set of the run process.
pub fn standard_registry(
    config: &crate::config::Config,
    monitor: Box<dyn ResourceMonitor>,
) -> ServiceRegistry {
    ServiceRegistry::new(vec![
        ServiceDescriptor::endpoint(
            "system",
            ServiceKind::System(Arc::new(SystemService::new(config, monitor))),
        ),
        ServiceDescriptor::endpoint(
            "package",
            ServiceKind::Package(Arc::new(PackageService::new(&config.static_config.packages))),
        ),
        ServiceDescriptor::endpoint("utility", ServiceKind::Utility(UtilityService)),
    ])
}
