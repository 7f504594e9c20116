//! ---
//! fleet_section: "02-service-adapters"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Capability contract every managed service implements."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dexfleet_common::ServiceKind;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Free-form human readable status text returned by a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusReport(String);

impl StatusReport {
    pub const CONTAINER_MISSING: &'static str = "Container missing";
    pub const READY: &'static str = "Ready";
    pub const STARTING: &'static str = "Starting...";

    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// `Container <state>` as reported for a container that is not running.
    pub fn container(state: &str) -> Self {
        Self(format!("Container {}", state))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StatusReport {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StatusReport {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcProtocol {
    Grpc,
    Rest,
    Http,
}

/// Connection parameters of a service exposing an API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcParams {
    pub protocol: RpcProtocol,
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cert: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<PathBuf>,
}

impl RpcParams {
    pub fn new(protocol: RpcProtocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            tls_cert: None,
            credentials: None,
        }
    }

    pub fn with_tls_cert(mut self, cert: PathBuf) -> Self {
        self.tls_cert = Some(cert);
        self
    }

    pub fn with_credentials(mut self, credentials: PathBuf) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// `https://host:port` base address of a REST endpoint.
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

/// Capability contract consumed by the orchestrator.
///
/// Implementations keep no orchestration state: every call re-derives what it
/// needs from the running environment, which makes each operation idempotent.
#[async_trait]
pub trait ServiceHandle: Send + Sync {
    /// Stable identifier, unique within a fleet.
    fn name(&self) -> &str;

    fn kind(&self) -> ServiceKind;

    /// Disabled services are stopped and removed instead of started.
    fn is_disabled(&self) -> bool;

    /// Directory owned by this service. Fixed at construction.
    fn data_dir(&self) -> &Path;

    /// Ensure the running unit exists and is started. Does not wait for readiness.
    async fn up(&self) -> Result<(), ServiceError>;

    async fn stop(&self) -> Result<(), ServiceError>;

    async fn remove(&self) -> Result<(), ServiceError>;

    /// One bounded status probe. A probe that cannot be performed is an error.
    async fn status(&self) -> Result<StatusReport, ServiceError>;

    /// Whether the container-level status is `Container running`.
    async fn is_running(&self) -> bool;

    /// Remedial action after stuck detection. Returns whether polling should resume.
    async fn rescue(&self) -> bool;

    fn rpc_params(&self) -> Option<RpcParams>;
}
