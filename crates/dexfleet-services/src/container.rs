//! ---
//! fleet_section: "02-service-adapters"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Container-backed service handle and per-role status probes."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dexfleet_common::{Chain, Network, ServiceKind};
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::runtime::{ContainerRuntime, ContainerState};
use crate::service::{RpcParams, ServiceHandle, StatusReport};

const WALLET_MISSING: &str = "Wallet missing. Create with opendex-cli create/restore.";
const WALLET_LOCKED: &str = "Wallet locked. Unlock with opendex-cli unlock.";
const LIGHT_CLIENT_LOCKED: &str = "Wallet locked. Unlock with lncli unlock.";
const NODE_KEY_FILE: &str = "nodekey.dat";

/// Settlement-daemon errors that only mean it has not finished starting.
const SETTLEMENT_STARTING_MARKERS: &[&str] = &[
    "tls cert could not be found",
    "opendexd is starting",
    "is opendexd running?",
    "No connection established",
];

const LIGHT_CLIENT_LOCKED_MARKERS: &[&str] = &["wallet locked", "unlock it to fully start"];
const LIGHT_CLIENT_STARTING_MARKERS: &[&str] = &[
    "connection refused",
    "server is still in the process of starting",
    "Unavailable",
    "no such file or directory",
];

/// How a running container is turned into a service-level status.
#[derive(Debug, Clone)]
pub enum StatusProbe {
    /// `Ready` as soon as the container runs.
    Container,
    /// `Ready` once the API port accepts TCP connections on the host.
    Port { host: String, port: u16 },
    /// `opendex-cli getinfo -j` summarised over the dependencies it reports.
    Settlement {
        /// `(ticker, service name)` pairs of the light clients.
        light_clients: Vec<(String, String)>,
        hub: Option<String>,
    },
    /// `lncli getinfo` of a light client.
    LightClient { network: Network, chain: Chain },
}

/// [`ServiceHandle`] backed by a container managed through a [`ContainerRuntime`].
pub struct ContainerService {
    name: String,
    kind: ServiceKind,
    disabled: bool,
    data_dir: PathBuf,
    rpc_params: Option<RpcParams>,
    probe: StatusProbe,
    probe_timeout: Duration,
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerService {
    pub fn new(
        name: impl Into<String>,
        kind: ServiceKind,
        data_dir: impl Into<PathBuf>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            disabled: false,
            data_dir: data_dir.into(),
            rpc_params: None,
            probe: StatusProbe::Container,
            probe_timeout: Duration::from_secs(10),
            runtime,
        }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn with_probe(mut self, probe: StatusProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_rpc_params(mut self, params: RpcParams) -> Self {
        self.rpc_params = Some(params);
        self
    }

    async fn probe(&self) -> Result<StatusReport, ServiceError> {
        match self.runtime.inspect(&self.name).await? {
            ContainerState::Missing => Ok(StatusReport::new(StatusReport::CONTAINER_MISSING)),
            ContainerState::Present(state) if state != "running" => {
                Ok(StatusReport::container(&state))
            }
            ContainerState::Present(_) => self.probe_running().await,
        }
    }

    async fn probe_running(&self) -> Result<StatusReport, ServiceError> {
        match &self.probe {
            StatusProbe::Container => Ok(StatusReport::new(StatusReport::READY)),
            StatusProbe::Port { host, port } => {
                match TcpStream::connect((host.as_str(), *port)).await {
                    Ok(_) => Ok(StatusReport::new(StatusReport::READY)),
                    Err(err) => {
                        debug!(service = %self.name, port, error = %err, "api port not reachable yet");
                        Ok(StatusReport::new(StatusReport::STARTING))
                    }
                }
            }
            StatusProbe::Settlement { light_clients, hub } => {
                let argv = ["opendex-cli", "getinfo", "-j"];
                let output = self.runtime.exec(&self.name, &argv).await?;
                if !output.success() {
                    if let Some(status) = settlement_status_from_error(&output.stdout, &self.data_dir)
                    {
                        return Ok(status);
                    }
                    return Err(ServiceError::Exec {
                        command: argv.join(" "),
                        code: output.exit_code,
                        output: output.stdout.trim().to_owned(),
                    });
                }
                let info: Value = serde_json::from_str(&output.stdout)
                    .map_err(|_| ServiceError::Probe(output.stdout.trim().to_owned()))?;
                settlement_status_from_info(&info, light_clients, hub.as_deref())
            }
            StatusProbe::LightClient { network, chain } => {
                let argv = [
                    "lncli",
                    "-n",
                    network.as_str(),
                    "-c",
                    chain.as_str(),
                    "getinfo",
                ];
                let output = self.runtime.exec(&self.name, &argv).await?;
                if !output.success() {
                    if let Some(status) = light_client_status_from_error(&output.stdout) {
                        return Ok(status);
                    }
                    return Err(ServiceError::Exec {
                        command: argv.join(" "),
                        code: output.exit_code,
                        output: output.stdout.trim().to_owned(),
                    });
                }
                let info: Value = serde_json::from_str(&output.stdout)
                    .map_err(|_| ServiceError::Probe(output.stdout.trim().to_owned()))?;
                light_client_status_from_info(&info)
            }
        }
    }
}

#[async_trait]
impl ServiceHandle for ContainerService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ServiceKind {
        self.kind
    }

    fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    async fn up(&self) -> Result<(), ServiceError> {
        self.runtime.start(&self.name).await
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.runtime.stop(&self.name).await
    }

    async fn remove(&self) -> Result<(), ServiceError> {
        self.runtime.remove(&self.name).await
    }

    async fn status(&self) -> Result<StatusReport, ServiceError> {
        match tokio::time::timeout(self.probe_timeout, self.probe()).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::ProbeTimeout(self.probe_timeout)),
        }
    }

    async fn is_running(&self) -> bool {
        match self.runtime.inspect(&self.name).await {
            Ok(state) => state.is_running(),
            Err(err) => {
                debug!(service = %self.name, error = %err, "inspect failed; treating as not running");
                false
            }
        }
    }

    async fn rescue(&self) -> bool {
        info!(service = %self.name, "restarting container after stuck detection");
        match self.runtime.restart(&self.name).await {
            Ok(()) => true,
            Err(err) => {
                warn!(service = %self.name, error = %err, "rescue restart failed");
                false
            }
        }
    }

    fn rpc_params(&self) -> Option<RpcParams> {
        self.rpc_params.clone()
    }
}

/// Map a failed `opendex-cli getinfo` to a status, if the failure is a known state.
pub fn settlement_status_from_error(output: &str, data_dir: &Path) -> Option<StatusReport> {
    if output.contains("opendexd is locked") {
        let status = if data_dir.join(NODE_KEY_FILE).exists() {
            WALLET_LOCKED
        } else {
            WALLET_MISSING
        };
        return Some(StatusReport::new(status));
    }
    if SETTLEMENT_STARTING_MARKERS
        .iter()
        .any(|marker| output.contains(marker))
    {
        return Some(StatusReport::new(StatusReport::STARTING));
    }
    None
}

/// Summarise `opendex-cli getinfo -j` over the light clients and the channel hub.
pub fn settlement_status_from_info(
    info: &Value,
    light_clients: &[(String, String)],
    hub: Option<&str>,
) -> Result<StatusReport, ServiceError> {
    let entries = info
        .get("lndMap")
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::Probe("getinfo output has no lndMap".to_owned()))?;

    let mut statuses: Vec<(&str, String)> = Vec::new();
    for (ticker, service) in light_clients {
        let status = entries
            .iter()
            .filter_map(Value::as_array)
            .find(|entry| entry.first().and_then(Value::as_str) == Some(ticker.as_str()))
            .and_then(|entry| entry.get(1))
            .and_then(|details| details.get("status"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        statuses.push((service.as_str(), status));
    }
    if let Some(hub) = hub {
        let status = info
            .get("connext")
            .and_then(|connext| connext.get("status"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        statuses.push((hub, status));
    }

    let not_ready: Vec<&str> = statuses
        .iter()
        .filter(|(_, status)| status != StatusReport::READY)
        .map(|(name, _)| *name)
        .collect();
    if not_ready.is_empty() {
        return Ok(StatusReport::new(StatusReport::READY));
    }
    if statuses
        .iter()
        .any(|(_, status)| status.contains("has no active channels"))
    {
        return Ok(StatusReport::new("Waiting for channels"));
    }
    Ok(StatusReport::new(format!(
        "Waiting for {}",
        not_ready.join(", ")
    )))
}

pub fn light_client_status_from_error(output: &str) -> Option<StatusReport> {
    let lowered = output.to_lowercase();
    if LIGHT_CLIENT_LOCKED_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return Some(StatusReport::new(LIGHT_CLIENT_LOCKED));
    }
    if LIGHT_CLIENT_STARTING_MARKERS
        .iter()
        .any(|marker| lowered.contains(&marker.to_lowercase()))
    {
        return Some(StatusReport::new(StatusReport::STARTING));
    }
    None
}

/// `Ready` once synced to chain and graph, otherwise `Syncing` with the current height
/// so successive polls differ while progress is being made.
pub fn light_client_status_from_info(info: &Value) -> Result<StatusReport, ServiceError> {
    let synced_chain = info
        .get("synced_to_chain")
        .and_then(Value::as_bool)
        .ok_or_else(|| ServiceError::Probe("getinfo output has no synced_to_chain".to_owned()))?;
    let synced_graph = info
        .get("synced_to_graph")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    if synced_chain && synced_graph {
        return Ok(StatusReport::new(StatusReport::READY));
    }
    let height = info
        .get("block_height")
        .and_then(Value::as_u64)
        .unwrap_or_default();
    Ok(StatusReport::new(format!("Syncing (block {})", height)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn clients() -> Vec<(String, String)> {
        vec![
            ("BTC".to_owned(), "lndbtc".to_owned()),
            ("LTC".to_owned(), "lndltc".to_owned()),
        ]
    }

    #[test]
    fn settlement_ready_when_every_dependency_ready() {
        let info = json!({
            "lndMap": [["BTC", {"status": "Ready"}], ["LTC", {"status": "Ready"}]],
            "connext": {"status": "Ready"}
        });
        let status = settlement_status_from_info(&info, &clients(), Some("connext")).unwrap();
        assert_eq!(status.as_str(), "Ready");
    }

    #[test]
    fn settlement_waits_for_channels_before_listing_names() {
        let info = json!({
            "lndMap": [["BTC", {"status": "lndbtc has no active channels"}], ["LTC", {"status": "Ready"}]],
            "connext": {"status": "Starting"}
        });
        let status = settlement_status_from_info(&info, &clients(), Some("connext")).unwrap();
        assert_eq!(status.as_str(), "Waiting for channels");
    }

    #[test]
    fn settlement_lists_not_ready_dependencies_in_order() {
        let info = json!({
            "lndMap": [["LTC", {"status": "Syncing"}]],
            "connext": {"status": "Ready"}
        });
        let status = settlement_status_from_info(&info, &clients(), Some("connext")).unwrap();
        assert_eq!(status.as_str(), "Waiting for lndbtc, lndltc");
    }

    #[test]
    fn locked_settlement_distinguishes_missing_wallet() {
        let dir = tempdir().unwrap();
        let output = "Error: opendexd is locked, run 'opendex-cli unlock'";
        let missing = settlement_status_from_error(output, dir.path()).unwrap();
        assert!(missing.as_str().starts_with("Wallet missing"));

        std::fs::write(dir.path().join(NODE_KEY_FILE), b"key").unwrap();
        let locked = settlement_status_from_error(output, dir.path()).unwrap();
        assert!(locked.as_str().starts_with("Wallet locked"));

        let starting =
            settlement_status_from_error("could not connect, is opendexd running?", dir.path());
        assert_eq!(starting.unwrap().as_str(), "Starting...");
        assert!(settlement_status_from_error("boom", dir.path()).is_none());
    }

    #[test]
    fn light_client_reports_height_while_syncing() {
        let syncing = json!({"synced_to_chain": false, "block_height": 1200});
        assert_eq!(
            light_client_status_from_info(&syncing).unwrap().as_str(),
            "Syncing (block 1200)"
        );
        let ready = json!({"synced_to_chain": true, "synced_to_graph": true});
        assert_eq!(light_client_status_from_info(&ready).unwrap().as_str(), "Ready");
        assert!(light_client_status_from_info(&json!({})).is_err());
        assert!(light_client_status_from_error("[lncli] wallet locked, unlock it to fully start")
            .unwrap()
            .as_str()
            .starts_with("Wallet locked"));
    }
}
