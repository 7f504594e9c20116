//! ---
//! fleet_section: "01-core-functionality"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Fleet configuration schema, per-network defaults and loading."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_network() -> Network {
    Network::Mainnet
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_dependency_poll_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_stuck_threshold() -> u32 {
    100
}

fn default_remediation_cooldown() -> Duration {
    Duration::from_secs(60)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_wallet_password() -> String {
    "OpenDEX!Rocks".to_owned()
}

fn default_control_path() -> String {
    "/launcher".to_owned()
}

fn default_close_timeout() -> Duration {
    Duration::from_millis(1000)
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Name of the configuration file looked up inside the network directory.
pub const CONFIG_FILE_NAME: &str = "dexfleet.toml";
const PASSWORD_MARKER: &str = ".password-unset";
const LEGACY_PASSWORD_MARKER: &str = ".default-password";

/// Target network of a fleet. Drives default composition, images and ports.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Simnet,
    Testnet,
    #[default]
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Simnet => "simnet",
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// Network selected through the `NETWORK` environment variable.
    pub fn from_env() -> Result<Self> {
        match std::env::var("NETWORK") {
            Ok(value) if !value.trim().is_empty() => value.parse::<Network>().map_err(|err| anyhow!(err)),
            _ => Ok(Network::default()),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simnet" => Ok(Network::Simnet),
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(format!("unknown network: {}", other)),
        }
    }
}

/// Chains a light client or chain daemon may serve.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Bitcoin,
    Litecoin,
    Ethereum,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "bitcoin",
            Chain::Litecoin => "litecoin",
            Chain::Ethereum => "ethereum",
        }
    }

    pub fn ticker(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "BTC",
            Chain::Litecoin => "LTC",
            Chain::Ethereum => "ETH",
        }
    }
}

/// Role a service plays in the fleet.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    Proxy,
    Settlement,
    LightClient,
    ChannelHub,
    MarketMaker,
    SwapHelper,
    ChainDaemon,
    WebUi,
}

impl ServiceKind {
    /// Helpers are brought up after the settlement daemon, one after another.
    pub fn is_helper(&self) -> bool {
        matches!(
            self,
            ServiceKind::MarketMaker | ServiceKind::SwapHelper | ServiceKind::WebUi
        )
    }

    /// Services the settlement daemon waits on before it is started itself.
    pub fn is_settlement_dependency(&self) -> bool {
        matches!(self, ServiceKind::LightClient | ServiceKind::ChannelHub)
    }
}

/// Explicit per-service configuration schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub kind: ServiceKind,
    #[serde(default)]
    pub chain: Option<Chain>,
    pub image: String,
    #[serde(default)]
    pub disabled: bool,
    /// Data directory override; defaults to `<network_dir>/data/<name>`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub rpc_port: Option<u16>,
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    #[serde(default)]
    pub ports: Vec<String>,
}

impl ServiceConfig {
    pub fn new(kind: ServiceKind, image: impl Into<String>) -> Self {
        Self {
            kind,
            chain: None,
            image: image.into(),
            disabled: false,
            dir: None,
            rpc_port: None,
            environment: IndexMap::new(),
            ports: Vec::new(),
        }
    }

    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn with_rpc_port(mut self, port: u16) -> Self {
        self.rpc_port = Some(port);
        self
    }
}

/// Timing and threshold knobs of the bring-up loops.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BringupConfig {
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde(default = "default_dependency_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub dependency_poll_interval: Duration,
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: u32,
    #[serde(default = "default_remediation_cooldown")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub remediation_cooldown: Duration,
    #[serde(default = "default_probe_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub probe_timeout: Duration,
    #[serde(default)]
    pub rescue: bool,
}

impl Default for BringupConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            dependency_poll_interval: default_dependency_poll_interval(),
            stuck_threshold: default_stuck_threshold(),
            remediation_cooldown: default_remediation_cooldown(),
            probe_timeout: default_probe_timeout(),
            rescue: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletConfig {
    /// Password used when wallets are created or unlocked without a terminal.
    #[serde(default = "default_wallet_password")]
    pub default_password: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            default_password: default_wallet_password(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlConfig {
    #[serde(default = "default_control_path")]
    pub path: String,
    #[serde(default = "default_close_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "close_timeout_ms")]
    pub close_timeout: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            path: default_control_path(),
            close_timeout: default_close_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log directory; defaults to `<network_dir>/logs`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Mirror events to stderr in addition to the log file.
    #[serde(default)]
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: default_log_format(),
            file_prefix: None,
            console: false,
        }
    }
}

/// Primary configuration object for a fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default = "default_network")]
    pub network: Network,
    #[serde(default)]
    pub home_dir: Option<PathBuf>,
    #[serde(default)]
    pub network_dir: Option<PathBuf>,
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    #[serde(default)]
    pub compose_project: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub bringup: BringupConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub services: IndexMap<String, ServiceConfig>,
}

/// Metadata describing where a [`FleetConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedFleetConfig {
    pub config: FleetConfig,
    /// `None` when no file was found and network defaults were used.
    pub source: Option<PathBuf>,
}

impl FleetConfig {
    pub const ENV_CONFIG_PATH: &'static str = "DEXFLEET_CONFIG";

    /// Default fleet for `network`, mirroring the composition shipped per network.
    pub fn for_network(network: Network) -> Self {
        let mut config = Self {
            network,
            home_dir: None,
            network_dir: None,
            backup_dir: None,
            compose_project: None,
            logging: LoggingConfig::default(),
            bringup: BringupConfig::default(),
            wallet: WalletConfig::default(),
            control: ControlConfig::default(),
            services: IndexMap::new(),
        };
        config.services = default_services(network);
        config
    }

    /// Load configuration, honouring `DEXFLEET_CONFIG`, then `explicit`, then
    /// `<network_dir>/dexfleet.toml`, finally falling back to network defaults.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedFleetConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedFleetConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        if let Some(path) = explicit {
            let config = Self::from_path(path)?;
            return Ok(LoadedFleetConfig {
                config,
                source: Some(path.to_path_buf()),
            });
        }

        let defaults = Self::for_network(Network::from_env()?);
        let candidate = defaults.network_dir()?.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            let config = Self::from_path(&candidate)?;
            return Ok(LoadedFleetConfig {
                config,
                source: Some(candidate),
            });
        }

        debug!(network = %defaults.network, "no configuration file found; using network defaults");
        defaults.validate()?;
        Ok(LoadedFleetConfig {
            config: defaults,
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<FleetConfig>()
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Root of all launcher state, `~/.dexfleet` unless overridden.
    pub fn home_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.home_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().ok_or_else(|| anyhow!("unable to resolve home directory"))?;
        Ok(home.join(".dexfleet"))
    }

    /// Directory holding descriptors, data, logs and backups for the network.
    pub fn network_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.network_dir {
            return Ok(dir.clone());
        }
        if let Ok(dir) = std::env::var("NETWORK_DIR") {
            if !dir.trim().is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }
        Ok(self.home_dir()?.join(self.network.as_str()))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        Ok(self.network_dir()?.join("data"))
    }

    pub fn logs_dir(&self) -> Result<PathBuf> {
        match &self.logging.directory {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.network_dir()?.join("logs")),
        }
    }

    pub fn default_backup_dir(&self) -> Result<PathBuf> {
        Ok(self.network_dir()?.join("backup"))
    }

    pub fn compose_file(&self) -> Result<PathBuf> {
        Ok(self.network_dir()?.join("docker-compose.yml"))
    }

    /// Marker whose presence means wallets still use the default password.
    pub fn password_marker(&self) -> Result<PathBuf> {
        Ok(self.network_dir()?.join(PASSWORD_MARKER))
    }

    /// Compose project name; containers are named `<project>_<service>_1`.
    pub fn project_name(&self) -> String {
        self.compose_project
            .clone()
            .unwrap_or_else(|| self.network.as_str().to_owned())
    }

    /// Effective data directory of a service.
    pub fn service_dir(&self, name: &str) -> Result<PathBuf> {
        let service = self
            .services
            .get(name)
            .ok_or_else(|| anyhow!("unknown service '{}'", name))?;
        match &service.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.data_dir()?.join(name)),
        }
    }

    /// Create the directory layout the launcher writes into and migrate the
    /// legacy password marker.
    pub fn bootstrap_dirs(&self) -> Result<()> {
        let network_dir = self.network_dir()?;
        for dir in [network_dir.clone(), self.data_dir()?, self.logs_dir()?] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("unable to create directory {}", dir.display()))?;
        }
        let legacy = network_dir.join(LEGACY_PASSWORD_MARKER);
        if legacy.exists() {
            let marker = self.password_marker()?;
            fs::rename(&legacy, &marker).with_context(|| {
                format!(
                    "unable to migrate {} to {}",
                    legacy.display(),
                    marker.display()
                )
            })?;
        }
        Ok(())
    }

    /// Names of services with the given role, in fleet order.
    pub fn services_of(&self, kind: ServiceKind) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, service)| service.kind == kind)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(anyhow!("configuration must declare at least one service"));
        }
        for kind in [ServiceKind::Proxy, ServiceKind::Settlement] {
            let found = self.services_of(kind);
            if found.len() != 1 {
                return Err(anyhow!(
                    "configuration must declare exactly one {:?} service, found {}",
                    kind,
                    found.len()
                ));
            }
        }
        for (name, service) in &self.services {
            if name.trim().is_empty() {
                return Err(anyhow!("service names must not be empty"));
            }
            if service.image.trim().is_empty() {
                return Err(anyhow!("service '{}' must declare an image", name));
            }
            if matches!(
                service.kind,
                ServiceKind::LightClient | ServiceKind::ChainDaemon
            ) && service.chain.is_none()
            {
                return Err(anyhow!("service '{}' must declare a chain", name));
            }
        }
        if self.services_of(ServiceKind::LightClient).is_empty() {
            return Err(anyhow!(
                "the settlement daemon requires at least one light-client service"
            ));
        }
        if self.bringup.stuck_threshold == 0 {
            return Err(anyhow!("bringup.stuck_threshold must be positive"));
        }
        Ok(())
    }
}

impl std::str::FromStr for FleetConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let mut config: FleetConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        if config.services.is_empty() {
            config.services = default_services(config.network);
        }
        config.validate()?;
        Ok(config)
    }
}

fn image(name: &str, network: Network) -> String {
    match network {
        Network::Simnet => format!("opendexnetwork/{}-simnet:latest", name),
        Network::Testnet | Network::Mainnet => format!("opendexnetwork/{}:latest", name),
    }
}

fn default_services(network: Network) -> IndexMap<String, ServiceConfig> {
    let mut services = IndexMap::new();
    let (proxy_port, settlement_port) = match network {
        Network::Simnet => (28889, 28886),
        Network::Testnet => (18889, 18886),
        Network::Mainnet => (8889, 8886),
    };

    services.insert(
        "proxy".to_owned(),
        ServiceConfig::new(ServiceKind::Proxy, "opendexnetwork/proxy:latest")
            .with_rpc_port(proxy_port),
    );

    if network != Network::Simnet {
        let (btc_port, ltc_port) = if network == Network::Mainnet {
            (8332, 9332)
        } else {
            (18332, 19332)
        };
        services.insert(
            "bitcoind".to_owned(),
            ServiceConfig::new(ServiceKind::ChainDaemon, image("bitcoind", network))
                .with_chain(Chain::Bitcoin)
                .with_rpc_port(btc_port),
        );
        services.insert(
            "litecoind".to_owned(),
            ServiceConfig::new(ServiceKind::ChainDaemon, image("litecoind", network))
                .with_chain(Chain::Litecoin)
                .with_rpc_port(ltc_port),
        );
        services.insert(
            "geth".to_owned(),
            ServiceConfig::new(ServiceKind::ChainDaemon, image("geth", network))
                .with_chain(Chain::Ethereum)
                .with_rpc_port(8545),
        );
    }

    services.insert(
        "lndbtc".to_owned(),
        ServiceConfig::new(ServiceKind::LightClient, image("lndbtc", network))
            .with_chain(Chain::Bitcoin)
            .with_rpc_port(10009),
    );
    services.insert(
        "lndltc".to_owned(),
        ServiceConfig::new(ServiceKind::LightClient, image("lndltc", network))
            .with_chain(Chain::Litecoin)
            .with_rpc_port(10009),
    );
    services.insert(
        "connext".to_owned(),
        ServiceConfig::new(ServiceKind::ChannelHub, "connextproject/vector_node:3a29f0b2")
            .with_chain(Chain::Ethereum)
            .with_rpc_port(8000),
    );
    services.insert(
        "opendexd".to_owned(),
        ServiceConfig::new(ServiceKind::Settlement, image("opendexd", network))
            .with_rpc_port(settlement_port),
    );
    services.insert(
        "arby".to_owned(),
        ServiceConfig::new(ServiceKind::MarketMaker, image("arby", network)),
    );
    if network != Network::Simnet {
        services.insert(
            "boltz".to_owned(),
            ServiceConfig::new(ServiceKind::SwapHelper, image("boltz", network)),
        );
    }
    services.insert(
        "webui".to_owned(),
        ServiceConfig::new(ServiceKind::WebUi, image("webui", network)),
    );
    services
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simnet_defaults_skip_chain_daemons() {
        let config = FleetConfig::for_network(Network::Simnet);
        let names: Vec<&str> = config.services.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["proxy", "lndbtc", "lndltc", "connext", "opendexd", "arby", "webui"]
        );
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn mainnet_defaults_order_chain_daemons_before_light_clients() {
        let config = FleetConfig::for_network(Network::Mainnet);
        let names: Vec<&str> = config.services.keys().map(String::as_str).collect();
        assert_eq!(names[0], "proxy");
        assert!(names.iter().position(|n| *n == "bitcoind") < names.iter().position(|n| *n == "lndbtc"));
        assert_eq!(config.services["opendexd"].rpc_port, Some(8886));
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: FleetConfig = r#"
            network = "testnet"
            network_dir = "/tmp/fleet"

            [bringup]
            poll_interval = 2
            rescue = true
        "#
        .parse()
        .expect("config parses");
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.bringup.poll_interval, Duration::from_secs(2));
        assert_eq!(config.bringup.stuck_threshold, 100);
        assert!(config.bringup.rescue);
        assert!(config.services.contains_key("boltz"));
        assert_eq!(
            config.compose_file().unwrap(),
            PathBuf::from("/tmp/fleet/docker-compose.yml")
        );
        assert_eq!(config.project_name(), "testnet");
    }

    #[test]
    fn rejects_fleet_without_settlement() {
        let err = r#"
            [services.proxy]
            kind = "proxy"
            image = "proxy:latest"
        "#
        .parse::<FleetConfig>()
        .expect_err("settlement missing");
        assert!(format!("{:#}", err).contains("Settlement"));
    }

    #[test]
    fn service_dir_defaults_under_data_dir() {
        let mut config = FleetConfig::for_network(Network::Simnet);
        config.network_dir = Some(PathBuf::from("/srv/simnet"));
        assert_eq!(
            config.service_dir("lndbtc").unwrap(),
            PathBuf::from("/srv/simnet/data/lndbtc")
        );
        config.services.get_mut("lndbtc").unwrap().dir = Some(PathBuf::from("/mnt/lnd"));
        assert_eq!(config.service_dir("lndbtc").unwrap(), PathBuf::from("/mnt/lnd"));
        assert!(config.service_dir("missing").is_err());
    }
}
