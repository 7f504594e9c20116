//! ---
//! fleet_section: "02-service-adapters"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Deployment descriptor generation for the compose engine."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dexfleet_common::{FleetConfig, ServiceConfig, ServiceKind};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

use crate::error::ServiceError;

const BACKUP_MOUNT: &str = ":/root/backup";
const PROXY_CONTAINER_PORT: u16 = 8080;

/// Writes the descriptors the container engine starts services from.
#[async_trait]
pub trait DescriptorGenerator: Send + Sync {
    /// Generate descriptors for `config` with backups written to `backup_dir`.
    /// Returns the path of the primary descriptor.
    async fn generate(&self, config: &FleetConfig, backup_dir: &Path)
        -> Result<PathBuf, ServiceError>;
}

#[derive(Debug, Serialize)]
struct ComposeFile {
    version: &'static str,
    services: IndexMap<String, ComposeService>,
}

#[derive(Debug, Serialize)]
struct ComposeService {
    image: String,
    hostname: String,
    restart: &'static str,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    environment: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
}

/// [`DescriptorGenerator`] writing a single `docker-compose.yml`.
#[derive(Debug, Clone, Default)]
pub struct ComposeGenerator;

impl ComposeGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Render the compose document without touching the filesystem.
    pub fn render(&self, config: &FleetConfig, backup_dir: &Path) -> Result<String, ServiceError> {
        let network_dir = config
            .network_dir()
            .map_err(|err| ServiceError::Probe(format!("{:#}", err)))?;
        let mut services = IndexMap::new();

        for (name, service) in &config.services {
            let data_dir = config
                .service_dir(name)
                .map_err(|err| ServiceError::Probe(format!("{:#}", err)))?;

            let mut environment = IndexMap::new();
            environment.insert("NETWORK".to_owned(), config.network.as_str().to_owned());
            environment.extend(service.environment.clone());

            let mut ports = service.ports.clone();
            let mut volumes = Vec::new();
            let mut depends_on = Vec::new();

            match service.kind {
                ServiceKind::Proxy => {
                    volumes.push("/var/run/docker.sock:/var/run/docker.sock".to_owned());
                    volumes.push(format!("{}:/root/network:ro", network_dir.display()));
                    if let Some(port) = service.rpc_port {
                        ports.push(format!("127.0.0.1:{}:{}", port, PROXY_CONTAINER_PORT));
                    }
                }
                ServiceKind::Settlement => {
                    volumes.push(format!("{}:/root/.opendex", data_dir.display()));
                    for client in config.services_of(ServiceKind::LightClient) {
                        let client_dir = config
                            .service_dir(client)
                            .map_err(|err| ServiceError::Probe(format!("{:#}", err)))?;
                        volumes.push(format!("{}:/root/.{}", client_dir.display(), client));
                    }
                    volumes.push(format!("{}{}", backup_dir.display(), BACKUP_MOUNT));
                    depends_on.extend(
                        config
                            .services
                            .iter()
                            .filter(|(_, other)| other.kind.is_settlement_dependency() && !other.disabled)
                            .map(|(other, _)| other.clone()),
                    );
                }
                ServiceKind::LightClient => {
                    volumes.push(format!("{}:/root/.lnd", data_dir.display()));
                    depends_on.extend(chain_daemons(config, service));
                }
                ServiceKind::ChannelHub => {
                    volumes.push(format!("{}:/root/.{}", data_dir.display(), name));
                    depends_on.extend(chain_daemons(config, service));
                }
                _ => {
                    volumes.push(format!("{}:/root/.{}", data_dir.display(), name));
                }
            }

            services.insert(
                name.clone(),
                ComposeService {
                    image: service.image.clone(),
                    hostname: name.clone(),
                    restart: "unless-stopped",
                    environment,
                    ports,
                    volumes,
                    depends_on,
                },
            );
        }

        let document = ComposeFile {
            version: "2.4",
            services,
        };
        Ok(serde_yaml::to_string(&document)?)
    }
}

#[async_trait]
impl DescriptorGenerator for ComposeGenerator {
    async fn generate(
        &self,
        config: &FleetConfig,
        backup_dir: &Path,
    ) -> Result<PathBuf, ServiceError> {
        let rendered = self.render(config, backup_dir)?;
        let path = config
            .compose_file()
            .map_err(|err| ServiceError::Probe(format!("{:#}", err)))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, rendered).await?;
        info!(path = %path.display(), backup_dir = %backup_dir.display(), "deployment descriptor written");
        Ok(path)
    }
}

/// Enabled chain daemons on the same chain as `service`; none without a chain.
fn chain_daemons(config: &FleetConfig, service: &ServiceConfig) -> Vec<String> {
    let Some(chain) = service.chain else {
        return Vec::new();
    };
    config
        .services
        .iter()
        .filter(|(_, other)| {
            other.kind == ServiceKind::ChainDaemon && other.chain == Some(chain) && !other.disabled
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Backup location mounted by a previously generated compose file, if any.
pub fn recover_backup_dir(compose_file: &Path) -> Option<PathBuf> {
    let contents = std::fs::read_to_string(compose_file).ok()?;
    contents
        .lines()
        .find(|line| line.contains(BACKUP_MOUNT))
        .map(|line| {
            let line = line.trim().replace("::", ":");
            let line = line.trim_start_matches("- ").trim_matches(|c: char| c == '"' || c == '\'');
            PathBuf::from(line.trim_end_matches(BACKUP_MOUNT))
        })
        .filter(|dir| !dir.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexfleet_common::Network;
    use tempfile::tempdir;

    #[tokio::test]
    async fn generated_descriptor_exposes_backup_location() {
        let dir = tempdir().unwrap();
        let mut config = FleetConfig::for_network(Network::Testnet);
        config.network_dir = Some(dir.path().to_path_buf());
        let backup = dir.path().join("usb");

        let path = ComposeGenerator::new()
            .generate(&config, &backup)
            .await
            .unwrap();

        let rendered = std::fs::read_to_string(&path).unwrap();
        assert!(rendered.contains("opendexd:"));
        assert!(rendered.contains("127.0.0.1:18889:8080"));
        assert_eq!(recover_backup_dir(&path), Some(backup));
    }

    #[test]
    fn light_clients_depend_on_their_chain_daemon() {
        let config = FleetConfig::for_network(Network::Mainnet);
        let rendered = ComposeGenerator::new()
            .render(&config, Path::new("/backup"))
            .unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();
        let depends = &parsed["services"]["lndltc"]["depends_on"];
        assert_eq!(depends[0].as_str(), Some("litecoind"));
        let settlement = &parsed["services"]["opendexd"]["depends_on"];
        assert_eq!(settlement.as_sequence().map(Vec::len), Some(3));
    }

    #[test]
    fn channel_hub_depends_on_ethereum_daemon() {
        let config = FleetConfig::for_network(Network::Mainnet);
        let rendered = ComposeGenerator::new()
            .render(&config, Path::new("/backup"))
            .unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();
        let depends = parsed["services"]["connext"]["depends_on"]
            .as_sequence()
            .cloned()
            .unwrap_or_default();
        assert_eq!(depends, vec![serde_yaml::Value::from("geth")]);

        let mut config = FleetConfig::for_network(Network::Mainnet);
        if let Some(geth) = config.services.get_mut("geth") {
            geth.disabled = true;
        }
        let rendered = ComposeGenerator::new()
            .render(&config, Path::new("/backup"))
            .unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();
        assert!(parsed["services"]["connext"].get("depends_on").is_none());
    }

    #[test]
    fn recovery_tolerates_broken_colons() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docker-compose.yml");
        std::fs::write(&path, "services:\n  opendexd:\n    volumes:\n      - /media/usb::/root/backup\n").unwrap();
        assert_eq!(recover_backup_dir(&path), Some(PathBuf::from("/media/usb")));
        assert_eq!(recover_backup_dir(&dir.path().join("absent.yml")), None);
    }
}
