//! ---
//! fleet_section: "02-service-adapters"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Ordered collection of the service handles making up a fleet."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::sync::Arc;

use dexfleet_common::{FleetConfig, ServiceKind};
use indexmap::IndexMap;

use crate::container::{ContainerService, StatusProbe};
use crate::error::ServiceError;
use crate::runtime::ContainerRuntime;
use crate::service::{RpcParams, RpcProtocol, ServiceHandle};

const LOOPBACK: &str = "127.0.0.1";

/// Service handles keyed by name, in configuration order.
#[derive(Clone, Default)]
pub struct Fleet {
    services: IndexMap<String, Arc<dyn ServiceHandle>>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, service: Arc<dyn ServiceHandle>) {
        self.services.insert(service.name().to_owned(), service);
    }

    pub fn with_service(mut self, service: Arc<dyn ServiceHandle>) -> Self {
        self.insert(service);
        self
    }

    /// Build container-backed handles for every configured service.
    pub fn from_config(
        config: &FleetConfig,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, ServiceError> {
        let light_clients: Vec<(String, String)> = config
            .services
            .iter()
            .filter(|(_, service)| service.kind == ServiceKind::LightClient)
            .filter_map(|(name, service)| {
                service
                    .chain
                    .map(|chain| (chain.ticker().to_owned(), name.clone()))
            })
            .collect();
        let hub = config
            .services_of(ServiceKind::ChannelHub)
            .first()
            .map(|name| (*name).to_owned());

        let mut fleet = Fleet::new();
        for (name, service) in &config.services {
            let data_dir = config
                .service_dir(name)
                .map_err(|err| ServiceError::Probe(format!("{:#}", err)))?;

            let probe = match (service.kind, service.chain) {
                (ServiceKind::Proxy, _) => match service.rpc_port {
                    Some(port) => StatusProbe::Port {
                        host: LOOPBACK.to_owned(),
                        port,
                    },
                    None => StatusProbe::Container,
                },
                (ServiceKind::Settlement, _) => StatusProbe::Settlement {
                    light_clients: light_clients.clone(),
                    hub: hub.clone(),
                },
                (ServiceKind::LightClient, Some(chain)) => StatusProbe::LightClient {
                    network: config.network,
                    chain,
                },
                _ => StatusProbe::Container,
            };

            let mut handle = ContainerService::new(name.clone(), service.kind, &data_dir, runtime.clone())
                .disabled(service.disabled)
                .with_probe(probe)
                .with_probe_timeout(config.bringup.probe_timeout);

            if let Some(port) = service.rpc_port {
                let params = match service.kind {
                    ServiceKind::Proxy => Some(RpcParams::new(RpcProtocol::Rest, LOOPBACK, port)),
                    ServiceKind::Settlement => Some(
                        RpcParams::new(RpcProtocol::Grpc, name.clone(), port)
                            .with_tls_cert(data_dir.join("tls.cert")),
                    ),
                    ServiceKind::LightClient => {
                        let mut params = RpcParams::new(RpcProtocol::Grpc, name.clone(), port)
                            .with_tls_cert(data_dir.join("tls.cert"));
                        if let Some(chain) = service.chain {
                            params = params.with_credentials(
                                data_dir
                                    .join("data")
                                    .join("chain")
                                    .join(chain.as_str())
                                    .join(config.network.as_str())
                                    .join("admin.macaroon"),
                            );
                        }
                        Some(params)
                    }
                    ServiceKind::ChannelHub | ServiceKind::ChainDaemon => {
                        Some(RpcParams::new(RpcProtocol::Http, name.clone(), port))
                    }
                    _ => None,
                };
                if let Some(params) = params {
                    handle = handle.with_rpc_params(params);
                }
            }
            fleet.insert(Arc::new(handle));
        }
        Ok(fleet)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ServiceHandle>> {
        self.services.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Arc<dyn ServiceHandle>, ServiceError> {
        self.get(name)
            .ok_or_else(|| ServiceError::UnknownService(name.to_owned()))
    }

    /// Handles with the given role, in fleet order.
    pub fn of_kind(&self, kind: ServiceKind) -> Vec<Arc<dyn ServiceHandle>> {
        self.services
            .values()
            .filter(|service| service.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn first_of(&self, kind: ServiceKind) -> Option<Arc<dyn ServiceHandle>> {
        self.services
            .values()
            .find(|service| service.kind() == kind)
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ServiceHandle>> {
        self.services.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
