//! ---
//! fleet_section: "02-service-adapters"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Wallet create/unlock collaborators for the settlement daemon."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::WalletError;
use crate::runtime::ContainerRuntime;

const INCORRECT_PASSWORD: &str = "password is incorrect";

/// Abstract wallet operations of the settlement daemon.
#[async_trait]
pub trait WalletApi: Send + Sync {
    async fn create(&self, password: &str) -> Result<(), WalletError>;

    async fn unlock(&self, password: &str) -> Result<(), WalletError>;

    /// Interactive implementations prompt for the password themselves and
    /// ignore the `password` argument.
    fn is_interactive(&self) -> bool {
        false
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Wallet calls issued through the proxy REST API.
#[derive(Clone)]
pub struct ProxyWalletApi {
    client: reqwest::Client,
    base_url: String,
}

impl ProxyWalletApi {
    /// `base_url` is the proxy address, e.g. `https://127.0.0.1:8889`. The proxy
    /// serves a self-signed certificate on loopback so validation is relaxed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    async fn post(&self, operation: &str, password: &str) -> Result<(), WalletError> {
        let url = format!("{}/api/v1/opendexd/{}", self.base_url, operation);
        debug!(url = %url, "issuing wallet request");
        let response = self
            .client
            .post(&url)
            .json(&json!({ "password": password }))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body: ApiErrorBody = response.json().await.map_err(|err| WalletError::Api {
            status: status.as_u16(),
            message: format!("decode error: {}", err),
        })?;
        if body.message.contains(INCORRECT_PASSWORD) {
            return Err(WalletError::IncorrectPassword);
        }
        Err(WalletError::Api {
            status: status.as_u16(),
            message: body.message,
        })
    }
}

#[async_trait]
impl WalletApi for ProxyWalletApi {
    async fn create(&self, password: &str) -> Result<(), WalletError> {
        self.post("create", password).await
    }

    async fn unlock(&self, password: &str) -> Result<(), WalletError> {
        self.post("unlock", password).await
    }
}

/// Wallet calls run as `opendex-cli` inside the settlement container, attached to
/// the operator's terminal.
pub struct ConsoleWalletApi {
    runtime: Arc<dyn ContainerRuntime>,
    service: String,
}

impl ConsoleWalletApi {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, service: impl Into<String>) -> Self {
        Self {
            runtime,
            service: service.into(),
        }
    }

    async fn run(&self, operation: &str) -> Result<(), WalletError> {
        info!(service = %self.service, operation, "handing terminal to wallet prompt");
        match self
            .runtime
            .attach(&self.service, &["opendex-cli", operation])
            .await?
        {
            Some(0) => Ok(()),
            code => Err(WalletError::Console(code)),
        }
    }
}

#[async_trait]
impl WalletApi for ConsoleWalletApi {
    async fn create(&self, _password: &str) -> Result<(), WalletError> {
        self.run("create").await
    }

    async fn unlock(&self, _password: &str) -> Result<(), WalletError> {
        self.run("unlock").await
    }

    fn is_interactive(&self) -> bool {
        true
    }
}
