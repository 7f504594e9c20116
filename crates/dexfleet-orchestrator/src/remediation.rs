//! ---
//! fleet_section: "03-orchestration"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Remedial flows triggered by recoverable service states."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dexfleet_services::{StatusReport, WalletApi, WalletError};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::status::StatusClass;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationVerdict {
    KeepPolling,
    /// End the bring-up successfully on the current status.
    Accept { caveat: Option<String> },
}

/// Hook invoked for every status a service reports while being brought up.
#[async_trait]
pub trait Remediation: Send + Sync {
    async fn remediate(
        &self,
        service: &str,
        class: StatusClass,
        status: &StatusReport,
    ) -> RemediationVerdict;
}

/// Creates or unlocks the settlement wallet.
///
/// An action is repeated only after the status text changed or `cooldown`
/// elapsed. The password marker records that wallets still use the default
/// password: it is written after a non-interactive create and removed when
/// the default password is rejected.
pub struct WalletRemediation {
    api: Arc<dyn WalletApi>,
    password: String,
    marker: PathBuf,
    cooldown: Duration,
    last_attempt: Mutex<Option<(StatusReport, Instant)>>,
}

impl WalletRemediation {
    pub fn new(
        api: Arc<dyn WalletApi>,
        password: impl Into<String>,
        marker: impl Into<PathBuf>,
        cooldown: Duration,
    ) -> Self {
        Self {
            api,
            password: password.into(),
            marker: marker.into(),
            cooldown,
            last_attempt: Mutex::new(None),
        }
    }

    pub fn using_default_password(&self) -> bool {
        self.marker.exists()
    }

    /// Record an attempt for `status` unless one is still cooling down.
    fn claim_attempt(&self, status: &StatusReport) -> bool {
        let mut last = self.last_attempt.lock();
        if let Some((previous, at)) = last.as_ref() {
            if previous == status && at.elapsed() < self.cooldown {
                return false;
            }
        }
        *last = Some((status.clone(), Instant::now()));
        true
    }

    fn forget_if_changed(&self, status: &StatusReport) {
        let mut last = self.last_attempt.lock();
        if matches!(last.as_ref(), Some((previous, _)) if previous != status) {
            *last = None;
        }
    }

    async fn create(&self, service: &str) {
        info!(service = %service, interactive = self.api.is_interactive(), "creating wallet");
        match self.api.create(&self.password).await {
            Ok(()) => {
                if self.api.is_interactive() {
                    return;
                }
                if let Err(err) = tokio::fs::File::create(&self.marker).await {
                    error!(service = %service, marker = %self.marker.display(), error = %err, "failed to write password marker");
                }
            }
            Err(err) => warn!(service = %service, error = %err, "wallet creation failed"),
        }
    }

    async fn unlock(&self, service: &str) -> RemediationVerdict {
        info!(service = %service, "unlocking wallet with default password");
        match self.api.unlock(&self.password).await {
            Ok(()) => RemediationVerdict::KeepPolling,
            Err(WalletError::IncorrectPassword) => {
                warn!(service = %service, "default password rejected; leaving wallet locked");
                if let Err(err) = tokio::fs::remove_file(&self.marker).await {
                    warn!(marker = %self.marker.display(), error = %err, "failed to remove password marker");
                }
                RemediationVerdict::Accept {
                    caveat: Some("default password rejected; unlock the wallet manually".to_owned()),
                }
            }
            Err(err) => {
                warn!(service = %service, error = %err, "wallet unlock failed");
                RemediationVerdict::KeepPolling
            }
        }
    }
}

#[async_trait]
impl Remediation for WalletRemediation {
    async fn remediate(
        &self,
        service: &str,
        class: StatusClass,
        status: &StatusReport,
    ) -> RemediationVerdict {
        match class {
            StatusClass::WalletMissing => {
                if self.claim_attempt(status) {
                    self.create(service).await;
                }
                RemediationVerdict::KeepPolling
            }
            StatusClass::WalletLocked => {
                if !self.using_default_password() {
                    return RemediationVerdict::Accept { caveat: None };
                }
                if self.claim_attempt(status) {
                    self.unlock(service).await
                } else {
                    RemediationVerdict::KeepPolling
                }
            }
            _ => {
                self.forget_if_changed(status);
                RemediationVerdict::KeepPolling
            }
        }
    }
}
