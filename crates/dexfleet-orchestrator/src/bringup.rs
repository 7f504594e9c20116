//! ---
//! fleet_section: "03-orchestration"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Single-service bring-up loop with stuck detection."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dexfleet_common::{BringupConfig, ServiceKind};
use dexfleet_services::{ServiceError, ServiceHandle, StatusReport};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::progress::ProgressFeed;
use crate::remediation::{Remediation, RemediationVerdict};
use crate::status::{classify, Observation, StatusClass};

/// Polling cadence and stuck handling for one bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Consecutive identical observations after which the service is stuck.
    pub stuck_threshold: u32,
    pub rescue: bool,
}

impl PollPolicy {
    pub fn new(interval: Duration, stuck_threshold: u32, rescue: bool) -> Self {
        Self {
            interval,
            stuck_threshold: stuck_threshold.max(1),
            rescue,
        }
    }

    pub fn fleet(config: &BringupConfig) -> Self {
        Self::new(config.poll_interval, config.stuck_threshold, config.rescue)
    }

    pub fn dependency(config: &BringupConfig) -> Self {
        Self::new(
            config.dependency_poll_interval,
            config.stuck_threshold,
            config.rescue,
        )
    }
}

/// False for any `Container <state>` report other than `Container running`.
fn container_running(status: &StatusReport) -> bool {
    match status.as_str().strip_prefix("Container ") {
        Some(state) => state == "running",
        None => true,
    }
}

type AcceptFn = dyn Fn(&StatusReport, StatusClass) -> bool + Send + Sync;

/// Statuses on which a caller considers the service up.
#[derive(Clone)]
pub enum Acceptance {
    Ready,
    ReadyOrWaitingForChannels,
    /// `Ready`, `Syncing 100.00%`, `Syncing 99.99%` or a locked wallet.
    LightClient,
    /// Any status of a running container that is not fatal.
    AnyRunning,
    Custom(Arc<AcceptFn>),
}

impl fmt::Debug for Acceptance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acceptance::Ready => f.write_str("Ready"),
            Acceptance::ReadyOrWaitingForChannels => f.write_str("ReadyOrWaitingForChannels"),
            Acceptance::LightClient => f.write_str("LightClient"),
            Acceptance::AnyRunning => f.write_str("AnyRunning"),
            Acceptance::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl Acceptance {
    pub fn for_kind(kind: ServiceKind) -> Self {
        match kind {
            ServiceKind::Proxy | ServiceKind::ChannelHub => Acceptance::Ready,
            ServiceKind::Settlement => Acceptance::ReadyOrWaitingForChannels,
            ServiceKind::LightClient => Acceptance::LightClient,
            ServiceKind::MarketMaker
            | ServiceKind::SwapHelper
            | ServiceKind::WebUi
            | ServiceKind::ChainDaemon => Acceptance::AnyRunning,
        }
    }

    pub fn accepts(&self, status: &StatusReport, class: StatusClass) -> bool {
        match self {
            Acceptance::Ready => class == StatusClass::Ready,
            Acceptance::ReadyOrWaitingForChannels => {
                matches!(class, StatusClass::Ready | StatusClass::WaitingForChannels)
            }
            Acceptance::LightClient => {
                let text = status.as_str();
                class == StatusClass::Ready
                    || class == StatusClass::WalletLocked
                    || text.starts_with("Syncing 100.00%")
                    || text.starts_with("Syncing 99.99%")
            }
            Acceptance::AnyRunning => !class.is_fatal() && container_running(status),
            Acceptance::Custom(accept) => accept(status, class),
        }
    }
}

/// Terminal success states of a bring-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BringUpOutcome {
    Ready,
    Accepted { status: StatusReport },
    AcceptedWithCaveat { status: StatusReport, caveat: String },
    /// The service is disabled and was stopped and removed if it ran.
    Absent,
}

#[derive(Debug, thiserror::Error)]
pub enum BringUpError {
    #[error("{service}: {status}")]
    Fatal { service: String, status: StatusReport },
    #[error("{service} stuck")]
    Stuck { service: String, last: String },
    #[error("{service}: interrupted")]
    Interrupted { service: String },
    #[error("{service}: {operation}: {source}")]
    Lifecycle {
        service: String,
        operation: &'static str,
        #[source]
        source: ServiceError,
    },
}

impl BringUpError {
    pub fn service(&self) -> &str {
        match self {
            BringUpError::Fatal { service, .. }
            | BringUpError::Stuck { service, .. }
            | BringUpError::Interrupted { service }
            | BringUpError::Lifecycle { service, .. } => service,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, BringUpError::Interrupted { .. })
    }
}

/// Drives one service through up, polling, remediation and stuck handling.
pub struct ServiceBringUp {
    service: Arc<dyn ServiceHandle>,
    policy: PollPolicy,
    acceptance: Acceptance,
    remediation: Option<Arc<dyn Remediation>>,
    progress: Option<ProgressFeed>,
    cancel: CancellationToken,
}

impl ServiceBringUp {
    pub fn new(service: Arc<dyn ServiceHandle>, policy: PollPolicy, cancel: CancellationToken) -> Self {
        let acceptance = Acceptance::for_kind(service.kind());
        Self {
            service,
            policy,
            acceptance,
            remediation: None,
            progress: None,
            cancel,
        }
    }

    pub fn with_acceptance(mut self, acceptance: Acceptance) -> Self {
        self.acceptance = acceptance;
        self
    }

    pub fn with_remediation(mut self, remediation: Arc<dyn Remediation>) -> Self {
        self.remediation = Some(remediation);
        self
    }

    pub fn with_progress(mut self, progress: ProgressFeed) -> Self {
        self.progress = Some(progress);
        self
    }

    fn lifecycle(&self, operation: &'static str, source: ServiceError) -> BringUpError {
        BringUpError::Lifecycle {
            service: self.service.name().to_owned(),
            operation,
            source,
        }
    }

    fn interrupted(&self) -> BringUpError {
        BringUpError::Interrupted {
            service: self.service.name().to_owned(),
        }
    }

    async fn retire(&self) -> Result<BringUpOutcome, BringUpError> {
        if self.service.is_running().await {
            info!(service = %self.service.name(), "stopping disabled service");
            self.service
                .stop()
                .await
                .map_err(|err| self.lifecycle("stop", err))?;
            self.service
                .remove()
                .await
                .map_err(|err| self.lifecycle("remove", err))?;
        }
        Ok(BringUpOutcome::Absent)
    }

    pub async fn run(self) -> Result<BringUpOutcome, BringUpError> {
        let name = self.service.name().to_owned();
        if self.service.is_disabled() {
            return self.retire().await;
        }

        tokio::select! {
            _ = self.cancel.cancelled() => return Err(self.interrupted()),
            started = self.service.up() => started.map_err(|err| self.lifecycle("up", err))?,
        }
        debug!(service = %name, policy = ?self.policy, acceptance = ?self.acceptance, "service started; polling status");

        let mut previous: Option<Observation> = None;
        let mut repeats: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.interrupted());
            }

            let probed = tokio::select! {
                _ = self.cancel.cancelled() => return Err(self.interrupted()),
                probed = self.service.status() => probed,
            };
            let observation = match probed {
                Ok(status) => Observation::Status(status),
                Err(err) => {
                    warn!(service = %name, error = %err, "status probe failed");
                    Observation::ProbeError(err.to_string())
                }
            };
            repeats = match &previous {
                Some(prev) if prev.same_as(&observation) => repeats + 1,
                _ => 1,
            };
            debug!(service = %name, status = %observation, repeats, "status observed");
            if let Some(progress) = &self.progress {
                progress.publish(&name, observation.to_string());
            }

            if let Observation::Status(status) = &observation {
                let class = classify(status.as_str());
                if class.is_fatal() {
                    return Err(BringUpError::Fatal {
                        service: name,
                        status: status.clone(),
                    });
                }
                if self.acceptance.accepts(status, class) {
                    info!(service = %name, status = %status, "service is up");
                    return Ok(if class == StatusClass::Ready {
                        BringUpOutcome::Ready
                    } else {
                        BringUpOutcome::Accepted {
                            status: status.clone(),
                        }
                    });
                }
                if let Some(remediation) = &self.remediation {
                    match remediation.remediate(&name, class, status).await {
                        RemediationVerdict::KeepPolling => {}
                        RemediationVerdict::Accept { caveat: None } => {
                            info!(service = %name, status = %status, "status accepted by remediation");
                            return Ok(BringUpOutcome::Accepted {
                                status: status.clone(),
                            });
                        }
                        RemediationVerdict::Accept {
                            caveat: Some(caveat),
                        } => {
                            warn!(service = %name, status = %status, caveat = %caveat, "status accepted with caveat");
                            return Ok(BringUpOutcome::AcceptedWithCaveat {
                                status: status.clone(),
                                caveat,
                            });
                        }
                    }
                }
            }

            if repeats >= self.policy.stuck_threshold {
                if self.policy.rescue && self.service.rescue().await {
                    info!(service = %name, status = %observation, "rescue attempted; resuming polling");
                    repeats = 0;
                } else {
                    warn!(service = %name, status = %observation, repeats, "service made no progress");
                    return Err(BringUpError::Stuck {
                        service: name,
                        last: observation.to_string(),
                    });
                }
            }
            previous = Some(observation);

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(self.interrupted()),
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_client_acceptance() {
        let accept = Acceptance::for_kind(ServiceKind::LightClient);
        for text in ["Ready", "Syncing 100.00% (812345/812345)", "Syncing 99.99%", "Wallet locked. Unlock with lncli unlock."] {
            let status = StatusReport::from(text);
            assert!(accept.accepts(&status, classify(text)), "{}", text);
        }
        for text in ["Syncing 99.98%", "Starting...", "Waiting for channels"] {
            let status = StatusReport::from(text);
            assert!(!accept.accepts(&status, classify(text)), "{}", text);
        }
    }

    #[test]
    fn helpers_accept_anything_but_fatal() {
        let accept = Acceptance::for_kind(ServiceKind::MarketMaker);
        assert!(accept.accepts(&"Starting...".into(), StatusClass::NotReady));
        assert!(accept.accepts(&"".into(), StatusClass::NotReady));
        assert!(!accept.accepts(&"Container exited".into(), StatusClass::ContainerExited));
    }

    #[test]
    fn helpers_reject_containers_that_are_not_running() {
        let accept = Acceptance::for_kind(ServiceKind::ChainDaemon);
        for text in ["Container created", "Container restarting", "Container paused"] {
            let status = StatusReport::from(text);
            assert!(!accept.accepts(&status, classify(text)), "{}", text);
        }
        for text in ["Ready", "Syncing 41.20%", "Starting..."] {
            let status = StatusReport::from(text);
            assert!(accept.accepts(&status, classify(text)), "{}", text);
        }
    }

    #[test]
    fn settlement_accepts_waiting_for_channels() {
        let accept = Acceptance::for_kind(ServiceKind::Settlement);
        assert!(accept.accepts(&"Waiting for channels".into(), StatusClass::WaitingForChannels));
        assert!(!accept.accepts(&"Waiting for lndbtc".into(), StatusClass::NotReady));
        assert!(!accept.accepts(&"Wallet locked".into(), StatusClass::WalletLocked));
    }
}
