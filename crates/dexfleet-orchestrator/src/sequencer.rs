//! ---
//! fleet_section: "03-orchestration"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Fleet-wide bring-up plan."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dexfleet_common::ServiceKind;
use dexfleet_control::{attach, control_url, ControlChannelConfig, ControlError, ControlHandler};
use dexfleet_services::{RpcParams, ServiceError, ServiceHandle};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bringup::{Acceptance, BringUpError, BringUpOutcome, PollPolicy};
use crate::progress::{render_live, ProgressTable};
use crate::session::{Launcher, RunMode};

/// Extra time the control task gets past its close handshake timeout.
const CONTROL_DETACH_GRACE: Duration = Duration::from_millis(500);

const HELPER_ORDER: [ServiceKind; 3] = [
    ServiceKind::MarketMaker,
    ServiceKind::SwapHelper,
    ServiceKind::WebUi,
];

#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("a bring-up session is already active")]
    AlreadyRunning,
    #[error("generate descriptors: {0}")]
    Descriptor(#[source] ServiceError),
    #[error(transparent)]
    BringUp(#[from] BringUpError),
    #[error("dependency {service} failed: {source}")]
    Dependency {
        service: String,
        #[source]
        source: BringUpError,
    },
    #[error("console: {0}")]
    Console(#[source] ServiceError),
    #[error("interrupted")]
    Interrupted,
}

impl SequenceError {
    pub fn is_interrupted(&self) -> bool {
        match self {
            SequenceError::Interrupted => true,
            SequenceError::BringUp(err) | SequenceError::Dependency { source: err, .. } => {
                err.is_interrupted()
            }
            _ => false,
        }
    }
}

/// Interactive shell handed the terminal once the fleet is up.
#[async_trait]
pub trait Console: Send + Sync {
    async fn hand_off(&self) -> Result<(), ServiceError>;
}

/// Opens the control channel to the proxy and serves it until it ends.
#[async_trait]
pub trait ControlAttachment: Send + Sync {
    async fn attach(
        &self,
        proxy: Option<RpcParams>,
        handler: Arc<dyn ControlHandler>,
        cancel: CancellationToken,
    ) -> Result<(), ControlError>;
}

/// [`ControlAttachment`] over `wss://127.0.0.1:<proxy port><path>`.
#[derive(Debug, Clone, Default)]
pub struct WebsocketAttachment {
    config: ControlChannelConfig,
}

impl WebsocketAttachment {
    pub fn new(config: ControlChannelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ControlAttachment for WebsocketAttachment {
    async fn attach(
        &self,
        proxy: Option<RpcParams>,
        handler: Arc<dyn ControlHandler>,
        cancel: CancellationToken,
    ) -> Result<(), ControlError> {
        let port = proxy
            .map(|params| params.port)
            .ok_or_else(|| ControlError::Url("proxy exposes no api port".to_owned()))?;
        let url = control_url(port, &self.config.path)?;
        attach(url, handler, cancel, self.config.clone()).await
    }
}

/// Terminal outcome of every service the plan touched, in plan order.
#[derive(Debug, Default, Clone)]
pub struct SequenceReport {
    pub outcomes: Vec<(String, BringUpOutcome)>,
}

impl SequenceReport {
    fn record(&mut self, service: &str, outcome: BringUpOutcome) {
        info!(service = %service, outcome = ?outcome, "bring-up finished");
        self.outcomes.push((service.to_owned(), outcome));
    }

    pub fn outcome(&self, service: &str) -> Option<&BringUpOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == service)
            .map(|(_, outcome)| outcome)
    }
}

/// Composes single-service bring-ups into the fleet plan.
pub struct BringupSequencer {
    launcher: Arc<Launcher>,
    control: Arc<dyn ControlAttachment>,
    console: Arc<dyn Console>,
}

impl BringupSequencer {
    pub fn new(
        launcher: Arc<Launcher>,
        control: Arc<dyn ControlAttachment>,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            launcher,
            control,
            console,
        }
    }

    /// Run the plan. Any failure aborts the remaining steps; nothing is rolled back.
    pub async fn run(&self) -> Result<SequenceReport, SequenceError> {
        let _session = self.launcher.begin()?;
        let cancel = self.launcher.cancel_token().clone();
        let config = self.launcher.config().bringup.clone();
        let mut report = SequenceReport::default();

        let backup_dir = self.launcher.backup_dir();
        self.launcher
            .generate_descriptors(&backup_dir)
            .await
            .map_err(SequenceError::Descriptor)?;

        let proxy = self
            .launcher
            .fleet()
            .first_of(ServiceKind::Proxy)
            .ok_or_else(|| {
                SequenceError::Descriptor(ServiceError::UnknownService("proxy".to_owned()))
            })?;
        let outcome = self
            .launcher
            .bring_up(proxy.clone(), PollPolicy::fleet(&config), cancel.clone())
            .with_acceptance(Acceptance::Ready)
            .run()
            .await?;
        report.record(proxy.name(), outcome);

        let control_cancel = cancel.child_token();
        let control = self.spawn_control(proxy.rpc_params(), control_cancel.clone());

        let result = self.run_after_proxy(&mut report).await;
        let result = match result {
            Ok(()) => self.finish(control, control_cancel).await,
            Err(err) => {
                self.detach(control, &control_cancel).await;
                Err(err)
            }
        };
        result.map(|()| report)
    }

    async fn run_after_proxy(&self, report: &mut SequenceReport) -> Result<(), SequenceError> {
        self.up_dependencies(report).await?;

        let settlement = self
            .launcher
            .fleet()
            .first_of(ServiceKind::Settlement)
            .map(|service| service.name().to_owned())
            .unwrap_or_else(|| "settlement".to_owned());
        if self.launcher.mode() == RunMode::Attended {
            println!("Loading settlement console...");
        }
        let outcome = self.launcher.up_settlement().await?;
        report.record(&settlement, outcome);

        let config = self.launcher.config().bringup.clone();
        for kind in HELPER_ORDER {
            for helper in self.launcher.fleet().of_kind(kind) {
                let name = helper.name().to_owned();
                let outcome = self
                    .launcher
                    .bring_up(helper, PollPolicy::fleet(&config), self.launcher.cancel_token().clone())
                    .run()
                    .await?;
                report.record(&name, outcome);
            }
        }
        Ok(())
    }

    /// Light clients and channel hub concurrently; the first failure cancels the rest.
    async fn up_dependencies(&self, report: &mut SequenceReport) -> Result<(), SequenceError> {
        let dependencies: Vec<Arc<dyn ServiceHandle>> = self
            .launcher
            .fleet()
            .iter()
            .filter(|service| service.kind().is_settlement_dependency())
            .cloned()
            .collect();
        if dependencies.is_empty() {
            return Ok(());
        }

        let group = self.launcher.cancel_token().child_token();
        let renderer_stop = CancellationToken::new();
        let renderer = (self.launcher.mode() == RunMode::Attended).then(|| {
            let table = ProgressTable::new(dependencies.iter().map(|service| service.name()));
            tokio::spawn(render_live(
                table,
                self.launcher.progress().subscribe(),
                renderer_stop.clone(),
            ))
        });

        let policy = PollPolicy::dependency(&self.launcher.config().bringup);
        let mut tasks = JoinSet::new();
        for service in dependencies {
            let name = service.name().to_owned();
            let run = self.launcher.bring_up(service, policy, group.clone());
            tasks.spawn(async move { (name, run.run().await) });
        }

        let mut failure: Option<(String, BringUpError)> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(outcome))) => report.record(&name, outcome),
                Ok((name, Err(err))) => {
                    if failure.is_none() {
                        if err.is_interrupted() {
                            debug!(service = %name, "dependency interrupted");
                        } else {
                            error!(service = %name, error = %err, "dependency failed; cancelling siblings");
                        }
                        group.cancel();
                        failure = Some((name, err));
                    } else {
                        debug!(service = %name, error = %err, "sibling ended after cancellation");
                    }
                }
                Err(join_err) => {
                    group.cancel();
                    if join_err.is_panic() {
                        std::panic::resume_unwind(join_err.into_panic());
                    }
                    warn!(error = %join_err, "dependency task cancelled");
                }
            }
        }

        renderer_stop.cancel();
        if let Some(renderer) = renderer {
            let _ = renderer.await;
        }

        match failure {
            None => Ok(()),
            Some(_) if self.launcher.cancel_token().is_cancelled() => Err(SequenceError::Interrupted),
            Some((service, source)) => Err(SequenceError::Dependency { service, source }),
        }
    }

    fn spawn_control(
        &self,
        proxy: Option<RpcParams>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<(), ControlError>> {
        let control = self.control.clone();
        let handler: Arc<dyn ControlHandler> = self.launcher.clone();
        tokio::spawn(async move { control.attach(proxy, handler, cancel).await })
    }

    /// Cancel the control task and let it finish its close handshake. It is
    /// aborted only if the handshake overruns its timeout.
    async fn detach(
        &self,
        mut control: JoinHandle<Result<(), ControlError>>,
        control_cancel: &CancellationToken,
    ) {
        control_cancel.cancel();
        let limit = self.launcher.config().control.close_timeout + CONTROL_DETACH_GRACE;
        match tokio::time::timeout(limit, &mut control).await {
            Ok(Ok(Ok(()))) | Ok(Ok(Err(ControlError::Interrupted))) => {
                debug!("control channel detached")
            }
            Ok(Ok(Err(err))) => debug!(error = %err, "control channel ended with error"),
            Ok(Err(join_err)) => warn!(error = %join_err, "control channel task failed"),
            Err(_) => {
                warn!(limit = ?limit, "control channel did not close in time; aborting");
                control.abort();
            }
        }
    }

    async fn finish(
        &self,
        control: JoinHandle<Result<(), ControlError>>,
        control_cancel: CancellationToken,
    ) -> Result<(), SequenceError> {
        match self.launcher.mode() {
            RunMode::Attended => {
                let handed_off = self.console.hand_off().await;
                self.detach(control, &control_cancel).await;
                handed_off.map_err(SequenceError::Console)
            }
            RunMode::Unattended => {
                let proxy = self
                    .launcher
                    .fleet()
                    .first_of(ServiceKind::Proxy)
                    .map(|service| service.name().to_owned())
                    .unwrap_or_else(|| "proxy".to_owned());
                println!("Attached to {}. Press Ctrl-C to detach from it.", proxy);
                match control.await {
                    Ok(Ok(())) => {}
                    Ok(Err(ControlError::Interrupted)) => {}
                    Ok(Err(err)) => error!(error = %err, "control channel ended with error"),
                    Err(join_err) => warn!(error = %join_err, "control channel task failed"),
                }
                if self.launcher.cancel_token().is_cancelled() {
                    return Err(SequenceError::Interrupted);
                }
                Ok(())
            }
        }
    }
}
