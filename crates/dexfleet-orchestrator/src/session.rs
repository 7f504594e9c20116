//! ---
//! fleet_section: "03-orchestration"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Launcher context shared by the sequencer and the control channel."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dexfleet_common::{FleetConfig, ServiceKind};
use dexfleet_control::{ControlHandler, HandlerError, SessionInfo};
use dexfleet_services::{
    recover_backup_dir, DescriptorGenerator, Fleet, ServiceError, ServiceHandle, WalletApi,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bringup::{BringUpError, BringUpOutcome, PollPolicy, ServiceBringUp};
use crate::progress::ProgressFeed;
use crate::remediation::WalletRemediation;
use crate::sequencer::SequenceError;

/// Whether an operator terminal is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Attended,
    Unattended,
}

/// Per-process context: configuration, service handles, collaborators and the
/// only mutable shared state, the backup location.
pub struct Launcher {
    config: FleetConfig,
    fleet: Fleet,
    generator: Arc<dyn DescriptorGenerator>,
    wallet: Arc<WalletRemediation>,
    backup_dir: Mutex<PathBuf>,
    default_backup_dir: PathBuf,
    mode: RunMode,
    progress: ProgressFeed,
    cancel: CancellationToken,
    session_active: AtomicBool,
}

/// Marks the single active bring-up of a [`Launcher`]. Released on drop.
pub struct BringupSession {
    launcher: Arc<Launcher>,
}

impl BringupSession {
    pub fn launcher(&self) -> &Arc<Launcher> {
        &self.launcher
    }
}

impl Drop for BringupSession {
    fn drop(&mut self) {
        self.launcher.session_active.store(false, Ordering::SeqCst);
    }
}

impl Launcher {
    /// The backup location comes from the config, then from a previously
    /// generated descriptor, falling back to `<network_dir>/backup`.
    pub fn new(
        config: FleetConfig,
        fleet: Fleet,
        generator: Arc<dyn DescriptorGenerator>,
        wallet_api: Arc<dyn WalletApi>,
        mode: RunMode,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let default_backup_dir = config.default_backup_dir()?;
        let backup_dir = match &config.backup_dir {
            Some(dir) => dir.clone(),
            None => config
                .compose_file()
                .ok()
                .and_then(|path| recover_backup_dir(&path))
                .unwrap_or_else(|| default_backup_dir.clone()),
        };
        let wallet = Arc::new(WalletRemediation::new(
            wallet_api,
            config.wallet.default_password.clone(),
            config.password_marker()?,
            config.bringup.remediation_cooldown,
        ));
        Ok(Self {
            config,
            fleet,
            generator,
            wallet,
            backup_dir: Mutex::new(backup_dir),
            default_backup_dir,
            mode,
            progress: ProgressFeed::default(),
            cancel,
            session_active: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn progress(&self) -> &ProgressFeed {
        &self.progress
    }

    /// Process-wide cancellation, fired on interrupt.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir.lock().clone()
    }

    pub fn default_backup_dir(&self) -> &Path {
        &self.default_backup_dir
    }

    pub fn using_default_password(&self) -> bool {
        self.wallet.using_default_password()
    }

    /// Start the single bring-up session. Fails while another one is active.
    pub fn begin(self: &Arc<Self>) -> Result<BringupSession, SequenceError> {
        if self
            .session_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SequenceError::AlreadyRunning);
        }
        Ok(BringupSession {
            launcher: Arc::clone(self),
        })
    }

    pub async fn generate_descriptors(&self, backup_dir: &Path) -> Result<PathBuf, ServiceError> {
        self.generator.generate(&self.config, backup_dir).await
    }

    /// Bring-up run for `service` with the acceptance and remediation its role needs.
    pub fn bring_up(
        &self,
        service: Arc<dyn ServiceHandle>,
        policy: PollPolicy,
        cancel: CancellationToken,
    ) -> ServiceBringUp {
        let kind = service.kind();
        let run = ServiceBringUp::new(service, policy, cancel).with_progress(self.progress.clone());
        if kind == ServiceKind::Settlement {
            run.with_remediation(self.wallet.clone())
        } else {
            run
        }
    }

    /// Bring the settlement daemon up, creating or unlocking its wallet on the way.
    pub async fn up_settlement(&self) -> Result<BringUpOutcome, BringUpError> {
        let settlement = self
            .fleet
            .first_of(ServiceKind::Settlement)
            .ok_or_else(|| BringUpError::Lifecycle {
                service: "settlement".to_owned(),
                operation: "lookup",
                source: ServiceError::UnknownService("settlement".to_owned()),
            })?;
        self.bring_up(
            settlement,
            PollPolicy::fleet(&self.config.bringup),
            self.cancel.clone(),
        )
        .run()
        .await
    }
}

#[async_trait]
impl ControlHandler for Launcher {
    fn info(&self) -> SessionInfo {
        let location = self.backup_dir();
        SessionInfo::new(
            self.using_default_password(),
            location.display().to_string(),
            location == self.default_backup_dir,
        )
    }

    async fn backup_to(&self, location: PathBuf) -> Result<(), HandlerError> {
        let previous = std::mem::replace(&mut *self.backup_dir.lock(), location.clone());
        if let Err(err) = self.generate_descriptors(&location).await {
            warn!(location = %location.display(), error = %err, "restoring previous backup location");
            *self.backup_dir.lock() = previous;
            return Err(Box::new(err));
        }
        info!(location = %location.display(), "re-applying settlement daemon with new backup location");
        self.up_settlement().await.map_err(|err| Box::new(err) as HandlerError)?;
        Ok(())
    }
}
