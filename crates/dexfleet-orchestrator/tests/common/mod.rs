//! ---
//! fleet_section: "05-testing-qa"
//! fleet_subsection: "test"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Scripted service, wallet and collaborator doubles."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dexfleet_common::{FleetConfig, Network, ServiceKind};
use dexfleet_control::{ControlError, ControlHandler};
use dexfleet_orchestrator::{Console, ControlAttachment};
use dexfleet_services::{
    DescriptorGenerator, RpcParams, RpcProtocol, ServiceError, ServiceHandle, StatusReport,
    WalletApi, WalletError,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Service whose status calls replay a script; the last entry repeats forever.
/// `Err` entries are failed status calls.
pub struct ScriptedService {
    name: String,
    kind: ServiceKind,
    disabled: bool,
    data_dir: PathBuf,
    script: Mutex<VecDeque<Result<String, String>>>,
    rescues: Mutex<VecDeque<bool>>,
    running: AtomicBool,
    fail_up: bool,
    delay: Duration,
    pub ups: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub stops: AtomicUsize,
    pub removes: AtomicUsize,
    pub rescue_calls: AtomicUsize,
}

impl ScriptedService {
    pub fn new(name: &str, kind: ServiceKind, script: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            disabled: false,
            data_dir: PathBuf::from("/tmp").join(name),
            script: Mutex::new(script.iter().map(|s| Ok(s.to_string())).collect()),
            rescues: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            fail_up: false,
            delay: Duration::ZERO,
            ups: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            rescue_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_script(self, script: Vec<Result<String, String>>) -> Self {
        *self.script.lock() = script.into_iter().collect();
        self
    }

    pub fn disabled(mut self, running: bool) -> Self {
        self.disabled = true;
        self.running.store(running, Ordering::SeqCst);
        self
    }

    pub fn failing_up(mut self) -> Self {
        self.fail_up = true;
        self
    }

    /// Every status call takes `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_rescues(self, results: &[bool]) -> Self {
        *self.rescues.lock() = results.iter().copied().collect();
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn ups(&self) -> usize {
        self.ups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceHandle for ScriptedService {
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
        self.ups.fetch_add(1, Ordering::SeqCst);
        if self.fail_up {
            return Err(ServiceError::Command {
                command: "docker compose up -d".into(),
                code: Some(1),
                output: "no such image".into(),
            });
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self) -> Result<(), ServiceError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self) -> Result<StatusReport, ServiceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut script = self.script.lock();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match next.unwrap_or_else(|| Ok(String::new())) {
            Ok(text) => Ok(StatusReport::new(text)),
            Err(err) => Err(ServiceError::Probe(err)),
        }
    }

    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn rescue(&self) -> bool {
        self.rescue_calls.fetch_add(1, Ordering::SeqCst);
        self.rescues.lock().pop_front().unwrap_or(false)
    }

    fn rpc_params(&self) -> Option<RpcParams> {
        (self.kind == ServiceKind::Proxy)
            .then(|| RpcParams::new(RpcProtocol::Rest, "127.0.0.1", 28889))
    }
}

pub enum UnlockBehaviour {
    Succeed,
    IncorrectPassword,
}

pub struct ScriptedWallet {
    pub creates: AtomicUsize,
    pub unlocks: AtomicUsize,
    unlock: UnlockBehaviour,
}

impl ScriptedWallet {
    pub fn new(unlock: UnlockBehaviour) -> Self {
        Self {
            creates: AtomicUsize::new(0),
            unlocks: AtomicUsize::new(0),
            unlock,
        }
    }
}

#[async_trait]
impl WalletApi for ScriptedWallet {
    async fn create(&self, _password: &str) -> Result<(), WalletError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unlock(&self, _password: &str) -> Result<(), WalletError> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        match self.unlock {
            UnlockBehaviour::Succeed => Ok(()),
            UnlockBehaviour::IncorrectPassword => Err(WalletError::IncorrectPassword),
        }
    }
}

#[derive(Default)]
pub struct RecordingGenerator {
    pub calls: Mutex<Vec<PathBuf>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl DescriptorGenerator for RecordingGenerator {
    async fn generate(
        &self,
        _config: &FleetConfig,
        backup_dir: &Path,
    ) -> Result<PathBuf, ServiceError> {
        self.calls.lock().push(backup_dir.to_path_buf());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Serialization("disk full".into()));
        }
        Ok(PathBuf::from("/tmp/docker-compose.yml"))
    }
}

#[derive(Default)]
pub struct RecordingControl {
    pub attached: Mutex<Option<RpcParams>>,
}

#[async_trait]
impl ControlAttachment for RecordingControl {
    async fn attach(
        &self,
        proxy: Option<RpcParams>,
        _handler: Arc<dyn ControlHandler>,
        _cancel: CancellationToken,
    ) -> Result<(), ControlError> {
        *self.attached.lock() = proxy;
        Ok(())
    }
}

/// Holds the channel open until cancelled, then spends `close_time` closing it.
pub struct ClosingControl {
    close_time: Duration,
    pub attached: AtomicBool,
    pub closed: AtomicBool,
}

impl ClosingControl {
    pub fn new(close_time: Duration) -> Self {
        Self {
            close_time,
            attached: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlAttachment for ClosingControl {
    async fn attach(
        &self,
        _proxy: Option<RpcParams>,
        _handler: Arc<dyn ControlHandler>,
        cancel: CancellationToken,
    ) -> Result<(), ControlError> {
        self.attached.store(true, Ordering::SeqCst);
        cancel.cancelled().await;
        tokio::time::sleep(self.close_time).await;
        self.closed.store(true, Ordering::SeqCst);
        Err(ControlError::Interrupted)
    }
}

#[derive(Default)]
pub struct CountingConsole {
    pub hand_offs: AtomicUsize,
}

#[async_trait]
impl Console for CountingConsole {
    async fn hand_off(&self) -> Result<(), ServiceError> {
        self.hand_offs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Simnet config rooted in `dir` with millisecond polling.
pub fn fast_config(dir: &Path) -> FleetConfig {
    let mut config = FleetConfig::for_network(Network::Simnet);
    config.network_dir = Some(dir.to_path_buf());
    config.bringup.poll_interval = Duration::from_millis(5);
    config.bringup.dependency_poll_interval = Duration::from_millis(5);
    config.bringup.stuck_threshold = 1000;
    config
}
