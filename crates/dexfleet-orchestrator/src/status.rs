//! ---
//! fleet_section: "03-orchestration"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Classification of free-form service status text."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::fmt;

use dexfleet_services::StatusReport;

/// Closed taxonomy of status text. Anything unrecognised is [`StatusClass::NotReady`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    ContainerMissing,
    ContainerExited,
    Ready,
    WalletMissing,
    WalletLocked,
    WaitingForChannels,
    NotReady,
}

impl StatusClass {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StatusClass::ContainerMissing | StatusClass::ContainerExited)
    }
}

pub fn classify(status: &str) -> StatusClass {
    match status {
        "Container missing" => StatusClass::ContainerMissing,
        "Container exited" => StatusClass::ContainerExited,
        "Ready" => StatusClass::Ready,
        "Waiting for channels" => StatusClass::WaitingForChannels,
        s if s.starts_with("Wallet missing") => StatusClass::WalletMissing,
        s if s.starts_with("Wallet locked") => StatusClass::WalletLocked,
        _ => StatusClass::NotReady,
    }
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Status(StatusReport),
    ProbeError(String),
}

impl Observation {
    /// Two probe errors in a row count as the same observation.
    pub fn same_as(&self, other: &Observation) -> bool {
        match (self, other) {
            (Observation::Status(a), Observation::Status(b)) => a == b,
            (Observation::ProbeError(_), Observation::ProbeError(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Status(status) => write!(f, "{}", status),
            Observation::ProbeError(err) => write!(f, "probe failed: {}", err),
        }
    }
}
