//! ---
//! fleet_section: "02-service-adapters"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Error types raised by service handles and wallet collaborators."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::time::Duration;

/// Failures of lifecycle calls and status probes.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error("`{command}` failed with exit code {code:?}: {output}")]
    Command {
        command: String,
        code: Option<i32>,
        output: String,
    },
    #[error("command \"{command}\" exits with non-zero code {code}: {output}")]
    Exec {
        command: String,
        code: i32,
        output: String,
    },
    #[error("status probe timed out after {0:?}")]
    ProbeTimeout(Duration),
    #[error("unexpected probe output: {0}")]
    Probe(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ServiceError {
    fn from(err: serde_yaml::Error) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}

/// Failures of wallet create/unlock calls.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("password is incorrect")]
    IncorrectPassword,
    #[error("[http {status}] {message}")]
    Api { status: u16, message: String },
    #[error("wallet request failed: {0}")]
    Transport(String),
    #[error("wallet command exited with code {0:?}")]
    Console(Option<i32>),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        WalletError::Transport(err.to_string())
    }
}
