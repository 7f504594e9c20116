//! ---
//! fleet_section: "01-core-functionality"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Shared primitives for the launcher workspace."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
//! Shared primitives for the dexfleet workspace.
//! This crate exposes fleet configuration loading, tracing initialisation and
//! build metadata consumed by every other crate.

pub mod config;
pub mod logging;
pub mod version;

pub use config::{
    BringupConfig, Chain, ControlConfig, FleetConfig, LoadedFleetConfig, LoggingConfig, Network,
    ServiceConfig, ServiceKind, WalletConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use version::VersionInfo;
