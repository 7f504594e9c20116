//! ---
//! fleet_section: "02-service-adapters"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Managed service handles and their collaborators."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
//! Managed service handles for the dexfleet launcher.
//!
//! [`ServiceHandle`] is the capability contract the orchestrator consumes. The
//! concrete [`ContainerService`] derives its status from a [`ContainerRuntime`]
//! plus a per-role probe, and [`Fleet`] holds every handle in plan order.

pub mod container;
pub mod descriptor;
pub mod error;
pub mod fleet;
pub mod runtime;
pub mod service;
pub mod wallet;

pub use container::{ContainerService, StatusProbe};
pub use descriptor::{recover_backup_dir, ComposeGenerator, DescriptorGenerator};
pub use error::{ServiceError, WalletError};
pub use fleet::Fleet;
pub use runtime::{ComposeRuntime, ContainerRuntime, ContainerState, ExecOutput, LogOptions};
pub use service::{RpcParams, RpcProtocol, ServiceHandle, StatusReport};
pub use wallet::{ConsoleWalletApi, ProxyWalletApi, WalletApi};
