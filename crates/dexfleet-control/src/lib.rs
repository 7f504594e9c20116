//! ---
//! fleet_section: "04-networking-external-interfaces"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Control channel between the launcher and the fleet proxy."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
//! Control channel served by the launcher over a websocket it opens to the proxy.
//!
//! The proxy forwards operator requests (`getinfo`, `backupto`) as JSON frames;
//! [`serve`] answers each with exactly one response carrying the same id.

pub mod channel;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod tls;

pub use channel::{attach, connect, control_url, serve, ControlChannelConfig};
pub use dispatch::{dispatch, validate_backup_location, ControlHandler, HandlerError};
pub use error::ControlError;
pub use protocol::{BackupInfo, ControlRequest, ControlResponse, SessionInfo, WalletsInfo};
