//! ---
//! fleet_section: "03-orchestration"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Bring-up orchestration for the launcher."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
//! Bring-up orchestration.
//!
//! [`status::classify`] turns probe text into a [`StatusClass`], [`ServiceBringUp`]
//! drives one service to a terminal outcome and [`BringupSequencer`] composes
//! those runs into the fleet plan while the control channel is served.

pub mod bringup;
pub mod progress;
pub mod remediation;
pub mod sequencer;
pub mod session;
pub mod status;

pub use bringup::{Acceptance, BringUpError, BringUpOutcome, PollPolicy, ServiceBringUp};
pub use progress::{ProgressFeed, ProgressTable, ProgressUpdate};
pub use remediation::{Remediation, RemediationVerdict, WalletRemediation};
pub use sequencer::{
    BringupSequencer, Console, ControlAttachment, SequenceError, SequenceReport,
    WebsocketAttachment,
};
pub use session::{BringupSession, Launcher, RunMode};
pub use status::{classify, Observation, StatusClass};
