//! ---
//! fleet_section: "04-networking-external-interfaces"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Control channel error type."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("invalid control url: {0}")]
    Url(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("connection attempt interrupted")]
    Interrupted,
}
