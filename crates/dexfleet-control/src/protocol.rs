//! ---
//! fleet_section: "04-networking-external-interfaces"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Wire format of control requests and responses."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Inbound request frame: `{"id": u64, "method": string, "params": [string]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Vec<String>,
}

/// Outbound response frame. Exactly one of `result` and `error` is set; the other
/// is serialized as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub id: u64,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn result(id: u64, result: impl Into<String>) -> Self {
        Self {
            id,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn error(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletsInfo {
    pub default_password: bool,
    pub mnemonic_shown: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub location: String,
    pub default_location: bool,
}

/// Snapshot returned by `getinfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub wallets: WalletsInfo,
    pub backup: BackupInfo,
}

impl SessionInfo {
    /// The mnemonic counts as shown once the operator replaced the default password.
    pub fn new(default_password: bool, location: impl Into<String>, default_location: bool) -> Self {
        Self {
            wallets: WalletsInfo {
                default_password,
                mnemonic_shown: !default_password,
            },
            backup: BackupInfo {
                location: location.into(),
                default_location,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_serializes_both_fields() {
        let text = serde_json::to_string(&ControlResponse::result(3, "ok")).unwrap();
        assert_eq!(text, r#"{"id":3,"result":"ok","error":null}"#);
        let text = serde_json::to_string(&ControlResponse::error(4, "bad")).unwrap();
        assert_eq!(text, r#"{"id":4,"result":null,"error":"bad"}"#);
    }

    #[test]
    fn request_params_default_to_empty() {
        let request: ControlRequest = serde_json::from_str(r#"{"id":1,"method":"getinfo"}"#).unwrap();
        assert!(request.params.is_empty());
    }

    #[test]
    fn session_info_uses_camel_case_keys() {
        let info = SessionInfo::new(true, "/backup", true);
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["wallets"]["defaultPassword"], true);
        assert_eq!(value["wallets"]["mnemonicShown"], false);
        assert_eq!(value["backup"]["defaultLocation"], true);
    }
}
