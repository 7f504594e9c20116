//! ---
//! fleet_section: "04-networking-external-interfaces"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Method dispatch for control requests."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::protocol::{ControlRequest, ControlResponse, SessionInfo};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Launcher-side operations reachable through the control channel.
#[async_trait]
pub trait ControlHandler: Send + Sync {
    /// Current wallet and backup snapshot.
    fn info(&self) -> SessionInfo;

    /// Switch the backup location and re-apply it. `location` was already checked
    /// to be an existing directory.
    async fn backup_to(&self, location: PathBuf) -> Result<(), HandlerError>;
}

/// Answer a single request. Never fails: every problem becomes an error response.
pub async fn dispatch(handler: &dyn ControlHandler, request: ControlRequest) -> ControlResponse {
    let ControlRequest { id, method, params } = request;
    debug!(id, method = %method, params = ?params, "control request");
    match method.as_str() {
        "getinfo" => match serde_json::to_string(&handler.info()) {
            Ok(info) => ControlResponse::result(id, info),
            Err(err) => ControlResponse::error(id, err.to_string()),
        },
        "backupto" => {
            let location = match validate_backup_location(&params) {
                Ok(location) => location,
                Err(message) => return ControlResponse::error(id, message),
            };
            match handler.backup_to(location.clone()).await {
                Ok(()) => {
                    info!(location = %location.display(), "backup location changed");
                    ControlResponse::result(
                        id,
                        format!("Changed backup location to {}", location.display()),
                    )
                }
                Err(err) => {
                    warn!(location = %location.display(), error = %err, "backup location change failed");
                    ControlResponse::error(id, err.to_string())
                }
            }
        }
        other => {
            warn!(id, method = %other, "unknown control method");
            ControlResponse::error(id, format!("unknown method: {}", other))
        }
    }
}

/// Check `backupto` arguments, returning the trimmed location.
pub fn validate_backup_location(params: &[String]) -> Result<PathBuf, String> {
    if params.len() != 1 {
        return Err(format!("unexpected arguments: {}", params.join(", ")));
    }
    let location = params[0].trim();
    if location.is_empty() {
        return Err("empty location".to_owned());
    }
    let path = Path::new(location);
    if !path.exists() {
        return Err(format!("non-existent location: {}", location));
    }
    if !path.is_dir() {
        return Err(format!("location is not a directory: {}", location));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct Recorder {
        calls: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    #[async_trait]
    impl ControlHandler for Recorder {
        fn info(&self) -> SessionInfo {
            SessionInfo::new(false, "/data/backup", false)
        }

        async fn backup_to(&self, location: PathBuf) -> Result<(), HandlerError> {
            self.calls.lock().unwrap().push(location);
            if self.fail {
                return Err("generate descriptors: disk full".into());
            }
            Ok(())
        }
    }

    fn request(id: u64, method: &str, params: &[&str]) -> ControlRequest {
        ControlRequest {
            id,
            method: method.to_owned(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn recorder(fail: bool) -> Recorder {
        Recorder {
            calls: Mutex::new(Vec::new()),
            fail,
        }
    }

    #[test]
    fn backup_argument_validation() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        assert_eq!(
            validate_backup_location(&["a".to_owned(), "b".to_owned()]).unwrap_err(),
            "unexpected arguments: a, b"
        );
        assert_eq!(
            validate_backup_location(&[]).unwrap_err(),
            "unexpected arguments: "
        );
        assert_eq!(
            validate_backup_location(&["   ".to_owned()]).unwrap_err(),
            "empty location"
        );
        assert_eq!(
            validate_backup_location(&["/definitely/not/here".to_owned()]).unwrap_err(),
            "non-existent location: /definitely/not/here"
        );
        assert_eq!(
            validate_backup_location(&[file.display().to_string()]).unwrap_err(),
            format!("location is not a directory: {}", file.display())
        );
        let padded = format!("  {}  ", dir.path().display());
        assert_eq!(validate_backup_location(&[padded]).unwrap(), dir.path());
    }

    #[tokio::test]
    async fn unknown_method_is_an_error_response() {
        let handler = recorder(false);
        let response = dispatch(&handler, request(9, "reboot", &[])).await;
        assert_eq!(response, ControlResponse::error(9, "unknown method: reboot"));
    }

    #[tokio::test]
    async fn backupto_reports_handler_failure() {
        let dir = tempdir().unwrap();
        let handler = recorder(true);
        let location = dir.path().display().to_string();
        let response = dispatch(&handler, request(2, "backupto", &[&location])).await;
        assert_eq!(
            response.error.as_deref(),
            Some("generate descriptors: disk full")
        );
        assert_eq!(handler.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn backupto_success_names_location() {
        let dir = tempdir().unwrap();
        let handler = recorder(false);
        let location = dir.path().display().to_string();
        let response = dispatch(&handler, request(3, "backupto", &[&location])).await;
        assert_eq!(
            response.result,
            Some(format!("Changed backup location to {}", location))
        );
        assert!(response.error.is_none());
    }
}
