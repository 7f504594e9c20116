//! ---
//! fleet_section: "05-testing-qa"
//! fleet_subsection: "test"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Configuration loading tests for dexfleet-common."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::fs;
use std::time::Duration;

use dexfleet_common::{FleetConfig, Network, ServiceKind};
use tempfile::tempdir;

#[test]
fn explicit_path_is_loaded_and_validated() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("dexfleet.toml");
    fs::write(
        &path,
        format!(
            r#"
network = "simnet"
network_dir = "{}"

[bringup]
stuck_threshold = 5
remediation_cooldown = 1

[control]
close_timeout_ms = 250
"#,
            dir.path().display()
        ),
    )
    .expect("write config");

    let loaded = FleetConfig::load(Some(&path)).expect("config loads");
    assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
    let config = loaded.config;
    assert_eq!(config.network, Network::Simnet);
    assert_eq!(config.bringup.stuck_threshold, 5);
    assert_eq!(config.bringup.remediation_cooldown, Duration::from_secs(1));
    assert_eq!(config.control.close_timeout, Duration::from_millis(250));
    assert_eq!(config.control.path, "/launcher");
    assert_eq!(config.services_of(ServiceKind::LightClient), vec!["lndbtc", "lndltc"]);
}

#[test]
fn bootstrap_migrates_legacy_password_marker() {
    let dir = tempdir().expect("tempdir");
    let mut config = FleetConfig::for_network(Network::Testnet);
    config.network_dir = Some(dir.path().to_path_buf());
    fs::write(dir.path().join(".default-password"), b"").expect("legacy marker");

    config.bootstrap_dirs().expect("bootstrap");

    assert!(!dir.path().join(".default-password").exists());
    assert!(config.password_marker().unwrap().exists());
    assert!(config.data_dir().unwrap().is_dir());
    assert!(config.logs_dir().unwrap().is_dir());
}

#[test]
fn unreadable_path_reports_context() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("absent.toml");
    let err = FleetConfig::load(Some(&missing)).expect_err("missing file");
    assert!(format!("{:#}", err).contains("unable to read config file"));
}
