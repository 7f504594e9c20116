//! ---
//! fleet_section: "01-core-functionality"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Tracing initialisation for launcher binaries."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "DEXFLEET_LOG";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static CONSOLE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Formats accepted for the optional console mirror.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Initialize the tracing subscriber for a launcher process.
///
/// * `DEXFLEET_LOG` overrides the filter, then `RUST_LOG`, defaulting to `debug`.
/// * Events always land as JSON in a daily rolling file under the log directory
///   (`fallback_dir` when the config leaves it unset).
/// * The console mirror writes to stderr so it never interleaves with the
///   progress table on stdout.
///
/// Returns the directory the log file is written to.
pub fn init_tracing(
    process_name: &str,
    config: &LoggingConfig,
    fallback_dir: &Path,
) -> Result<PathBuf> {
    let directory = config
        .directory
        .clone()
        .unwrap_or_else(|| fallback_dir.to_path_buf());
    std::fs::create_dir_all(&directory)
        .with_context(|| format!("unable to create log directory {}", directory.display()))?;
    let prefix = config
        .file_prefix
        .clone()
        .unwrap_or_else(|| process_name.to_owned());

    let file_appender = daily(&directory, format!("{}.log", prefix));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let _ = FILE_GUARD.set(file_guard);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    let console_layer = if config.console {
        let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stderr());
        let _ = CONSOLE_GUARD.set(console_guard);
        let layer = match config.format {
            LogFormat::StructuredJson => fmt::layer()
                .with_target(false)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(console_writer)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_writer(console_writer)
                .boxed(),
        };
        Some(layer)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter_from_env())
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .ok();

    info!(process = %process_name, log_dir = %directory.display(), console = config.console, "tracing initialised");
    Ok(directory)
}

fn filter_from_env() -> EnvFilter {
    let Ok(directive) = std::env::var(LOG_ENV) else {
        return EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    };
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("ignoring {}={:?}: {}", LOG_ENV, directive, err);
        EnvFilter::new("debug")
    })
}
