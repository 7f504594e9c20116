//! ---
//! fleet_section: "01-core-functionality"
//! fleet_subsection: "binary"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Binary entrypoint for the dexfleet launcher."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::{ArgAction, Parser, Subcommand};
use crossterm::tty::IsTty;
use dexfleet_common::{init_tracing, FleetConfig, ServiceKind, VersionInfo};
use dexfleet_control::ControlChannelConfig;
use dexfleet_orchestrator::{
    BringUpOutcome, BringupSequencer, Console, Launcher, ProgressTable, ProgressUpdate, RunMode,
    WebsocketAttachment,
};
use dexfleet_services::{
    recover_backup_dir, ComposeGenerator, ComposeRuntime, ConsoleWalletApi, ContainerRuntime,
    DescriptorGenerator, Fleet, LogOptions, ProxyWalletApi, ServiceError, ServiceHandle,
    WalletApi,
};
use futures::future::join_all;
use futures::StreamExt;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = concat!("dexfleet ", env!("CARGO_PKG_VERSION"), " (", env!("VERGEN_GIT_SHA"), ")"),
    about = "Bring up and control a containerized trading fleet",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Bring the whole fleet up in dependency order")]
    Setup {
        #[arg(long, help = "Never prompt; unlock wallets through the proxy API")]
        unattended: bool,
        #[arg(long, help = "Restart services that stop making progress")]
        rescue: bool,
    },
    #[command(about = "Probe services and print their status")]
    Status {
        #[arg(value_name = "NAME", help = "Services to probe (default: all)")]
        names: Vec<String>,
    },
    #[command(about = "Regenerate the deployment descriptor")]
    Gen,
    #[command(about = "Print logs of a service")]
    Logs {
        name: String,
        #[arg(long, help = "Only logs newer than this timestamp or duration")]
        since: Option<String>,
        #[arg(long, help = "Number of lines from the end of the logs")]
        tail: Option<String>,
        #[arg(short, long, help = "Keep streaming new lines")]
        follow: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", VersionInfo::current().extended());
        return ExitCode::SUCCESS;
    }
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{:#}", err), "launcher failed");
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let loaded = FleetConfig::load(cli.config.as_deref())?;
    let config = loaded.config;
    config.bootstrap_dirs()?;
    let log_path = init_tracing("dexfleet", &config.logging, &config.logs_dir()?)?;
    info!(
        network = %config.network,
        config_path = ?loaded.source,
        log_path = %log_path.display(),
        version = %VersionInfo::current().cli_string(),
        "configuration loaded"
    );

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(ComposeRuntime::new(
        config.compose_file()?,
        config.project_name(),
    ));
    let fleet = Fleet::from_config(&config, runtime.clone()).context("failed to build service handles")?;

    match cli.command.unwrap_or(Commands::Setup {
        unattended: false,
        rescue: false,
    }) {
        Commands::Setup { unattended, rescue } => setup(config, runtime, fleet, unattended, rescue).await,
        Commands::Status { names } => status(&fleet, &names).await,
        Commands::Gen => generate(&config).await,
        Commands::Logs {
            name,
            since,
            tail,
            follow,
        } => {
            fleet.require(&name)?;
            let options = LogOptions {
                since,
                tail,
                follow,
            };
            logs(runtime.as_ref(), &name, &options).await
        }
    }
}

/// Hands the operator's terminal to a shell inside the settlement container.
struct ShellConsole {
    runtime: Arc<dyn ContainerRuntime>,
    service: String,
}

#[async_trait]
impl Console for ShellConsole {
    async fn hand_off(&self) -> Result<(), ServiceError> {
        let code = self.runtime.attach(&self.service, &["bash"]).await?;
        debug!(service = %self.service, exit_code = ?code, "console session ended");
        Ok(())
    }
}

async fn setup(
    mut config: FleetConfig,
    runtime: Arc<dyn ContainerRuntime>,
    fleet: Fleet,
    unattended: bool,
    rescue: bool,
) -> Result<ExitCode> {
    config.bringup.rescue |= rescue;
    let mode = if unattended || !std::io::stdin().is_tty() || !std::io::stdout().is_tty() {
        RunMode::Unattended
    } else {
        RunMode::Attended
    };

    let settlement = fleet
        .first_of(ServiceKind::Settlement)
        .ok_or_else(|| anyhow!("no settlement daemon configured"))?;
    let wallet: Arc<dyn WalletApi> = match mode {
        RunMode::Attended => Arc::new(ConsoleWalletApi::new(runtime.clone(), settlement.name())),
        RunMode::Unattended => {
            let proxy = fleet
                .first_of(ServiceKind::Proxy)
                .and_then(|proxy| proxy.rpc_params())
                .ok_or_else(|| anyhow!("proxy exposes no API endpoint"))?;
            Arc::new(ProxyWalletApi::new(proxy.base_url())?)
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received; cancelling");
            interrupt.cancel();
        }
    });

    let control = WebsocketAttachment::new(ControlChannelConfig {
        path: config.control.path.clone(),
        close_timeout: config.control.close_timeout,
    });
    let console = ShellConsole {
        runtime: runtime.clone(),
        service: settlement.name().to_owned(),
    };
    let launcher = Arc::new(Launcher::new(
        config,
        fleet,
        Arc::new(ComposeGenerator::new()),
        wallet,
        mode,
        cancel,
    )?);
    info!(mode = ?mode, backup_dir = %launcher.backup_dir().display(), "starting fleet bring-up");

    let sequencer = BringupSequencer::new(launcher, Arc::new(control), Arc::new(console));
    match sequencer.run().await {
        Ok(report) => {
            for (service, outcome) in &report.outcomes {
                if let BringUpOutcome::AcceptedWithCaveat { status, caveat } = outcome {
                    println!("{}: {} ({})", service, status, caveat);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_interrupted() => {
            debug!(error = %err, "bring-up interrupted");
            println!("Interrupted.");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(err) => {
            error!(error = %err, "bring-up failed");
            eprintln!("Failed to bring up the fleet: {}", err);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn status(fleet: &Fleet, names: &[String]) -> Result<ExitCode> {
    let services: Vec<Arc<dyn ServiceHandle>> = if names.is_empty() {
        fleet.iter().cloned().collect()
    } else {
        names
            .iter()
            .map(|name| fleet.require(name).cloned())
            .collect::<Result<_, _>>()?
    };

    let probes = services.iter().map(|service| async move {
        let status = if service.is_disabled() {
            "Disabled".to_owned()
        } else {
            match service.status().await {
                Ok(status) => status.into_inner(),
                Err(err) => {
                    warn!(service = %service.name(), error = %err, "status probe failed");
                    format!("probe failed: {}", err)
                }
            }
        };
        ProgressUpdate {
            service: service.name().to_owned(),
            status,
        }
    });
    let updates = join_all(probes).await;

    let mut table = ProgressTable::new(services.iter().map(|service| service.name()));
    for update in updates {
        table.apply(update);
    }
    table.render(&mut std::io::stdout())?;
    Ok(ExitCode::SUCCESS)
}

async fn generate(config: &FleetConfig) -> Result<ExitCode> {
    let compose_file = config.compose_file()?;
    let backup_dir = match &config.backup_dir {
        Some(dir) => dir.clone(),
        None => match recover_backup_dir(&compose_file) {
            Some(dir) => dir,
            None => config.default_backup_dir()?,
        },
    };
    let written = ComposeGenerator::new()
        .generate(config, &backup_dir)
        .await
        .context("failed to generate deployment descriptor")?;
    println!("{}", written.display());
    Ok(ExitCode::SUCCESS)
}

async fn logs(runtime: &dyn ContainerRuntime, name: &str, options: &LogOptions) -> Result<ExitCode> {
    let mut lines = runtime.logs(name, options).await?;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => return Ok(ExitCode::from(EXIT_INTERRUPTED)),
            line = lines.next() => match line {
                Some(line) => println!("{}", line?),
                None => return Ok(ExitCode::SUCCESS),
            },
        }
    }
}
