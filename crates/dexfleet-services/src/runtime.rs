//! ---
//! fleet_section: "02-service-adapters"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Container engine collaborator backed by the docker compose CLI."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::ServiceError;

/// Container-level state as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Missing,
    /// Engine state string such as `running`, `exited` or `created`.
    Present(String),
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Present(state) if state == "running")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Combined stdout and stderr.
    pub stdout: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub since: Option<String>,
    pub tail: Option<String>,
    pub follow: bool,
}

/// Calls into the container engine, keyed by service name.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn start(&self, service: &str) -> Result<(), ServiceError>;
    async fn stop(&self, service: &str) -> Result<(), ServiceError>;
    async fn remove(&self, service: &str) -> Result<(), ServiceError>;
    async fn restart(&self, service: &str) -> Result<(), ServiceError>;
    async fn inspect(&self, service: &str) -> Result<ContainerState, ServiceError>;
    /// Run `argv` inside the service container and capture its output.
    async fn exec(&self, service: &str, argv: &[&str]) -> Result<ExecOutput, ServiceError>;
    /// Run `argv` inside the service container attached to the caller's terminal.
    async fn attach(&self, service: &str, argv: &[&str]) -> Result<Option<i32>, ServiceError>;
    async fn logs(
        &self,
        service: &str,
        options: &LogOptions,
    ) -> Result<BoxStream<'static, Result<String, ServiceError>>, ServiceError>;
}

/// [`ContainerRuntime`] driving `docker compose` for one project.
#[derive(Debug, Clone)]
pub struct ComposeRuntime {
    compose_file: PathBuf,
    project: String,
    program: String,
}

impl ComposeRuntime {
    pub fn new(compose_file: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            compose_file: compose_file.into(),
            project: project.into(),
            program: "docker".to_owned(),
        }
    }

    /// Use another docker-compatible binary (e.g. `podman`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn compose_file(&self) -> &Path {
        &self.compose_file
    }

    fn compose(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("compose")
            .arg("-f")
            .arg(&self.compose_file)
            .arg("-p")
            .arg(&self.project)
            .kill_on_drop(true);
        command
    }

    async fn run(&self, args: &[&str]) -> Result<String, ServiceError> {
        let mut command = self.compose();
        command.args(args).stdin(Stdio::null());
        let rendered = format!("{} compose {}", self.program, args.join(" "));
        debug!(command = %rendered, "running compose command");
        let output = command.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceError::Command {
                command: rendered,
                code: output.status.code(),
                output: stderr.trim().to_owned(),
            });
        }
        Ok(stdout)
    }
}

#[async_trait]
impl ContainerRuntime for ComposeRuntime {
    async fn start(&self, service: &str) -> Result<(), ServiceError> {
        self.run(&["up", "-d", service]).await.map(|_| ())
    }

    async fn stop(&self, service: &str) -> Result<(), ServiceError> {
        self.run(&["stop", service]).await.map(|_| ())
    }

    async fn remove(&self, service: &str) -> Result<(), ServiceError> {
        self.run(&["rm", "-f", service]).await.map(|_| ())
    }

    async fn restart(&self, service: &str) -> Result<(), ServiceError> {
        self.run(&["restart", service]).await.map(|_| ())
    }

    async fn inspect(&self, service: &str) -> Result<ContainerState, ServiceError> {
        let ids = self.run(&["ps", "-a", "-q", service]).await?;
        let Some(id) = ids.lines().map(str::trim).find(|line| !line.is_empty()) else {
            return Ok(ContainerState::Missing);
        };

        let output = Command::new(&self.program)
            .args(["inspect", "-f", "{{.State.Status}}", id])
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such container") || stderr.contains("No such object") {
                return Ok(ContainerState::Missing);
            }
            return Err(ServiceError::Command {
                command: format!("{} inspect {}", self.program, id),
                code: output.status.code(),
                output: stderr.trim().to_owned(),
            });
        }
        let state = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        Ok(ContainerState::Present(state))
    }

    async fn exec(&self, service: &str, argv: &[&str]) -> Result<ExecOutput, ServiceError> {
        let mut command = self.compose();
        command
            .args(["exec", "-T", service])
            .args(argv)
            .stdin(Stdio::null());
        let output = command.output().await?;
        let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        stdout.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ExecOutput {
            stdout,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn attach(&self, service: &str, argv: &[&str]) -> Result<Option<i32>, ServiceError> {
        let mut command = self.compose();
        command
            .args(["exec", service])
            .args(argv)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        let status = command.status().await?;
        Ok(status.code())
    }

    async fn logs(
        &self,
        service: &str,
        options: &LogOptions,
    ) -> Result<BoxStream<'static, Result<String, ServiceError>>, ServiceError> {
        let mut command = self.compose();
        command.args(["logs", "--no-color", "--no-log-prefix"]);
        if let Some(since) = &options.since {
            command.arg("--since").arg(since);
        }
        if let Some(tail) = &options.tail {
            command.arg("--tail").arg(tail);
        }
        if options.follow {
            command.arg("--follow");
        }
        command
            .arg(service)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ServiceError::Probe("log stream has no stdout".to_owned()))?;

        let (tx, rx) = mpsc::channel(256);
        let service = service.to_owned();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(Ok(line)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let _ = tx.send(Err(ServiceError::Io(err))).await;
                        break;
                    }
                }
            }
            if let Err(err) = child.kill().await {
                warn!(service = %service, error = %err, "failed to stop log follower");
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}
