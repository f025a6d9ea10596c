//! # Endpoint Coordination Module
//!
//! The benchmark client and server are independent processes, usually on
//! different hosts, with no orchestration channel between them. Before each
//! grid point the server has to be (re)started with a matching configuration,
//! and the client may only be launched once it is listening.
//!
//! ```text
//! ┌─────────────────────┐   server command   ┌─────────────────────┐
//! │ EndpointCoordinator │ ─────────────────► │ ReadySignal         │
//! │  - builds server    │                    │  - OperatorPrompt   │
//! │    command line     │ ◄───────────────── │  - AssumeReady      │
//! └─────────────────────┘      "ready"       └─────────────────────┘
//! ```
//!
//! The coordinator never starts the server itself. It computes the exact
//! command, hands it to a [`ReadySignal`] and blocks until that signal
//! reports readiness. The interactive implementation waits for the operator
//! to press ENTER, with no timeout.

use crate::benchmark::ExperimentConfig;
use crate::cli::TransferMode;
use crate::utils::render_command_line;
use anyhow::{anyhow, Context, Result};
use colored::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Sizing rule for the server receive queue in two-sided mode.
///
/// The server must have at least as many receives posted as the client can
/// have sends outstanding, otherwise the client hits receiver-not-ready
/// retries. Depth is `max(floor, window * multiplier)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecvDepthPolicy {
    pub floor: u64,
    pub multiplier: u64,
}

impl Default for RecvDepthPolicy {
    fn default() -> Self {
        Self {
            floor: crate::defaults::RECV_DEPTH_FLOOR,
            multiplier: crate::defaults::RECV_DEPTH_MULTIPLIER,
        }
    }
}

impl RecvDepthPolicy {
    /// Receive depth for a client keeping `window` sends outstanding
    pub fn depth_for(&self, window: u64) -> u64 {
        self.floor.max(window.saturating_mul(self.multiplier))
    }
}

/// Server command line matching one grid point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub executable: PathBuf,
    pub port: u16,
    pub mode: TransferMode,
    pub message_size: u64,
    pub iterations: u64,
    /// Only set for two-sided modes
    pub recv_depth: Option<u64>,
}

impl ServerCommand {
    /// Server command for `config`.
    ///
    /// `recv_depth` is only set for two-sided modes; one-sided servers take
    /// no receive-depth argument.
    pub fn for_config(
        executable: &Path,
        port: u16,
        config: &ExperimentConfig,
        policy: &RecvDepthPolicy,
    ) -> Self {
        let recv_depth = if config.mode().is_two_sided() {
            Some(policy.depth_for(config.window()))
        } else {
            None
        };
        Self {
            executable: executable.to_path_buf(),
            port,
            mode: config.mode(),
            message_size: config.message_size(),
            iterations: config.iteration_count(),
            recv_depth,
        }
    }

    /// `[executable, port, --mode, m, --msg, n, --iters, k, (--recv-depth, d)]`
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![
            self.executable.to_string_lossy().into_owned(),
            self.port.to_string(),
            "--mode".to_string(),
            self.mode.to_string(),
            "--msg".to_string(),
            self.message_size.to_string(),
            "--iters".to_string(),
            self.iterations.to_string(),
        ];
        if let Some(depth) = self.recv_depth {
            argv.push("--recv-depth".to_string());
            argv.push(depth.to_string());
        }
        argv
    }
}

impl std::fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&render_command_line(&self.argv()))
    }
}

/// Source of the "server is listening" acknowledgement.
///
/// Implementations may block for as long as they need; the sweep does
/// nothing else while waiting.
#[async_trait::async_trait]
pub trait ReadySignal: Send {
    async fn wait_ready(&mut self, command: &ServerCommand) -> Result<()>;
}

/// Line-oriented operator input shared between the menu and the prompt.
///
/// Both read from the same buffered stream so that lines typed (or piped)
/// ahead of time are consumed in order.
#[derive(Clone)]
pub struct OperatorInput {
    reader: Arc<Mutex<Pin<Box<dyn AsyncBufRead + Send>>>>,
}

impl OperatorInput {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Send + 'static,
    {
        Self {
            reader: Arc::new(Mutex::new(Box::pin(reader))),
        }
    }

    /// Operator terminal
    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()))
    }

    /// Read one line without its terminator; `None` at end of input.
    pub async fn read_line(&self) -> Result<Option<String>> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        let read = reader
            .as_mut()
            .read_line(&mut line)
            .await
            .context("Failed to read operator input")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
    }
}

/// Interactive handshake: print the server command and wait for ENTER.
pub struct OperatorPrompt {
    input: OperatorInput,
}

impl OperatorPrompt {
    pub fn new(input: OperatorInput) -> Self {
        Self { input }
    }
}

#[async_trait::async_trait]
impl ReadySignal for OperatorPrompt {
    async fn wait_ready(&mut self, command: &ServerCommand) -> Result<()> {
        println!("\n========================================");
        println!("{}", "On the SERVER machine run:".bold());
        println!("  {}", command.to_string().cyan());
        println!("After the server is ready, press ENTER here to start the client...");

        match self.input.read_line().await? {
            Some(_) => {
                debug!("Operator confirmed server readiness");
                Ok(())
            }
            None => Err(anyhow!(
                "Operator input closed while waiting for server: {}",
                command
            )),
        }
    }
}

/// Non-interactive handshake for externally managed servers.
#[derive(Debug, Default)]
pub struct AssumeReady;

#[async_trait::async_trait]
impl ReadySignal for AssumeReady {
    async fn wait_ready(&mut self, command: &ServerCommand) -> Result<()> {
        info!("Assuming server is ready: {}", command);
        Ok(())
    }
}

/// Makes sure a compatible server is listening before each client run.
pub struct EndpointCoordinator {
    server_bin: PathBuf,
    port: u16,
    recv_depth: RecvDepthPolicy,
    signal: Box<dyn ReadySignal>,
}

impl EndpointCoordinator {
    pub fn new(
        server_bin: PathBuf,
        port: u16,
        recv_depth: RecvDepthPolicy,
        signal: Box<dyn ReadySignal>,
    ) -> Self {
        Self {
            server_bin,
            port,
            recv_depth,
            signal,
        }
    }

    /// Request a server for `config` and block until it is reported ready.
    pub async fn prepare(&mut self, config: &ExperimentConfig) -> Result<ServerCommand> {
        let command = ServerCommand::for_config(&self.server_bin, self.port, config, &self.recv_depth);
        debug!("Server command for {}: {}", config, command);
        self.signal.wait_ready(&command).await?;
        Ok(command)
    }
}
