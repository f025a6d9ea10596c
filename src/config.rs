//! # Sweep Settings
//!
//! Every knob of a sweep lives in [`SweepSettings`]: endpoint locations,
//! grid lists per experiment, iteration counts, the server receive-depth
//! policy and failure handling. Settings are layered in three steps:
//!
//! 1. Built-in defaults ([`SweepSettings::default`])
//! 2. An optional JSON file (`--config`); missing fields keep their defaults
//! 3. Command-line flags
//!
//! The result is validated once, before any benchmark process is launched.

use crate::cli::{Args, Command, FailurePolicy, TransferMode};
use crate::coordination::RecvDepthPolicy;
use crate::defaults;
use crate::utils::{validate_iterations, validate_message_size, validate_port, validate_window};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Invalid configuration detected before any process is started.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown transfer mode '{0}' (expected write, read or send)")]
    UnknownMode(String),

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("message size {0} exceeds the 1 GiB limit")]
    MessageTooLarge(u64),

    #[error("port {0} is too low (below 1024)")]
    PrivilegedPort(u16),

    #[error("experiment tag '{0}' must be non-empty and contain no commas, quotes or line breaks")]
    InvalidTag(String),

    #[error("{0} list must not be empty")]
    EmptyList(&'static str),

    #[error("client timeout of {0} seconds is not a representable duration")]
    TimeoutOutOfRange(f64),
}

/// Single large-message point per mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineSettings {
    pub msg: u64,
    pub window: u64,
    pub iters: u64,
}

impl Default for BaselineSettings {
    fn default() -> Self {
        Self {
            msg: defaults::BASELINE_MSG,
            window: defaults::BASELINE_WINDOW,
            iters: defaults::BASELINE_ITERS,
        }
    }
}

/// Message sizes swept at one fixed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsgSweepSettings {
    pub msg_sizes: Vec<u64>,
    pub window: u64,
    pub iters: u64,
}

impl Default for MsgSweepSettings {
    fn default() -> Self {
        Self {
            msg_sizes: defaults::MSG_SWEEP_SIZES.to_vec(),
            window: defaults::MSG_SWEEP_WINDOW,
            iters: defaults::SWEEP_ITERS,
        }
    }
}

/// Windows swept for each of a few small message sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSweepSettings {
    pub msg_sizes: Vec<u64>,
    pub windows: Vec<u64>,
    pub iters: u64,
}

impl Default for WindowSweepSettings {
    fn default() -> Self {
        Self {
            msg_sizes: defaults::WINDOW_SWEEP_SIZES.to_vec(),
            windows: defaults::WINDOW_SWEEP_WINDOWS.to_vec(),
            iters: defaults::SWEEP_ITERS,
        }
    }
}

/// Complete configuration handed to the sweep driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub server: String,
    pub port: u16,
    pub client_bin: PathBuf,
    pub server_bin: PathBuf,
    pub output: PathBuf,
    pub plot_dir: PathBuf,
    pub modes: Vec<TransferMode>,
    pub baseline: BaselineSettings,
    pub msg_sweep: MsgSweepSettings,
    pub window_sweep: WindowSweepSettings,
    pub recv_depth: RecvDepthPolicy,
    /// Per-invocation client timeout in seconds
    pub client_timeout_secs: Option<f64>,
    pub assume_server_ready: bool,
    /// Overrides the per-experiment default when set
    pub on_failure: Option<FailurePolicy>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            server: defaults::SERVER.to_string(),
            port: defaults::PORT,
            client_bin: PathBuf::from(defaults::CLIENT_BIN),
            server_bin: PathBuf::from(defaults::SERVER_BIN),
            output: PathBuf::from(defaults::RESULT_CSV),
            plot_dir: PathBuf::from(defaults::PLOT_DIR),
            modes: vec![TransferMode::Write, TransferMode::Send],
            baseline: BaselineSettings::default(),
            msg_sweep: MsgSweepSettings::default(),
            window_sweep: WindowSweepSettings::default(),
            recv_depth: RecvDepthPolicy::default(),
            client_timeout_secs: None,
            assume_server_ready: false,
            on_failure: None,
        }
    }
}

impl SweepSettings {
    /// Load settings from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    /// Build settings from defaults, the optional `--config` file and CLI flags.
    ///
    /// Grid flags (`--msg-sizes`, `--windows`, `--iters`) apply to the
    /// experiment selected by the subcommand; with `all` or the menu they
    /// apply to every experiment that has the corresponding dimension.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut settings = match &args.config {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        settings.apply_args(args);
        settings.validate()?;
        Ok(settings)
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(server) = &args.server {
            self.server = server.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(path) = &args.client_bin {
            self.client_bin = path.clone();
        }
        if let Some(path) = &args.server_bin {
            self.server_bin = path.clone();
        }
        if let Some(path) = &args.output {
            self.output = path.clone();
        }
        if let Some(path) = &args.plot_dir {
            self.plot_dir = path.clone();
        }
        if let Some(modes) = &args.modes {
            self.modes = modes.clone();
        }
        if let Some(timeout) = args.client_timeout {
            self.client_timeout_secs = Some(timeout.as_secs_f64());
        }
        if args.assume_server_ready {
            self.assume_server_ready = true;
        }
        if let Some(policy) = args.on_failure {
            self.on_failure = Some(policy);
        }

        let (baseline, msg_sweep, window_sweep) = match args.command {
            Some(Command::Baseline) => (true, false, false),
            Some(Command::MsgSweep) => (false, true, false),
            Some(Command::WindowSweep) => (false, false, true),
            _ => (true, true, true),
        };

        if let Some(sizes) = &args.msg_sizes {
            if baseline {
                if let Some(&first) = sizes.first() {
                    self.baseline.msg = first;
                }
            }
            if msg_sweep {
                self.msg_sweep.msg_sizes = sizes.clone();
            }
            if window_sweep {
                self.window_sweep.msg_sizes = sizes.clone();
            }
        }
        if let Some(windows) = &args.windows {
            if let Some(&first) = windows.first() {
                if baseline {
                    self.baseline.window = first;
                }
                if msg_sweep {
                    self.msg_sweep.window = first;
                }
            }
            if window_sweep {
                self.window_sweep.windows = windows.clone();
            }
        }
        if let Some(iters) = args.iters {
            if baseline {
                self.baseline.iters = iters;
            }
            if msg_sweep {
                self.msg_sweep.iters = iters;
            }
            if window_sweep {
                self.window_sweep.iters = iters;
            }
        }
    }

    /// Check every value that ends up on a benchmark command line.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_port(self.port)?;
        if self.modes.is_empty() {
            return Err(ConfigError::EmptyList("modes"));
        }

        validate_message_size(self.baseline.msg)?;
        validate_window(self.baseline.window)?;
        validate_iterations(self.baseline.iters)?;

        if self.msg_sweep.msg_sizes.is_empty() {
            return Err(ConfigError::EmptyList("msg_sweep.msg_sizes"));
        }
        for &msg in &self.msg_sweep.msg_sizes {
            validate_message_size(msg)?;
        }
        validate_window(self.msg_sweep.window)?;
        validate_iterations(self.msg_sweep.iters)?;

        if self.window_sweep.msg_sizes.is_empty() {
            return Err(ConfigError::EmptyList("window_sweep.msg_sizes"));
        }
        if self.window_sweep.windows.is_empty() {
            return Err(ConfigError::EmptyList("window_sweep.windows"));
        }
        for &msg in &self.window_sweep.msg_sizes {
            validate_message_size(msg)?;
        }
        for &window in &self.window_sweep.windows {
            validate_window(window)?;
        }
        validate_iterations(self.window_sweep.iters)?;

        if self.recv_depth.multiplier == 0 {
            return Err(ConfigError::NotPositive {
                field: "recv_depth.multiplier",
            });
        }
        if let Some(secs) = self.client_timeout_secs {
            if secs <= 0.0 {
                return Err(ConfigError::NotPositive {
                    field: "client_timeout_secs",
                });
            }
            Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::TimeoutOutOfRange(secs))?;
        }
        Ok(())
    }

    /// Per-invocation client timeout.
    ///
    /// A value that cannot be represented is treated as no timeout;
    /// [`SweepSettings::validate`] rejects such values up front.
    pub fn client_timeout(&self) -> Option<Duration> {
        self.client_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}
