use crate::config::ConfigError;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// RDMA Sweep - drive a client/server RDMA benchmark across a parameter grid
#[derive(Parser, Debug, Clone, Default)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Experiment to run; without one the interactive menu is shown
    #[clap(subcommand)]
    pub command: Option<Command>,

    /// Address of the host running the benchmark server
    #[clap(long, global = true, help_heading = "Endpoints")]
    pub server: Option<String>,

    /// Port the benchmark server listens on
    #[clap(short = 'p', long, global = true, help_heading = "Endpoints")]
    pub port: Option<u16>,

    /// Path of the benchmark client executable
    #[clap(long, global = true, help_heading = "Endpoints")]
    pub client_bin: Option<PathBuf>,

    /// Path of the benchmark server executable (shown to the operator)
    #[clap(long, global = true, help_heading = "Endpoints")]
    pub server_bin: Option<PathBuf>,

    /// CSV file results are appended to
    #[clap(short = 'o', long, global = true, help_heading = "Output")]
    pub output: Option<PathBuf>,

    /// Directory charts are written to
    #[clap(long, global = true, help_heading = "Output")]
    pub plot_dir: Option<PathBuf>,

    /// Write a JSON summary of the run to this file
    #[clap(long, global = true, help_heading = "Output")]
    pub summary_json: Option<PathBuf>,

    /// JSON settings file; command-line flags take precedence over it
    #[clap(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Transfer modes to run, innermost loop of every grid
    #[clap(short = 'm', long, value_enum, value_delimiter = ',', global = true, help_heading = "Grid")]
    pub modes: Option<Vec<TransferMode>>,

    /// Message sizes in bytes for the selected sweep
    #[clap(short = 's', long, value_delimiter = ',', global = true, help_heading = "Grid")]
    pub msg_sizes: Option<Vec<u64>>,

    /// Window sizes for the window sweep (fixed window for the others)
    #[clap(short = 'w', long, value_delimiter = ',', global = true, help_heading = "Grid")]
    pub windows: Option<Vec<u64>>,

    /// Iterations per client invocation for the selected experiment
    #[clap(short = 'i', long, global = true, help_heading = "Grid")]
    pub iters: Option<u64>,

    /// Kill a client invocation that runs longer than this (e.g. "90s", "5m")
    #[clap(long, value_parser = parse_duration, global = true)]
    pub client_timeout: Option<Duration>,

    /// Do not prompt for server startup; assume servers are managed externally
    #[clap(long, default_value_t = false, global = true)]
    pub assume_server_ready: bool,

    /// What to do when a grid point fails (defaults depend on the experiment)
    #[clap(long, value_enum, global = true)]
    pub on_failure: Option<FailurePolicy>,

    /// Also write plain-text logs to this file
    #[clap(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false, global = true)]
    pub verbose: bool,
}

/// Experiments and actions selectable from the command line
#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Large-message baseline, one point per mode
    Baseline,
    /// Sweep message size at a fixed window
    MsgSweep,
    /// Sweep window size for each message size
    WindowSweep,
    /// Run baseline, message-size sweep and window sweep in order
    All,
    /// Render charts from the existing CSV
    Plot,
    /// Interactive menu (default)
    Menu,
}

/// Benchmark transfer modes understood by client and server
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// One-sided RDMA write
    #[clap(name = "write")]
    Write,

    /// One-sided RDMA read
    #[clap(name = "read")]
    Read,

    /// Two-sided send/receive
    #[clap(name = "send")]
    Send,
}

impl TransferMode {
    /// Token used on the client and server command lines and in the CSV
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::Write => "write",
            TransferMode::Read => "read",
            TransferMode::Send => "send",
        }
    }

    /// Two-sided modes need posted receives on the server
    pub fn is_two_sided(&self) -> bool {
        matches!(self, TransferMode::Send)
    }
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "write" => Ok(TransferMode::Write),
            "read" => Ok(TransferMode::Read),
            "send" => Ok(TransferMode::Send),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Handling of a grid point whose client exits unsuccessfully
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record NaN throughput for the point and continue
    #[clap(name = "record")]
    Record,

    /// Stop the experiment; nothing from it is persisted
    #[clap(name = "abort")]
    Abort,
}

/// Parse duration from string (e.g., "10s", "5m", "1h")
pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if num <= 0.0 {
        return Err(format!("Duration must be positive: {}", s));
    }

    let secs = match unit {
        "ms" => num / 1000.0,
        "s" => num,
        "m" => num * 60.0,
        "h" => num * 3600.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    // Rejects infinity and values beyond Duration::MAX instead of panicking
    Duration::try_from_secs_f64(secs).map_err(|_| format!("Duration out of range: {}", s))
}
