//! # RDMA Sweep Library
//!
//! Drives an external two-endpoint RDMA throughput benchmark across a grid
//! of parameters and keeps the results in an append-only CSV file.
//!
//! Each grid point is a combination of transfer mode, message size, window
//! (outstanding operations) and iteration count. For every point the harness
//! tells the operator which server command to start on the remote host,
//! runs the client locally, parses its one-line summary and records the
//! throughput. Failed points are recorded as missing values so one bad
//! combination does not lose the rest of a sweep.
//!
//! ## Architecture Overview
//!
//! - `parser`: extracts throughput figures from the client's stdout
//! - `process`: runs the client executable and classifies its exit
//! - `coordination`: builds the server command line and waits until the
//!   operator confirms the server is up
//! - `benchmark`: experiment grids and the sweep driver
//! - `results`: the CSV result store
//! - `report`: SVG charts rendered from the store
//! - `menu`: interactive operator menu
//! - `cli`, `config`, `logging`, `utils`: the ambient plumbing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rdma_sweep::{ExperimentKind, OperatorInput, SweepRunner, SweepSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut settings = SweepSettings::default();
//!     settings.assume_server_ready = true;
//!
//!     let mut runner = SweepRunner::from_settings(&settings, OperatorInput::stdin());
//!     let report = runner.run_experiment(ExperimentKind::Baseline, &settings).await?;
//!     println!("{} points, {} failed", report.points, report.failed.len());
//!     Ok(())
//! }
//! ```

/// Experiment grids and the sweep driver
///
/// Turns settings into ordered grids of `ExperimentConfig` values and runs
/// them through a `ClientRunner`, applying the experiment's failure policy.
pub mod benchmark;

/// Command-line interface
pub mod cli;

/// Settings file, command-line overrides and validation
pub mod config;

/// Server command construction and the operator handshake
pub mod coordination;

pub mod logging;

pub mod menu;

/// Client summary line parser
pub mod parser;

/// Benchmark client process runner
pub mod process;

/// Chart rendering from the result store
pub mod report;

/// Append-only CSV result store
pub mod results;

pub mod utils;

pub use benchmark::{ExperimentConfig, ExperimentKind, SweepReport, SweepRunner};
pub use cli::{Args, FailurePolicy, TransferMode};
pub use config::{ConfigError, SweepSettings};
pub use coordination::{AssumeReady, EndpointCoordinator, OperatorInput, OperatorPrompt, ServerCommand};
pub use parser::{parse_client_output, Measurement};
pub use process::{ClientEndpoint, ClientRunner, ProcessClient, RunOutcome};
pub use report::ReportRenderer;
pub use results::{ResultRow, ResultStore};

/// Crate version, recorded in run summaries
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// The experiment grids mirror the sweeps the harness was built around:
/// a large-message baseline, a message-size sweep at a small window, and a
/// window sweep for two small message sizes.
pub mod defaults {
    /// Server address used when none is configured
    pub const SERVER: &str = "127.0.0.1";

    pub const PORT: u16 = 9000;

    pub const CLIENT_BIN: &str = "./bench_client";

    pub const SERVER_BIN: &str = "./bench_server";

    /// Result CSV, appended to across runs
    pub const RESULT_CSV: &str = "rdma_results.csv";

    pub const PLOT_DIR: &str = "plots";

    /// Baseline message size in bytes
    pub const BASELINE_MSG: u64 = 8192;

    pub const BASELINE_WINDOW: u64 = 64;

    pub const BASELINE_ITERS: u64 = 100_000;

    /// Iterations per invocation for both sweeps
    pub const SWEEP_ITERS: u64 = 200_000;

    /// Powers of two from 32 B to 8 KiB
    pub const MSG_SWEEP_SIZES: [u64; 9] = [32, 64, 128, 256, 512, 1024, 2048, 4096, 8192];

    pub const MSG_SWEEP_WINDOW: u64 = 4;

    pub const WINDOW_SWEEP_SIZES: [u64; 2] = [32, 64];

    pub const WINDOW_SWEEP_WINDOWS: [u64; 7] = [1, 2, 4, 8, 16, 32, 64];

    /// Smallest receive queue depth passed to a two-sided server
    pub const RECV_DEPTH_FLOOR: u64 = 256;

    /// Receive depth per outstanding send
    pub const RECV_DEPTH_MULTIPLIER: u64 = 4;
}
