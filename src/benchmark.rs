//! # Sweep Engine Module
//!
//! Drives the benchmark across a parameter grid, one point at a time.
//!
//! ## Key Components
//!
//! - **ExperimentConfig**: one validated grid point
//! - **ExperimentKind**: baseline, message-size sweep and window sweep grids
//! - **SweepRunner**: executes a grid and persists the batch of rows
//! - **SweepReport**: what happened during one experiment run
//!
//! ## Per-Point Lifecycle
//!
//! ```text
//! Idle ─► for each grid point:
//!           AwaitServer ─► RunClient ─► ParseOrSentinel ─► next point
//!         ─► Done (single batched append to the result store)
//! ```
//!
//! Points run strictly sequentially: both endpoints share one port and the
//! server handshake needs the operator's attention. A client failure is
//! turned into a NaN row or aborts the experiment depending on the
//! [`FailurePolicy`]; a clean exit with unparseable output always aborts.
//! Nothing is written until every point of the experiment has resolved, so an
//! aborted experiment leaves no partial batch behind.

use crate::cli::{FailurePolicy, TransferMode};
use crate::config::{ConfigError, SweepSettings};
use crate::coordination::{AssumeReady, EndpointCoordinator, OperatorInput, OperatorPrompt, ReadySignal};
use crate::process::{ClientEndpoint, ClientRunner, ProcessClient, RunOutcome};
use crate::results::{ResultRow, ResultStore};
use crate::utils::{
    format_throughput, validate_experiment_tag, validate_iterations, validate_message_size,
    validate_window,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// One grid point, validated at construction.
///
/// Deserialization goes through [`ExperimentConfig::new`], so a config read
/// back from a run summary obeys the same limits as one built from settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ExperimentConfigFields")]
pub struct ExperimentConfig {
    experiment: String,
    mode: TransferMode,
    message_size: u64,
    window: u64,
    iteration_count: u64,
}

impl ExperimentConfig {
    pub fn new(
        experiment: impl Into<String>,
        mode: TransferMode,
        message_size: u64,
        window: u64,
        iteration_count: u64,
    ) -> Result<Self, ConfigError> {
        let experiment = experiment.into();
        validate_experiment_tag(&experiment)?;
        validate_message_size(message_size)?;
        validate_window(window)?;
        validate_iterations(iteration_count)?;
        Ok(Self {
            experiment,
            mode,
            message_size,
            window,
            iteration_count,
        })
    }

    /// Tag written to the `experiment` column
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Message size in bytes
    pub fn message_size(&self) -> u64 {
        self.message_size
    }

    /// Outstanding operations the client keeps in flight
    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn iteration_count(&self) -> u64 {
        self.iteration_count
    }
}

/// Unvalidated serialized form of [`ExperimentConfig`]
#[derive(Deserialize)]
struct ExperimentConfigFields {
    experiment: String,
    mode: TransferMode,
    message_size: u64,
    window: u64,
    iteration_count: u64,
}

impl TryFrom<ExperimentConfigFields> for ExperimentConfig {
    type Error = ConfigError;

    fn try_from(fields: ExperimentConfigFields) -> Result<Self, Self::Error> {
        Self::new(
            fields.experiment,
            fields.mode,
            fields.message_size,
            fields.window,
            fields.iteration_count,
        )
    }
}

impl std::fmt::Display for ExperimentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "msg={}, window={}, mode={}",
            self.message_size, self.window, self.mode
        )
    }
}

/// The experiments the harness knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentKind {
    /// One large-message point per mode
    Baseline,
    /// Message sizes at a fixed window
    MsgSweep,
    /// Windows for each message size
    WindowSweep,
}

impl ExperimentKind {
    /// Every experiment, in the order `all` runs them
    pub const ALL: [ExperimentKind; 3] = [
        ExperimentKind::Baseline,
        ExperimentKind::MsgSweep,
        ExperimentKind::WindowSweep,
    ];

    /// Value of the `experiment` column
    pub fn tag(&self) -> &'static str {
        match self {
            ExperimentKind::Baseline => "baseline",
            ExperimentKind::MsgSweep => "msg_sweep",
            ExperimentKind::WindowSweep => "sweep",
        }
    }

    /// Baseline points are expected to succeed; sweeps cover the edges.
    pub fn default_policy(&self) -> FailurePolicy {
        match self {
            ExperimentKind::Baseline => FailurePolicy::Abort,
            ExperimentKind::MsgSweep | ExperimentKind::WindowSweep => FailurePolicy::Record,
        }
    }

    /// One-line description for the menu and experiment banners
    pub fn describe(&self, settings: &SweepSettings) -> String {
        let modes = settings
            .modes
            .iter()
            .map(TransferMode::as_str)
            .collect::<Vec<_>>()
            .join(" vs ");
        match self {
            ExperimentKind::Baseline => format!(
                "Baseline (msg = {}, window = {}) [{}]",
                settings.baseline.msg, settings.baseline.window, modes
            ),
            ExperimentKind::MsgSweep => format!(
                "Fixed window={}, sweeping message size [{}]",
                settings.msg_sweep.window, modes
            ),
            ExperimentKind::WindowSweep => {
                format!("Small messages, sweeping window size [{}]", modes)
            }
        }
    }

    /// Enumerate grid points, outer dimensions first and modes innermost.
    pub fn grid(&self, settings: &SweepSettings) -> Result<Vec<ExperimentConfig>, ConfigError> {
        let tag = self.tag();
        let modes = &settings.modes;
        let mut points = Vec::new();
        match self {
            ExperimentKind::Baseline => {
                let b = &settings.baseline;
                for &mode in modes {
                    points.push(ExperimentConfig::new(tag, mode, b.msg, b.window, b.iters)?);
                }
            }
            ExperimentKind::MsgSweep => {
                let s = &settings.msg_sweep;
                for &msg in &s.msg_sizes {
                    for &mode in modes {
                        points.push(ExperimentConfig::new(tag, mode, msg, s.window, s.iters)?);
                    }
                }
            }
            ExperimentKind::WindowSweep => {
                let s = &settings.window_sweep;
                for &msg in &s.msg_sizes {
                    for &window in &s.windows {
                        for &mode in modes {
                            points.push(ExperimentConfig::new(tag, mode, msg, window, s.iters)?);
                        }
                    }
                }
            }
        }
        Ok(points)
    }
}

impl std::fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A grid point whose client run failed and was recorded as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPoint {
    pub config: ExperimentConfig,
    pub reason: String,
}

/// Summary of one experiment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    /// Experiment tag, as in the `experiment` column
    pub experiment: String,
    /// Failure policy the grid ran under
    pub policy: FailurePolicy,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Grid points visited
    pub points: usize,
    /// Points recorded as NaN, with the reason
    pub failed: Vec<FailedPoint>,
    pub rows_written: usize,
    /// Result file the rows were appended to
    pub output: PathBuf,
    /// Harness version that produced the report
    pub version: String,
}

impl SweepReport {
    /// Write `reports` as a pretty-printed JSON array, replacing `path`
    pub fn write_json(reports: &[SweepReport], path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(reports)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
        info!("Run summary written to: {:?}", path);
        Ok(())
    }
}

/// Executes experiment grids against a client runner and a coordinator.
///
/// The runner owns its collaborators behind trait objects so tests can
/// substitute the client and the ready signal. One runner can execute any
/// number of experiments in sequence; each experiment is appended to the
/// store as a single batch.
pub struct SweepRunner {
    client: Box<dyn ClientRunner>,
    coordinator: EndpointCoordinator,
    store: ResultStore,
    policy_override: Option<FailurePolicy>,
}

impl SweepRunner {
    /// Assemble a runner from its parts; see [`SweepRunner::from_settings`]
    /// for the production wiring.
    pub fn new(
        client: Box<dyn ClientRunner>,
        coordinator: EndpointCoordinator,
        store: ResultStore,
    ) -> Self {
        Self {
            client,
            coordinator,
            store,
            policy_override: None,
        }
    }

    /// Wire the real client process, the configured handshake and the CSV store.
    pub fn from_settings(settings: &SweepSettings, input: OperatorInput) -> Self {
        let client = ProcessClient::new(
            ClientEndpoint {
                executable: settings.client_bin.clone(),
                server: settings.server.clone(),
                port: settings.port,
            },
            settings.client_timeout(),
        );
        let signal: Box<dyn ReadySignal> = if settings.assume_server_ready {
            Box::new(AssumeReady)
        } else {
            Box::new(OperatorPrompt::new(input))
        };
        let coordinator = EndpointCoordinator::new(
            settings.server_bin.clone(),
            settings.port,
            settings.recv_depth,
            signal,
        );
        Self::new(Box::new(client), coordinator, ResultStore::new(&settings.output))
            .with_failure_policy(settings.on_failure)
    }

    /// Force one failure policy for every experiment
    pub fn with_failure_policy(mut self, policy: Option<FailurePolicy>) -> Self {
        self.policy_override = policy;
        self
    }

    /// Store the runner appends to
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Build the grid for `kind` and run it.
    pub async fn run_experiment(
        &mut self,
        kind: ExperimentKind,
        settings: &SweepSettings,
    ) -> Result<SweepReport> {
        info!("===== {} =====", kind.describe(settings));
        let grid = kind.grid(settings)?;
        let policy = self.policy_override.unwrap_or_else(|| kind.default_policy());
        self.run_grid(kind.tag(), &grid, policy).await
    }

    /// Visit every point of `grid` in order, then append all rows at once.
    ///
    /// For each point the coordinator is asked for a matching server first,
    /// then the client runs. A failed client run is handled per `policy`:
    ///
    /// - [`FailurePolicy::Record`]: a NaN row is kept and the next point runs
    /// - [`FailurePolicy::Abort`]: the grid stops and nothing is written
    ///
    /// ## Errors
    /// - the ready signal fails (e.g. operator input closed)
    /// - the client cannot be spawned or exits cleanly with unparseable output
    /// - a point fails under [`FailurePolicy::Abort`]
    /// - the batch cannot be appended to the store
    ///
    /// In every error case the store is left untouched.
    pub async fn run_grid(
        &mut self,
        experiment: &str,
        grid: &[ExperimentConfig],
        policy: FailurePolicy,
    ) -> Result<SweepReport> {
        let started_at = Utc::now();
        let mut rows = Vec::with_capacity(grid.len());
        let mut failed = Vec::new();

        for (idx, config) in grid.iter().enumerate() {
            info!("--- [{}/{}] {}: {} ---", idx + 1, grid.len(), experiment, config);

            self.coordinator
                .prepare(config)
                .await
                .with_context(|| format!("Server handshake failed for {}", config))?;

            let row = match self.client.run(config).await? {
                RunOutcome::Completed(measurement) => ResultRow::measured(config, &measurement),
                RunOutcome::Failed(failure) => match policy {
                    FailurePolicy::Record => {
                        warn!(
                            "*** Combination failed: {} ({}); recording NaN and continuing ***",
                            config, failure.kind
                        );
                        failed.push(FailedPoint {
                            config: config.clone(),
                            reason: failure.kind.to_string(),
                        });
                        ResultRow::failed(config)
                    }
                    FailurePolicy::Abort => {
                        error!(
                            "{} point failed ({}); aborting without writing results",
                            experiment, failure.kind
                        );
                        return Err(anyhow!(
                            "{} point {} failed: {}\nstdout:\n{}\nstderr:\n{}",
                            experiment,
                            config,
                            failure.kind,
                            failure.stdout.trim_end(),
                            failure.stderr.trim_end()
                        ));
                    }
                },
            };

            info!("Recorded: {}, {}", config, format_throughput(row.mops, row.gib));
            rows.push(row);
        }

        let rows_written = self
            .store
            .append(&rows)
            .with_context(|| format!("Failed to persist {} results", experiment))?;
        info!(
            "{} finished: {} points, {} failed, results written to {:?}",
            experiment,
            grid.len(),
            failed.len(),
            self.store.path()
        );

        Ok(SweepReport {
            experiment: experiment.to_string(),
            policy,
            started_at,
            finished_at: Utc::now(),
            points: grid.len(),
            failed,
            rows_written,
            output: self.store.path().to_path_buf(),
            version: crate::VERSION.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::ServerCommand;
    use crate::parser::Measurement;
    use crate::process::{FailureKind, RunFailure};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Client double: fails for configured points, otherwise reports
    /// `mops = msg / 10`, `gib = window / 100`.
    struct FakeClient {
        failing: HashSet<(TransferMode, u64, u64)>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl ClientRunner for FakeClient {
        async fn run(&mut self, config: &ExperimentConfig) -> Result<RunOutcome> {
            self.calls.lock().unwrap().push(format!("client {}", config));
            let key = (config.mode(), config.message_size(), config.window());
            if self.failing.contains(&key) {
                return Ok(RunOutcome::Failed(RunFailure {
                    kind: FailureKind::ExitStatus(Some(1)),
                    command_line: "fake".to_string(),
                    stdout: String::new(),
                    stderr: "RNR retry counter exceeded".to_string(),
                }));
            }
            Ok(RunOutcome::Completed(Measurement {
                mode: config.mode().to_string(),
                ops_per_sec: config.message_size() as f64 / 10.0,
                bandwidth: config.window() as f64 / 100.0,
                raw_output: String::new(),
            }))
        }
    }

    struct RecordingSignal(Arc<Mutex<Vec<String>>>);

    #[async_trait::async_trait]
    impl ReadySignal for RecordingSignal {
        async fn wait_ready(&mut self, command: &ServerCommand) -> Result<()> {
            self.0.lock().unwrap().push(format!("server {}", command.mode));
            Ok(())
        }
    }

    fn runner(dir: &TempDir, failing: &[(TransferMode, u64, u64)]) -> (SweepRunner, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let client = FakeClient {
            failing: failing.iter().copied().collect(),
            calls: calls.clone(),
        };
        let coordinator = EndpointCoordinator::new(
            PathBuf::from("./bench_server"),
            9000,
            Default::default(),
            Box::new(RecordingSignal(calls.clone())),
        );
        let store = ResultStore::new(dir.path().join("results.csv"));
        (SweepRunner::new(Box::new(client), coordinator, store), calls)
    }

    fn small_settings() -> SweepSettings {
        let mut settings = SweepSettings::default();
        settings.window_sweep.msg_sizes = vec![32, 64];
        settings.window_sweep.windows = vec![1, 8];
        settings.window_sweep.iters = 1000;
        settings
    }

    #[test]
    fn test_experiment_config_validation() {
        assert!(ExperimentConfig::new("sweep", TransferMode::Write, 32, 1, 1).is_ok());
        assert!(ExperimentConfig::new("sweep", TransferMode::Write, 0, 1, 1).is_err());
        assert!(ExperimentConfig::new("sweep", TransferMode::Write, 32, 0, 1).is_err());
        assert!(ExperimentConfig::new("sweep", TransferMode::Write, 32, 1, 0).is_err());
        assert!(ExperimentConfig::new("a,b", TransferMode::Write, 32, 1, 1).is_err());
    }

    #[test]
    fn test_deserialize_validates_config() {
        let config = ExperimentConfig::new("sweep", TransferMode::Send, 64, 8, 1000).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: ExperimentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let zero_window = r#"{"experiment":"sweep","mode":"send","message_size":64,"window":0,"iteration_count":1000}"#;
        assert!(serde_json::from_str::<ExperimentConfig>(zero_window).is_err());
        let bad_tag = r#"{"experiment":"a,b","mode":"write","message_size":64,"window":1,"iteration_count":1}"#;
        assert!(serde_json::from_str::<ExperimentConfig>(bad_tag).is_err());
    }

    #[test]
    fn test_window_sweep_grid_order() {
        let settings = small_settings();
        let grid = ExperimentKind::WindowSweep.grid(&settings).unwrap();
        let order: Vec<(u64, u64, TransferMode)> = grid
            .iter()
            .map(|c| (c.message_size(), c.window(), c.mode()))
            .collect();
        use TransferMode::{Send, Write};
        assert_eq!(
            order,
            vec![
                (32, 1, Write),
                (32, 1, Send),
                (32, 8, Write),
                (32, 8, Send),
                (64, 1, Write),
                (64, 1, Send),
                (64, 8, Write),
                (64, 8, Send),
            ]
        );
        assert!(grid.iter().all(|c| c.experiment() == "sweep" && c.iteration_count() == 1000));
    }

    #[test]
    fn test_baseline_and_msg_sweep_grids() {
        let settings = SweepSettings::default();
        let baseline = ExperimentKind::Baseline.grid(&settings).unwrap();
        assert_eq!(baseline.len(), 2);
        assert!(baseline
            .iter()
            .all(|c| c.message_size() == 8192 && c.window() == 64 && c.iteration_count() == 100_000));

        let msg = ExperimentKind::MsgSweep.grid(&settings).unwrap();
        assert_eq!(msg.len(), settings.msg_sweep.msg_sizes.len() * 2);
        assert_eq!(msg[0].mode(), TransferMode::Write);
        assert_eq!(msg[1].mode(), TransferMode::Send);
        assert_eq!(msg[0].message_size(), msg[1].message_size());
        assert!(msg.iter().all(|c| c.window() == 4 && c.experiment() == "msg_sweep"));
    }

    #[test]
    fn test_default_policies() {
        assert_eq!(ExperimentKind::Baseline.default_policy(), FailurePolicy::Abort);
        assert_eq!(ExperimentKind::MsgSweep.default_policy(), FailurePolicy::Record);
        assert_eq!(ExperimentKind::WindowSweep.default_policy(), FailurePolicy::Record);
    }

    #[tokio::test]
    async fn test_handshake_precedes_each_client_run() {
        let dir = TempDir::new().unwrap();
        let (mut runner, calls) = runner(&dir, &[]);
        let grid = vec![
            ExperimentConfig::new("sweep", TransferMode::Write, 32, 1, 10).unwrap(),
            ExperimentConfig::new("sweep", TransferMode::Send, 32, 1, 10).unwrap(),
        ];
        runner.run_grid("sweep", &grid, FailurePolicy::Record).await.unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "server write",
                "client msg=32, window=1, mode=write",
                "server send",
                "client msg=32, window=1, mode=send",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_points_become_nan_rows() {
        let dir = TempDir::new().unwrap();
        let (mut runner, _) = runner(&dir, &[(TransferMode::Send, 64, 8), (TransferMode::Write, 32, 1)]);
        let settings = small_settings();

        let report = runner
            .run_experiment(ExperimentKind::WindowSweep, &settings)
            .await
            .unwrap();
        assert_eq!(report.points, 8);
        assert_eq!(report.rows_written, 8);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.policy, FailurePolicy::Record);

        let rows = runner.store().load().unwrap();
        assert_eq!(rows.len(), 8);
        for row in &rows {
            let should_fail = (row.mode == TransferMode::Send && row.msg == 64 && row.window == 8)
                || (row.mode == TransferMode::Write && row.msg == 32 && row.window == 1);
            assert_eq!(row.is_missing(), should_fail, "{:?}", row);
            assert!(row.mops.is_nan() == should_fail && row.gib.is_nan() == should_fail);
            assert_eq!(row.experiment, "sweep");
            assert_eq!(row.iters, 1000);
            if !should_fail {
                assert_eq!(row.mops, row.msg as f64 / 10.0);
                assert_eq!(row.gib, row.window as f64 / 100.0);
            }
        }
    }

    #[tokio::test]
    async fn test_abort_policy_persists_nothing() {
        let dir = TempDir::new().unwrap();
        let (mut runner, calls) = runner(&dir, &[(TransferMode::Write, 8192, 64)]);
        let settings = SweepSettings::default();

        let err = runner
            .run_experiment(ExperimentKind::Baseline, &settings)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("baseline point"));
        assert!(!runner.store().path().exists());
        // Aborted on the first point; the send point never ran
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_policy_override_records_baseline_failures() {
        let dir = TempDir::new().unwrap();
        let (runner, _) = runner(&dir, &[(TransferMode::Write, 8192, 64)]);
        let mut runner = runner.with_failure_policy(Some(FailurePolicy::Record));
        let settings = SweepSettings::default();

        let report = runner
            .run_experiment(ExperimentKind::Baseline, &settings)
            .await
            .unwrap();
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.failed[0].config.mode(), TransferMode::Write);
    }
}
