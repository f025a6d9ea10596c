//! # Benchmark Client Runner
//!
//! Runs the external benchmark client for one grid point and classifies the
//! result:
//!
//! - exit status 0: stdout is handed to the parser; a parse failure is a
//!   fatal error because a clean exit must always produce a summary line
//! - non-zero exit or timeout: a recoverable [`RunOutcome::Failed`], logged
//!   with the full command line and captured output (for a timeout, whatever
//!   the client printed before it was killed)
//! - failure to spawn: a fatal error
//!
//! Output is captured completely (no streaming) and the runner keeps no state
//! between invocations.

use crate::benchmark::ExperimentConfig;
use crate::parser::{parse_client_output, Measurement};
use crate::utils::render_command_line;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where and how to reach the benchmark server from the client side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEndpoint {
    /// Client executable, resolved like any command (relative to the
    /// working directory when it contains a slash)
    pub executable: PathBuf,
    /// Host name or address of the server endpoint
    pub server: String,
    /// Port the server listens on; the same for every grid point
    pub port: u16,
}

impl ClientEndpoint {
    /// `[executable, server, port, --mode, m, --msg, n, --iters, k, --window, w]`
    pub fn argv(&self, config: &ExperimentConfig) -> Vec<String> {
        vec![
            self.executable.to_string_lossy().into_owned(),
            self.server.clone(),
            self.port.to_string(),
            "--mode".to_string(),
            config.mode().to_string(),
            "--msg".to_string(),
            config.message_size().to_string(),
            "--iters".to_string(),
            config.iteration_count().to_string(),
            "--window".to_string(),
            config.window().to_string(),
        ]
    }
}

/// Why a client invocation did not produce a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Process exited with a non-zero status (or was killed by a signal)
    ExitStatus(Option<i32>),
    /// Process exceeded the configured timeout and was killed
    TimedOut(Duration),
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::ExitStatus(Some(code)) => write!(f, "exited with code {}", code),
            FailureKind::ExitStatus(None) => write!(f, "terminated by signal"),
            FailureKind::TimedOut(limit) => write!(f, "timed out after {:?}", limit),
        }
    }
}

/// Diagnostics of a failed client invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFailure {
    pub kind: FailureKind,
    /// Rendered command line, ready to paste into a shell
    pub command_line: String,
    /// Everything the client wrote to stdout before it exited or was killed
    pub stdout: String,
    pub stderr: String,
}

/// Result of one client invocation that did not hit a fatal error.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Measurement),
    Failed(RunFailure),
}

/// Anything that can execute the benchmark client for a grid point.
///
/// `Err` is reserved for fatal conditions (spawn failure, unparseable output
/// after a clean exit); expected benchmark failures come back as
/// [`RunOutcome::Failed`].
#[async_trait::async_trait]
pub trait ClientRunner: Send {
    async fn run(&mut self, config: &ExperimentConfig) -> Result<RunOutcome>;
}

/// Runs the real client executable as a child process.
///
/// Stdin is closed, stdout and stderr are piped and drained by background
/// tasks while the client runs. With a timeout set, a client still running
/// when it expires is killed and reported as [`FailureKind::TimedOut`]
/// together with whatever it printed up to that point.
#[derive(Debug, Clone)]
pub struct ProcessClient {
    endpoint: ClientEndpoint,
    timeout: Option<Duration>,
}

impl ProcessClient {
    pub fn new(endpoint: ClientEndpoint, timeout: Option<Duration>) -> Self {
        Self { endpoint, timeout }
    }

    pub fn endpoint(&self) -> &ClientEndpoint {
        &self.endpoint
    }
}

/// How long pipe readers may keep draining after a timed-out client is
/// killed. Grandchildren that inherited the pipes can hold them open.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Bytes read so far from one child pipe.
///
/// The buffer is shared with the reader task so partial output survives
/// when the task has to be abandoned.
struct PipeCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl PipeCapture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 4096];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => buffer.lock().await.extend_from_slice(&chunk[..n]),
                        Err(e) => {
                            debug!("Stopped reading client pipe: {}", e);
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Wait for the reader (at most `grace` when set) and return the text.
    async fn finish(self, grace: Option<Duration>) -> String {
        if let Some(mut task) = self.task {
            match grace {
                Some(limit) => {
                    if tokio::time::timeout(limit, &mut task).await.is_err() {
                        task.abort();
                    }
                }
                None => {
                    if let Err(e) = task.await {
                        debug!("Client pipe reader ended abnormally: {}", e);
                    }
                }
            }
        }
        let bytes = self.buffer.lock().await;
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[async_trait::async_trait]
impl ClientRunner for ProcessClient {
    async fn run(&mut self, config: &ExperimentConfig) -> Result<RunOutcome> {
        let argv = self.endpoint.argv(config);
        let command_line = render_command_line(&argv);
        info!("Running client: {}", command_line);

        let mut child = tokio::process::Command::new(&self.endpoint.executable)
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn benchmark client: {}", command_line))?;

        let stdout_capture = PipeCapture::start(child.stdout.take());
        let stderr_capture = PipeCapture::start(child.stderr.take());

        let status = match self.timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(status) => Some(status),
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            debug!("Killing timed-out client failed: {}", e);
                        }
                        None
                    }
                }
            }
            None => Some(child.wait().await),
        };

        let (kind, grace) = match status {
            Some(status) => {
                let status = status
                    .with_context(|| format!("Failed to wait for benchmark client: {}", command_line))?;
                if status.success() {
                    (None, None)
                } else {
                    (Some(FailureKind::ExitStatus(status.code())), None)
                }
            }
            None => (self.timeout.map(FailureKind::TimedOut), Some(DRAIN_GRACE)),
        };

        let stdout = stdout_capture.finish(grace).await;
        let stderr = stderr_capture.finish(grace).await;

        if let Some(kind) = kind {
            let failure = RunFailure {
                kind,
                command_line,
                stdout,
                stderr,
            };
            warn!("!! Client {}: {}", failure.kind, failure.command_line);
            warn!("stdout:\n{}", failure.stdout.trim_end());
            warn!("stderr:\n{}", failure.stderr.trim_end());
            return Ok(RunOutcome::Failed(failure));
        }

        debug!("Client stdout:\n{}", stdout.trim());
        let measurement = parse_client_output(&stdout)
            .with_context(|| format!("Client exited cleanly but its output could not be parsed: {}", command_line))?;

        if measurement.mode != config.mode().as_str() {
            warn!(
                "Client reported mode '{}' but '{}' was requested",
                measurement.mode,
                config.mode()
            );
        }
        Ok(RunOutcome::Completed(measurement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::TransferMode;

    #[test]
    fn test_client_argv_order() {
        let endpoint = ClientEndpoint {
            executable: PathBuf::from("./bench_client"),
            server: "10.0.0.2".to_string(),
            port: 9000,
        };
        let config = ExperimentConfig::new("sweep", TransferMode::Send, 32, 8, 200_000).unwrap();
        assert_eq!(
            endpoint.argv(&config),
            vec![
                "./bench_client",
                "10.0.0.2",
                "9000",
                "--mode",
                "send",
                "--msg",
                "32",
                "--iters",
                "200000",
                "--window",
                "8"
            ]
        );
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::ExitStatus(Some(1)).to_string(), "exited with code 1");
        assert_eq!(FailureKind::ExitStatus(None).to_string(), "terminated by signal");
        assert_eq!(
            FailureKind::TimedOut(Duration::from_secs(2)).to_string(),
            "timed out after 2s"
        );
    }

    #[tokio::test]
    async fn test_missing_executable_is_fatal() {
        let mut client = ProcessClient::new(
            ClientEndpoint {
                executable: PathBuf::from("/nonexistent/bench_client"),
                server: "127.0.0.1".to_string(),
                port: 9000,
            },
            None,
        );
        let config = ExperimentConfig::new("baseline", TransferMode::Write, 8192, 64, 10).unwrap();
        assert!(client.run(&config).await.is_err());
    }
}
