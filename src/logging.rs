//! Console and file logging setup.
//!
//! The console gets bare, level-colored lines meant for the operator. When a
//! log file is requested, a second layer writes the conventional
//! timestamped format there without ANSI escapes, so the full stdout and
//! stderr of failed client runs are kept on disk.

use anyhow::{Context, Result};
use colored::*;
use std::fmt;
use std::path::Path;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Formats each event as one line colored by its level.
///
/// Timestamps and targets are omitted. Warnings and errors get a short
/// prefix so they stay recognizable when color is disabled.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // format_fields writes directly, so buffer to color the whole line
        let mut buffer = String::new();
        ctx.format_fields(Writer::new(&mut buffer), event)?;

        let line = match *event.metadata().level() {
            Level::ERROR => format!("error: {}", buffer).red(),
            Level::WARN => format!("warning: {}", buffer).yellow(),
            Level::INFO => buffer.white(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        writeln!(writer, "{}", line)
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Build the layered subscriber without installing it.
///
/// The console layer always writes to stderr. With `log_file` set, a second
/// plain-text layer appends to that file through a non-blocking writer whose
/// guard is returned alongside.
pub fn subscriber(
    verbose: bool,
    log_file: Option<&Path>,
) -> Result<(impl Subscriber + Send + Sync + 'static, Option<WorkerGuard>)> {
    let console = tracing_subscriber::fmt::layer()
        .event_format(ColorizedFormatter)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(console)
        .with(file_layer);
    Ok((subscriber, guard))
}

/// Install the global subscriber.
///
/// `-v` forces debug level; otherwise `RUST_LOG` is honoured with `info` as
/// the fallback. The returned guard must be held until exit so buffered
/// file output is flushed. A log file is appended to, never truncated.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let (subscriber, guard) = subscriber(verbose, log_file)?;
    subscriber
        .try_init()
        .context("Failed to install the tracing subscriber")?;
    Ok(guard)
}
