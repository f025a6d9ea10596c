//! # Utility Functions
//!
//! Validation of grid values, command-line rendering for logs and operator
//! prompts, and throughput formatting.
//!
//! ```rust
//! use rdma_sweep::utils::*;
//!
//! assert_eq!(format_throughput(12.3456, 0.5), "Mops=12.346, GiB/s=0.500");
//! assert_eq!(format_throughput(f64::NAN, f64::NAN), "Mops=nan, GiB/s=nan");
//! assert!(validate_window(0).is_err());
//! ```

use crate::config::ConfigError;

/// Largest message size accepted on a grid (1 GiB)
pub const MAX_MESSAGE_SIZE: u64 = 1024 * 1024 * 1024;

/// Validate that a port is usable without privileges
pub fn validate_port(port: u16) -> Result<(), ConfigError> {
    if port < 1024 {
        return Err(ConfigError::PrivilegedPort(port));
    }
    Ok(())
}

/// Validate that a message size is positive and at most 1 GiB
pub fn validate_message_size(message_size: u64) -> Result<(), ConfigError> {
    if message_size == 0 {
        return Err(ConfigError::NotPositive {
            field: "message size",
        });
    }
    if message_size > MAX_MESSAGE_SIZE {
        return Err(ConfigError::MessageTooLarge(message_size));
    }
    Ok(())
}

/// Validate an outstanding-operation window
pub fn validate_window(window: u64) -> Result<(), ConfigError> {
    if window == 0 {
        return Err(ConfigError::NotPositive { field: "window" });
    }
    Ok(())
}

/// Validate an iteration count
pub fn validate_iterations(iters: u64) -> Result<(), ConfigError> {
    if iters == 0 {
        return Err(ConfigError::NotPositive {
            field: "iteration count",
        });
    }
    Ok(())
}

/// Validate an experiment tag.
///
/// Tags are written unquoted into the CSV, so separators and quotes are
/// rejected.
pub fn validate_experiment_tag(tag: &str) -> Result<(), ConfigError> {
    let bad = |c: char| matches!(c, ',' | '"' | '\n' | '\r');
    if tag.trim().is_empty() || tag.contains(bad) {
        return Err(ConfigError::InvalidTag(tag.to_string()));
    }
    Ok(())
}

/// Join an argument vector into a single shell-like line.
///
/// Arguments containing whitespace or quotes are single-quoted so the line
/// can be pasted into a terminal.
pub fn render_command_line<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| quote_arg(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_arg(arg: &str) -> String {
    let needs_quotes =
        arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || "'\"$`\\;&|".contains(c));
    if needs_quotes {
        format!("'{}'", arg.replace('\'', r"'\''"))
    } else {
        arg.to_string()
    }
}

/// Format a throughput pair the way the sweep logs record it
pub fn format_throughput(mops: f64, gib: f64) -> String {
    format!("Mops={}, GiB/s={}", format_metric(mops), format_metric(gib))
}

fn format_metric(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{:.3}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_port() {
        assert!(validate_port(1024).is_ok());
        assert!(validate_port(9000).is_ok());
        assert!(validate_port(65535).is_ok());
        assert!(validate_port(1023).is_err());
    }

    #[test]
    fn test_validate_message_size() {
        assert!(validate_message_size(1).is_ok());
        assert!(validate_message_size(MAX_MESSAGE_SIZE).is_ok());
        assert!(validate_message_size(0).is_err());
        assert_eq!(
            validate_message_size(MAX_MESSAGE_SIZE + 1),
            Err(ConfigError::MessageTooLarge(MAX_MESSAGE_SIZE + 1))
        );
    }

    #[test]
    fn test_validate_window_and_iterations() {
        assert!(validate_window(1).is_ok());
        assert!(validate_window(0).is_err());
        assert!(validate_iterations(200_000).is_ok());
        assert!(validate_iterations(0).is_err());
    }

    #[test]
    fn test_validate_experiment_tag() {
        assert!(validate_experiment_tag("msg_sweep").is_ok());
        assert!(validate_experiment_tag("").is_err());
        assert!(validate_experiment_tag("  ").is_err());
        assert!(validate_experiment_tag("a,b").is_err());
        assert!(validate_experiment_tag("line\nbreak").is_err());
    }

    #[test]
    fn test_render_command_line() {
        assert_eq!(
            render_command_line(&["./bench_server", "9000", "--mode", "send"]),
            "./bench_server 9000 --mode send"
        );
        assert_eq!(
            render_command_line(&["/opt/my bench/client", "it's"]),
            r"'/opt/my bench/client' 'it'\''s'"
        );
        assert_eq!(render_command_line(&["a", ""]), "a ''");
    }

    #[test]
    fn test_format_throughput() {
        assert_eq!(format_throughput(1.0, 2.0), "Mops=1.000, GiB/s=2.000");
        assert_eq!(format_throughput(f64::NAN, 0.25), "Mops=nan, GiB/s=0.250");
    }
}
