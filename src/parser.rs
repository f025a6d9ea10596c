//! # Client Output Parser
//!
//! Extracts the final throughput summary from the text a benchmark client
//! prints on standard output. The client is treated as a black box; the only
//! contract is the completion line grammar below.
//!
//! ## Completion Line Grammar
//!
//! ```text
//! line    := ... "[client]" WS mode WS "done:" WS number WS "Mops," WS number WS "GiB/s" ...
//! mode    := (alphanumeric | "_")+
//! number  := (digit | ".")+
//! WS      := whitespace+
//! ```
//!
//! The pattern may appear anywhere inside a line. Output is scanned from the
//! last line to the first and the first match wins, so a final summary always
//! takes precedence over earlier progress lines.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag that marks a client completion line.
pub const CLIENT_TAG: &str = "[client]";

/// Structured result of one successful client invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Mode token as reported by the client
    pub mode: String,
    /// Millions of operations per second
    pub ops_per_sec: f64,
    /// Bandwidth in GiB/s
    pub bandwidth: f64,
    /// Complete captured stdout, kept for diagnostics
    pub raw_output: String,
}

/// Failure to extract a measurement from client output.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no '[client] <mode> done: <x> Mops, <y> GiB/s' line found in client output ({lines} lines scanned)")]
    NoCompletionLine { lines: usize },

    #[error("malformed number '{value}' in completion line: {line}")]
    InvalidNumber { value: String, line: String },
}

/// Parse the complete stdout of one client run.
///
/// Returns the fields of the last completion line. Fails when no line
/// matches, independent of how the process exited.
pub fn parse_client_output(stdout: &str) -> Result<Measurement, ParseError> {
    let mut lines = 0;
    for line in stdout.lines().rev() {
        lines += 1;
        if let Some(fields) = match_line(line) {
            let ops_per_sec = parse_number(fields.ops, line)?;
            let bandwidth = parse_number(fields.gib, line)?;
            return Ok(Measurement {
                mode: fields.mode.to_string(),
                ops_per_sec,
                bandwidth,
                raw_output: stdout.trim().to_string(),
            });
        }
    }
    Err(ParseError::NoCompletionLine { lines })
}

struct LineFields<'a> {
    mode: &'a str,
    ops: &'a str,
    gib: &'a str,
}

/// Try every occurrence of the tag in `line`, returning the first full match.
fn match_line(line: &str) -> Option<LineFields<'_>> {
    let mut offset = 0;
    while let Some(pos) = line[offset..].find(CLIENT_TAG) {
        let start = offset + pos + CLIENT_TAG.len();
        if let Some(fields) = match_after_tag(&line[start..]) {
            return Some(fields);
        }
        offset = start;
    }
    None
}

fn match_after_tag(rest: &str) -> Option<LineFields<'_>> {
    let mut cursor = Cursor::new(rest);
    cursor.whitespace()?;
    let mode = cursor.take_while(|c| c.is_alphanumeric() || c == '_')?;
    cursor.whitespace()?;
    cursor.literal("done:")?;
    cursor.whitespace()?;
    let ops = cursor.take_while(is_number_char)?;
    cursor.whitespace()?;
    cursor.literal("Mops,")?;
    cursor.whitespace()?;
    let gib = cursor.take_while(is_number_char)?;
    cursor.whitespace()?;
    cursor.literal("GiB/s")?;
    Some(LineFields { mode, ops, gib })
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn parse_number(value: &str, line: &str) -> Result<f64, ParseError> {
    value.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
        value: value.to_string(),
        line: line.trim().to_string(),
    })
}

/// Minimal forward-only scanner over a line fragment.
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(rest: &'a str) -> Self {
        Self { rest }
    }

    /// Consume one or more whitespace characters.
    fn whitespace(&mut self) -> Option<()> {
        self.take_while(char::is_whitespace).map(|_| ())
    }

    /// Consume a non-empty run of characters matching `pred`.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> Option<&'a str> {
        let end = self
            .rest
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map_or(self.rest.len(), |(i, _)| i);
        if end == 0 {
            return None;
        }
        let (taken, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(taken)
    }

    fn literal(&mut self, lit: &str) -> Option<()> {
        self.rest = self.rest.strip_prefix(lit)?;
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_completion_line() {
        let out = "connecting...\n[client] write done: 12.345 Mops, 0.368 GiB/s\n";
        let m = parse_client_output(out).unwrap();
        assert_eq!(m.mode, "write");
        assert_eq!(m.ops_per_sec, 12.345);
        assert_eq!(m.bandwidth, 0.368);
        assert!(m.raw_output.contains("connecting"));
    }

    #[test]
    fn test_last_matching_line_wins() {
        let out = "\
[client] send done: 1.0 Mops, 0.1 GiB/s
progress 50%
[client] send done: 2.5 Mops, 0.25 GiB/s
teardown complete
";
        let m = parse_client_output(out).unwrap();
        assert_eq!(m.ops_per_sec, 2.5);
        assert_eq!(m.bandwidth, 0.25);
    }

    #[test]
    fn test_tag_may_be_embedded_in_line() {
        let out = "12:00:01 INFO [client]  read   done:\t3 Mops,  4.5 GiB/s (final)";
        let m = parse_client_output(out).unwrap();
        assert_eq!(m.mode, "read");
        assert_eq!(m.ops_per_sec, 3.0);
        assert_eq!(m.bandwidth, 4.5);
    }

    #[test]
    fn test_second_tag_occurrence_is_tried() {
        let out = "[client] noise [client] write done: 1.5 Mops, 2.5 GiB/s";
        let m = parse_client_output(out).unwrap();
        assert_eq!(m.mode, "write");
        assert_eq!(m.ops_per_sec, 1.5);
    }

    #[test]
    fn test_no_match_fails() {
        let out = "[client] write done: fast Mops, 1 GiB/s\n[server] send done: 1 Mops, 1 GiB/s\n";
        assert_eq!(
            parse_client_output(out),
            Err(ParseError::NoCompletionLine { lines: 2 })
        );
        assert!(parse_client_output("").is_err());
    }

    #[test]
    fn test_whitespace_is_required_between_tokens() {
        assert!(parse_client_output("[client]write done: 1 Mops, 1 GiB/s").is_err());
        assert!(parse_client_output("[client] write done:1 Mops, 1 GiB/s").is_err());
        assert!(parse_client_output("[client] write done: 1Mops, 1 GiB/s").is_err());
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let err = parse_client_output("[client] write done: 1.2.3 Mops, 1 GiB/s").unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { ref value, .. } if value == "1.2.3"));
    }
}
