//! # Result Store
//!
//! Append-only CSV log of sweep results, one row per visited grid point.
//!
//! ```text
//! experiment,mode,msg,window,iters,mops,gib
//! sweep,write,32,1,200000,1.234,0.0368
//! sweep,send,32,1,200000,nan,nan
//! ```
//!
//! - The header is written only when the destination did not exist before
//!   the file was opened, so repeated runs accumulate rows under one header.
//! - A failed point keeps the row shape and stores `nan` in both throughput
//!   columns.
//! - Rows are never updated or deleted. Duplicates from re-runs are kept;
//!   consumers de-duplicate when they need to.

use crate::benchmark::ExperimentConfig;
use crate::cli::TransferMode;
use crate::parser::Measurement;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Column names in on-disk order
pub const COLUMNS: [&str; 7] = ["experiment", "mode", "msg", "window", "iters", "mops", "gib"];

/// Errors reading or writing the result file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on result file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("result file {path} has unexpected header '{found}'")]
    Schema { path: PathBuf, found: String },

    #[error("result file {path}, line {line}: {reason}")]
    Row {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// One persisted grid point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub experiment: String,
    pub mode: TransferMode,
    pub msg: u64,
    pub window: u64,
    pub iters: u64,
    /// Millions of operations per second, NaN when the point failed
    pub mops: f64,
    /// GiB/s, NaN when the point failed
    pub gib: f64,
}

impl ResultRow {
    /// Row for a point that produced a measurement
    pub fn measured(config: &ExperimentConfig, measurement: &Measurement) -> Self {
        Self::with_values(config, measurement.ops_per_sec, measurement.bandwidth)
    }

    /// Sentinel row for a point whose client run failed
    pub fn failed(config: &ExperimentConfig) -> Self {
        Self::with_values(config, f64::NAN, f64::NAN)
    }

    fn with_values(config: &ExperimentConfig, mops: f64, gib: f64) -> Self {
        Self {
            experiment: config.experiment().to_string(),
            mode: config.mode(),
            msg: config.message_size(),
            window: config.window(),
            iters: config.iteration_count(),
            mops,
            gib,
        }
    }

    /// True for a failed point (either throughput value is NaN)
    pub fn is_missing(&self) -> bool {
        self.mops.is_nan() || self.gib.is_nan()
    }

    /// Field-wise equality where NaN equals NaN
    pub fn same_values(&self, other: &ResultRow) -> bool {
        fn same(a: f64, b: f64) -> bool {
            (a.is_nan() && b.is_nan()) || a == b
        }
        self.experiment == other.experiment
            && self.mode == other.mode
            && self.msg == other.msg
            && self.window == other.window
            && self.iters == other.iters
            && same(self.mops, other.mops)
            && same(self.gib, other.gib)
    }

    fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.experiment,
            self.mode,
            self.msg,
            self.window,
            self.iters,
            format_float(self.mops),
            format_float(self.gib)
        )
    }
}

fn format_float(value: f64) -> String {
    if value.is_finite() {
        ryu::Buffer::new().format_finite(value).to_string()
    } else if value.is_nan() {
        "nan".to_string()
    } else if value > 0.0 {
        "inf".to_string()
    } else {
        "-inf".to_string()
    }
}

fn parse_float(field: &str) -> Result<f64, String> {
    let field = field.trim();
    if field.is_empty() || field.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    field
        .parse::<f64>()
        .map_err(|_| format!("invalid number '{}'", field))
}

fn parse_int(field: &str, name: &str) -> Result<u64, String> {
    field
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("invalid {} '{}'", name, field))
}

/// Append-only CSV store at a fixed path.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    /// Store at `path`; nothing is touched until the first append.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Append a batch of rows, writing the header first if the file is new.
    ///
    /// Returns the number of data rows written.
    pub fn append(&self, rows: &[ResultRow]) -> Result<usize, StoreError> {
        let file_exists = self.path.exists();

        if !file_exists {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let mut writer = BufWriter::new(file);

        if !file_exists {
            writeln!(writer, "{}", COLUMNS.join(",")).map_err(|e| self.io_error(e))?;
            debug!("Wrote header to new result file {:?}", self.path);
        }
        for row in rows {
            writeln!(writer, "{}", row.to_csv_line()).map_err(|e| self.io_error(e))?;
        }
        writer.flush().map_err(|e| self.io_error(e))?;

        info!("Appended {} rows to {:?}", rows.len(), self.path);
        Ok(rows.len())
    }

    /// Read every row back in file order.
    pub fn load(&self) -> Result<Vec<ResultRow>, StoreError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let mut lines = text.lines().enumerate();

        let header = match lines.next() {
            Some((_, header)) => header.trim(),
            None => return Ok(Vec::new()),
        };
        if header != COLUMNS.join(",") {
            return Err(StoreError::Schema {
                path: self.path.clone(),
                found: header.to_string(),
            });
        }

        let mut rows = Vec::new();
        for (idx, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let row = parse_row(line).map_err(|reason| StoreError::Row {
                path: self.path.clone(),
                line: idx + 1,
                reason,
            })?;
            rows.push(row);
        }
        Ok(rows)
    }
}

fn parse_row(line: &str) -> Result<ResultRow, String> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != COLUMNS.len() {
        return Err(format!(
            "expected {} fields, found {}",
            COLUMNS.len(),
            fields.len()
        ));
    }
    Ok(ResultRow {
        experiment: fields[0].to_string(),
        mode: fields[1].parse::<TransferMode>().map_err(|e| e.to_string())?,
        msg: parse_int(fields[2], "msg")?,
        window: parse_int(fields[3], "window")?,
        iters: parse_int(fields[4], "iters")?,
        mops: parse_float(fields[5])?,
        gib: parse_float(fields[6])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(mode: TransferMode, msg: u64, mops: f64, gib: f64) -> ResultRow {
        let config = ExperimentConfig::new("sweep", mode, msg, 4, 1000).unwrap();
        let mut row = ResultRow::failed(&config);
        row.mops = mops;
        row.gib = gib;
        row
    }

    #[test]
    fn test_header_written_once_across_appends() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("results.csv"));

        store
            .append(&[row(TransferMode::Write, 32, 1.0, 0.5), row(TransferMode::Send, 32, 2.0, 1.0)])
            .unwrap();
        store.append(&[row(TransferMode::Write, 64, 3.0, 1.5)]).unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "experiment,mode,msg,window,iters,mops,gib");
        assert_eq!(text.matches("experiment,").count(), 1);
        assert_eq!(lines[1], "sweep,write,32,4,1000,1.0,0.5");
        assert_eq!(lines[3], "sweep,write,64,4,1000,3.0,1.5");
    }

    #[test]
    fn test_missing_values_written_as_nan() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("results.csv"));
        let config = ExperimentConfig::new("sweep", TransferMode::Send, 64, 1, 200_000).unwrap();
        let failed = ResultRow::failed(&config);
        assert!(failed.is_missing());

        store.append(&[failed]).unwrap();
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(text.lines().nth(1), Some("sweep,send,64,1,200000,nan,nan"));
    }

    #[test]
    fn test_round_trip_preserves_rows() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("nested").join("results.csv"));
        let written = vec![
            row(TransferMode::Write, 32, 12.345, 0.368),
            row(TransferMode::Send, 32, f64::NAN, f64::NAN),
            row(TransferMode::Read, 8192, 0.1, 6.25),
        ];
        store.append(&written).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), written.len());
        for (a, b) in written.iter().zip(&loaded) {
            assert!(a.same_values(b), "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_empty_batch_creates_header_only_file() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("results.csv"));
        assert_eq!(store.append(&[]).unwrap(), 0);
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "experiment,mode,msg,window,iters,mops,gib\n"
        );
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_rejects_foreign_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "a,b,c\n1,2,3\n").unwrap();
        assert!(matches!(
            ResultStore::new(&path).load(),
            Err(StoreError::Schema { .. })
        ));
    }

    #[test]
    fn test_load_reports_bad_row_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "experiment,mode,msg,window,iters,mops,gib\nsweep,write,32,4,1000,1.0,2.0\nsweep,atomic,32,4,1000,1,2\n",
        )
        .unwrap();
        match ResultStore::new(&path).load() {
            Err(StoreError::Row { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_load_accepts_pandas_style_missing_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(
            &path,
            "experiment,mode,msg,window,iters,mops,gib\nsweep,send,32,4,1000,NaN,\n",
        )
        .unwrap();
        let rows = ResultStore::new(&path).load().unwrap();
        assert!(rows[0].mops.is_nan());
        assert!(rows[0].gib.is_nan());
    }
}
