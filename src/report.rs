//! Result recording
//!
//! A validation result becomes one row per probe:
//! `quantity,workers,probe,profile,scenario,elapsed_seconds,attempts`.
//! Probes that never settled leave `elapsed_seconds` empty.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{ConsistencyError, Result};
use crate::validator::ValidationResult;

pub const CSV_HEADER: &str = "quantity,workers,probe,profile,scenario,elapsed_seconds,attempts";

/// Scenario metadata attached to every row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioMeta {
    /// Objects in the workload
    pub quantity: usize,
    /// Concurrent workers used to produce it
    pub workers: usize,
    /// AWS profile or region label
    pub profile: String,
    /// Bucket type or scenario label
    pub scenario: String,
}

/// One report line
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub quantity: usize,
    pub workers: usize,
    pub probe: String,
    pub profile: String,
    pub scenario: String,
    pub elapsed_seconds: Option<f64>,
    pub attempts: u32,
}

impl ReportRow {
    /// Rows for every probe of `result`, in probe order
    pub fn from_result(result: &ValidationResult, meta: &ScenarioMeta) -> Vec<ReportRow> {
        result
            .probes
            .iter()
            .map(|p| ReportRow {
                quantity: meta.quantity,
                workers: meta.workers,
                probe: p.name.clone(),
                profile: meta.profile.clone(),
                scenario: meta.scenario.clone(),
                elapsed_seconds: p.settled_after.map(|d| d.as_secs_f64()),
                attempts: p.attempts,
            })
            .collect()
    }

    fn to_csv_line(&self) -> String {
        let elapsed = self
            .elapsed_seconds
            .map(|s| format!("{:.3}", s))
            .unwrap_or_default();
        format!(
            "{},{},{},{},{},{},{}",
            self.quantity,
            self.workers,
            csv_field(&self.probe),
            csv_field(&self.profile),
            csv_field(&self.scenario),
            elapsed,
            self.attempts
        )
    }
}

/// Quote a field when it contains a separator, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Receives validation outcomes for persistence
pub trait ResultRecorder: Send + Sync {
    fn append(&self, rows: &[ReportRow]) -> Result<()>;

    /// Convert and append a whole result
    fn record(&self, result: &ValidationResult, meta: &ScenarioMeta) -> Result<()> {
        self.append(&ReportRow::from_result(result, meta))
    }
}

/// Append-only CSV file; the header is written when the file is created
pub struct CsvReport {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultRecorder for CsvReport {
    fn append(&self, rows: &[ReportRow]) -> Result<()> {
        let _guard = self.lock.lock();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let needs_header = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                ConsistencyError::Report(format!("cannot open {:?}: {}", self.path, e))
            })?;

        let mut buf = String::new();
        if needs_header {
            buf.push_str(CSV_HEADER);
            buf.push('\n');
        }
        for row in rows {
            buf.push_str(&row.to_csv_line());
            buf.push('\n');
        }

        file.write_all(buf.as_bytes())?;
        debug!("appended {} row(s) to {:?}", rows.len(), self.path);
        Ok(())
    }
}
