use crate::error::Result;
use crate::services;
use crate::types::{Hit, ScanKind, ScanReport, ScanState, ScanStatus};
use ::time::{format_description::well_known, OffsetDateTime};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reduce a frozen scan state into its report.
///
/// Hits are sorted by enumeration index and port hits get their service
/// label. Pure: the same state always yields the same report.
pub fn aggregate(
    state: &ScanState,
    target: &str,
    kind: ScanKind,
    elapsed: Duration,
) -> ScanReport {
    let mut hits: Vec<Hit> = state
        .hits
        .iter()
        .filter(|o| o.reachable)
        .map(|o| Hit {
            index: o.index,
            unit: o.unit.clone(),
            label: o.unit.port().map(|p| services::classify(p).to_string()),
            rtt: o.rtt,
        })
        .collect();
    hits.sort_by_key(|h| h.index);

    let status = if state.cancelled {
        ScanStatus::Cancelled
    } else {
        ScanStatus::Completed
    };

    ScanReport {
        target: target.to_string(),
        kind,
        total_units: state.total,
        completed_units: state.completed,
        hits,
        elapsed,
        status,
    }
}

impl ScanReport {
    /// Report for a scan that aborted before dispatching anything.
    pub fn failed(target: &str, kind: ScanKind, total_units: u64, elapsed: Duration) -> Self {
        Self {
            target: target.to_string(),
            kind,
            total_units,
            completed_units: 0,
            hits: Vec::new(),
            elapsed,
            status: ScanStatus::Failed,
        }
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }
}

/// Flat record handed to a history store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub recorded_at: String,
    pub scan_type: String,
    pub target: String,
    pub units_scanned: u64,
    pub hits_found: u64,
    /// Hit values in report order: port numbers or host addresses.
    pub hits: Vec<String>,
    pub duration_secs: f64,
    pub status: String,
}

impl ScanRecord {
    pub fn from_report(report: &ScanReport) -> Self {
        Self {
            recorded_at: now_rfc3339(),
            scan_type: report.kind.as_str().to_string(),
            target: report.target.clone(),
            units_scanned: report.completed_units,
            hits_found: report.hits.len() as u64,
            hits: report.hits.iter().map(|h| h.unit.to_string()).collect(),
            duration_secs: report.elapsed.as_secs_f64(),
            status: report.status.as_str().to_string(),
        }
    }
}

/// Persistence seam. The engine knows nothing beyond the record shape.
pub trait ReportSink {
    fn persist(&self, record: &ScanRecord) -> Result<()>;
}

/// Writes a single record as pretty JSON, replacing the file.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for JsonFileSink {
    fn persist(&self, record: &ScanRecord) -> Result<()> {
        let file = File::create(&self.path)?;
        serde_json::to_writer_pretty(file, record)?;
        Ok(())
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
