use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One discrete thing to test: a TCP port on the scan target, or a host to sweep.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProbeUnit {
    Port(u16),
    Host(String),
}

impl ProbeUnit {
    pub fn port(&self) -> Option<u16> {
        match self {
            ProbeUnit::Port(p) => Some(*p),
            ProbeUnit::Host(_) => None,
        }
    }

    pub fn kind(&self) -> ScanKind {
        match self {
            ProbeUnit::Port(_) => ScanKind::PortScan,
            ProbeUnit::Host(_) => ScanKind::HostDiscovery,
        }
    }
}

impl fmt::Display for ProbeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeUnit::Port(p) => write!(f, "{p}"),
            ProbeUnit::Host(h) => f.write_str(h),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    PortScan,
    HostDiscovery,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::PortScan => "port_scan",
            ScanKind::HostDiscovery => "host_discovery",
        }
    }
}

/// Why a probe came back unreachable. Never aborts a scan.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeError {
    Refused,
    TimedOut,
    Network,
    /// Ping ran and reported failure.
    PingFailed,
    /// Ping could not be spawned or did not exit in time.
    PingUnavailable,
}

/// Raw result of a single probe, before the coordinator stamps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeVerdict {
    pub reachable: bool,
    pub error: Option<ProbeError>,
    pub rtt: Option<Duration>,
}

impl ProbeVerdict {
    pub fn reachable(rtt: Duration) -> Self {
        Self {
            reachable: true,
            error: None,
            rtt: Some(rtt),
        }
    }

    pub fn unreachable(error: ProbeError) -> Self {
        Self {
            reachable: false,
            error: Some(error),
            rtt: None,
        }
    }
}

/// Recorded outcome of one attempted unit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Position of the unit in the enumerated sequence.
    pub index: usize,
    pub unit: ProbeUnit,
    pub reachable: bool,
    pub error: Option<ProbeError>,
    pub rtt: Option<Duration>,
    /// 1-based completion order within the scan.
    pub sequence: u64,
}

/// Scan request. Moved into the coordinator on start.
#[derive(Debug, Clone)]
pub struct ScanSpec {
    pub target: String,
    pub units: Vec<ProbeUnit>,
    pub timeout: Duration,
    pub concurrency: usize,
}

impl ScanSpec {
    pub fn new(
        target: impl Into<String>,
        units: Vec<ProbeUnit>,
        timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            target: target.into(),
            units,
            timeout,
            concurrency,
        }
    }

    /// Kind of the first unit; `None` for an empty spec.
    pub fn kind(&self) -> Option<ScanKind> {
        self.units.first().map(ProbeUnit::kind)
    }
}

/// Mutable per-scan state owned by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanState {
    pub total: u64,
    pub completed: u64,
    /// Reachable outcomes in arrival order.
    pub hits: Vec<ProbeOutcome>,
    pub cancelled: bool,
}

impl ScanState {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Completed,
    Cancelled,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled",
            ScanStatus::Failed => "failed",
        }
    }
}

/// A reachable unit as it appears in the final report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub index: usize,
    pub unit: ProbeUnit,
    /// Service label, port scans only.
    pub label: Option<String>,
    pub rtt: Option<Duration>,
}

/// Immutable summary of a finished scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub target: String,
    pub kind: ScanKind,
    pub total_units: u64,
    pub completed_units: u64,
    pub hits: Vec<Hit>,
    pub elapsed: Duration,
    pub status: ScanStatus,
}

/// Payload delivered to progress observers.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub completed: u64,
    pub total: u64,
    pub outcome: ProbeOutcome,
}
