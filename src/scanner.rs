//! Scan coordinator: drives one scan from validation to its final report.
//!
//! Units are dispatched in enumeration order onto tokio tasks, bounded by a
//! `Semaphore` holding `concurrency` permits. A permit is acquired *before*
//! spawning, so at most `concurrency` probes ever run at once. Cancellation
//! is cooperative: the `CancellationToken` only stops further dispatch and
//! in-flight probes finish on their own timeout.

use crate::config::MAX_CONCURRENCY;
use crate::error::{Error, Result};
use crate::probe::{Endpoint, Prober, TcpProber};
use crate::report::aggregate;
use crate::types::{
    ProbeOutcome, ProbeUnit, ProbeVerdict, ProgressEvent, ScanKind, ScanReport, ScanSpec,
    ScanState, ScanStatus,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, trace, warn, Instrument};

/// Progress observer. Invoked from whichever task completed the unit.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Lifecycle of a coordinator. Terminal phases are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Cancelled | Phase::Failed)
    }
}

/// Runs exactly one scan. Create a fresh coordinator for every scan.
pub struct ScanCoordinator {
    prober: Arc<dyn Prober>,
    cancel: CancellationToken,
    observers: Vec<ProgressCallback>,
    phase: Phase,
    report: Option<ScanReport>,
}

impl Default for ScanCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanCoordinator {
    /// Coordinator backed by real TCP connects and the system ping.
    pub fn new() -> Self {
        Self::with_prober(Arc::new(TcpProber))
    }

    pub fn with_prober(prober: Arc<dyn Prober>) -> Self {
        Self {
            prober,
            cancel: CancellationToken::new(),
            observers: Vec::new(),
            phase: Phase::Idle,
            report: None,
        }
    }

    /// Use an externally owned token, e.g. a child of an application-wide one.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for requesting cancellation from another task or thread.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching new probes. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Register a progress observer. Must be called before [`start`](Self::start);
    /// observers are released when `start` returns.
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
    }

    /// Progress events as a channel. The sender side is dropped on any return
    /// from [`start`](Self::start), rejected or not, which ends the stream.
    pub fn progress_channel(&mut self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Final report; `None` until the scan is terminal.
    pub fn result(&self) -> Option<&ScanReport> {
        self.report.as_ref().filter(|_| self.phase.is_terminal())
    }

    /// Validate, resolve and run the scan to a terminal phase.
    ///
    /// Validation errors leave the coordinator `Idle` with no observers. A
    /// resolution error moves it to `Failed` (the failed report stays
    /// available via [`result`](Self::result)).
    pub async fn start(&mut self, spec: ScanSpec) -> Result<&ScanReport> {
        if self.phase != Phase::Idle {
            self.observers.clear();
            return Err(Error::validation(
                "coordinator already used; create a new one per scan",
            ));
        }
        let kind = match validate(&spec) {
            Ok(kind) => kind,
            Err(e) => {
                // closes progress channels
                self.observers.clear();
                return Err(e);
            }
        };

        let started = Instant::now();
        let span = info_span!("scan", scan_target = %spec.target, units = spec.units.len());

        let endpoints = match self.resolve(&spec, kind).instrument(span.clone()).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!(parent: &span, code = e.code(), error = %e, "scan aborted before dispatch");
                let total = spec.units.len() as u64;
                let report = ScanReport::failed(&spec.target, kind, total, started.elapsed());
                self.finish(Phase::Failed, report);
                return Err(e);
            }
        };

        self.phase = Phase::Running;
        let state = self.run(&spec, endpoints).instrument(span.clone()).await;
        let report = aggregate(&state, &spec.target, kind, started.elapsed());

        let phase = match report.status {
            ScanStatus::Cancelled => Phase::Cancelled,
            _ => Phase::Completed,
        };
        debug!(
            parent: &span,
            status = report.status.as_str(),
            completed = report.completed_units,
            hits = report.hits.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "scan finished"
        );
        Ok(self.finish(phase, report))
    }

    fn finish(&mut self, phase: Phase, report: ScanReport) -> &ScanReport {
        self.phase = phase;
        // closes progress channels
        self.observers.clear();
        self.report.insert(report)
    }

    async fn resolve(&self, spec: &ScanSpec, kind: ScanKind) -> Result<Vec<Endpoint>> {
        match kind {
            ScanKind::PortScan => {
                let ip = self.prober.resolve(&spec.target).await?;
                Ok(spec
                    .units
                    .iter()
                    .filter_map(ProbeUnit::port)
                    .map(|port| Endpoint::Port(SocketAddr::new(ip, port)))
                    .collect())
            }
            ScanKind::HostDiscovery => {
                let mut endpoints = Vec::with_capacity(spec.units.len());
                for unit in &spec.units {
                    if let ProbeUnit::Host(host) = unit {
                        endpoints.push(Endpoint::Host(self.prober.resolve(host).await?));
                    }
                }
                Ok(endpoints)
            }
        }
    }

    async fn run(&self, spec: &ScanSpec, endpoints: Vec<Endpoint>) -> ScanState {
        let total = spec.units.len() as u64;
        let limit = spec.concurrency.min(MAX_CONCURRENCY);
        if limit < spec.concurrency {
            debug!(requested = spec.concurrency, limit, "concurrency clamped");
        }

        let state = Arc::new(Mutex::new(ScanState::new(total)));
        let observers: Arc<[ProgressCallback]> = self.observers.clone().into();
        let sem = Arc::new(Semaphore::new(limit));
        let mut set = JoinSet::new();

        debug!(
            total,
            limit,
            timeout_ms = spec.timeout.as_millis() as u64,
            "dispatching probes"
        );

        let units = spec.units.iter().cloned().zip(endpoints);
        for (index, (unit, endpoint)) in units.enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = sem.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                debug!(dispatched = index, "dispatch stopped");
                break;
            };

            let prober = self.prober.clone();
            let state = state.clone();
            let observers = observers.clone();
            let cancel = self.cancel.clone();
            let timeout = spec.timeout;

            set.spawn(async move {
                let _permit = permit; // held until the outcome is recorded and reported
                let verdict = prober.probe(endpoint, timeout).await;
                let event = record(&state, &cancel, index, unit, verdict);
                for observer in observers.iter() {
                    observer(&event);
                }
            });
        }

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "probe task did not complete");
            }
        }

        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cancel.is_cancelled() && guard.completed < guard.total {
            guard.cancelled = true;
        }
        std::mem::take(&mut *guard)
    }
}

/// Reject specs that must never reach `Running`.
fn validate(spec: &ScanSpec) -> Result<ScanKind> {
    let Some(kind) = spec.kind() else {
        return Err(Error::validation("no probe units"));
    };
    if spec.concurrency == 0 {
        return Err(Error::validation(
            "concurrency limit must be greater than zero",
        ));
    }
    if spec.units.iter().any(|u| u.kind() != kind) {
        return Err(Error::validation("cannot mix ports and hosts in one scan"));
    }
    if spec.units.contains(&ProbeUnit::Port(0)) {
        return Err(Error::validation("invalid port 0"));
    }
    Ok(kind)
}

/// Record one outcome and bump counters under a single lock.
fn record(
    state: &Mutex<ScanState>,
    cancel: &CancellationToken,
    index: usize,
    unit: ProbeUnit,
    verdict: ProbeVerdict,
) -> ProgressEvent {
    let mut s = state.lock().unwrap_or_else(PoisonError::into_inner);
    // completed < total here, so a pending cancel predates completion
    if cancel.is_cancelled() {
        s.cancelled = true;
    }
    s.completed += 1;

    let outcome = ProbeOutcome {
        index,
        unit,
        reachable: verdict.reachable,
        error: verdict.error,
        rtt: verdict.rtt,
        sequence: s.completed,
    };
    trace!(index, unit = %outcome.unit, reachable = outcome.reachable, "recorded");
    if outcome.reachable {
        s.hits.push(outcome.clone());
    }

    ProgressEvent {
        completed: s.completed,
        total: s.total,
        outcome,
    }
}
