use async_trait::async_trait;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sweepscan::hosts::parse_host_range;
use sweepscan::ports::parse_port_spec;
use sweepscan::probe::{Endpoint, Prober};
use sweepscan::types::{ProbeError, ProbeUnit, ProbeVerdict, ProgressEvent, ScanSpec, ScanStatus};
use sweepscan::{Error, Phase, ScanCoordinator};

/// Prober with a fixed set of open ports / live hosts and a fixed probe delay.
#[derive(Default)]
struct ScriptedProber {
    open_ports: HashSet<u16>,
    alive_hosts: HashSet<IpAddr>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<Endpoint>>,
}

impl ScriptedProber {
    fn with_open_ports(ports: &[u16]) -> Self {
        Self {
            open_ports: ports.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn resolve(&self, target: &str) -> sweepscan::Result<IpAddr> {
        target.parse().map_err(|_| Error::Resolution {
            target: target.to_string(),
        })
    }

    async fn probe(&self, endpoint: Endpoint, _timeout: Duration) -> ProbeVerdict {
        self.started.lock().unwrap().push(endpoint);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let open = match endpoint {
            Endpoint::Port(addr) => self.open_ports.contains(&addr.port()),
            Endpoint::Host(ip) => self.alive_hosts.contains(&ip),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if open {
            ProbeVerdict::reachable(Duration::from_millis(1))
        } else {
            ProbeVerdict::unreachable(ProbeError::Refused)
        }
    }
}

fn port_spec(spec: &str, concurrency: usize) -> ScanSpec {
    ScanSpec::new(
        "192.0.2.10",
        parse_port_spec(spec),
        Duration::from_millis(100),
        concurrency,
    )
}

#[tokio::test]
async fn open_ports_reported_with_labels() {
    let prober = Arc::new(ScriptedProber::with_open_ports(&[22, 80]));
    let mut coordinator = ScanCoordinator::with_prober(prober);

    let report = coordinator.start(port_spec("22,80,9999", 3)).await.unwrap().clone();

    assert_eq!(report.status, ScanStatus::Completed);
    assert_eq!(report.completed_units, 3);
    assert_eq!(report.total_units, 3);
    let hits: Vec<(u16, &str)> = report
        .hits
        .iter()
        .map(|h| (h.unit.port().unwrap(), h.label.as_deref().unwrap()))
        .collect();
    assert_eq!(hits, vec![(22, "SSH"), (80, "HTTP")]);
    assert_eq!(coordinator.phase(), Phase::Completed);
    assert_eq!(coordinator.result(), Some(&report));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn closed_range_completes_without_hits() {
    let prober = Arc::new(ScriptedProber::default().delay(Duration::from_millis(1)));
    let mut coordinator = ScanCoordinator::with_prober(prober.clone());

    let report = coordinator.start(port_spec("1-100", 10)).await.unwrap();

    assert_eq!(report.completed_units, 100);
    assert!(report.hits.is_empty());
    assert_eq!(report.status, ScanStatus::Completed);
    assert!(prober.max_in_flight.load(Ordering::SeqCst) <= 10);
}

#[tokio::test]
async fn host_sweep_finds_single_live_host() {
    let prober = Arc::new(ScriptedProber {
        alive_hosts: ["10.0.0.3".parse().unwrap()].into_iter().collect(),
        ..ScriptedProber::default()
    });
    let mut coordinator = ScanCoordinator::with_prober(prober);
    let spec = ScanSpec::new(
        "10.0.0.1-5",
        parse_host_range("10.0.0.1-5"),
        Duration::from_millis(100),
        5,
    );

    let report = coordinator.start(spec).await.unwrap();

    assert_eq!(report.completed_units, 5);
    assert_eq!(report.status, ScanStatus::Completed);
    assert_eq!(report.hits.len(), 1);
    assert_eq!(report.hits[0].unit, ProbeUnit::Host("10.0.0.3".into()));
    assert_eq!(report.hits[0].index, 2);
    assert_eq!(report.hits[0].label, None);
}

#[tokio::test]
async fn cancel_mid_scan_stops_dispatch() {
    let prober = Arc::new(ScriptedProber::default().delay(Duration::from_millis(5)));
    let mut coordinator = ScanCoordinator::with_prober(prober.clone());
    let limit = 10;

    let token = coordinator.cancel_token();
    coordinator.subscribe(move |event| {
        if event.completed >= 50 {
            token.cancel();
        }
    });

    let report = coordinator.start(port_spec("1-500", limit)).await.unwrap();

    assert_eq!(report.status, ScanStatus::Cancelled);
    assert!(report.completed_units >= 50);
    assert!(report.completed_units < 50 + limit as u64);
    assert_eq!(coordinator.phase(), Phase::Cancelled);
    // nothing was dispatched beyond what could be in flight at cancel time
    assert!(prober.started.lock().unwrap().len() < 50 + limit);
}

#[tokio::test]
async fn cancel_before_start_dispatches_nothing() {
    let prober = Arc::new(ScriptedProber::default());
    let mut coordinator = ScanCoordinator::with_prober(prober.clone());
    coordinator.cancel();
    coordinator.cancel();

    let report = coordinator.start(port_spec("1-20", 4)).await.unwrap();

    assert_eq!(report.status, ScanStatus::Cancelled);
    assert_eq!(report.completed_units, 0);
    assert!(prober.started.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_exceeds_concurrency_limit() {
    let prober = Arc::new(ScriptedProber::default().delay(Duration::from_millis(2)));
    let mut coordinator = ScanCoordinator::with_prober(prober.clone());

    let report = coordinator.start(port_spec("1-200", 7)).await.unwrap();

    assert_eq!(report.completed_units, 200);
    let max = prober.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 7, "observed {max} probes in flight");
}

#[tokio::test]
async fn dispatch_follows_enumeration_order() {
    let prober = Arc::new(ScriptedProber::default());
    let mut coordinator = ScanCoordinator::with_prober(prober.clone());

    coordinator.start(port_spec("9,3,7,1", 1)).await.unwrap();

    let started: Vec<u16> = prober
        .started
        .lock()
        .unwrap()
        .iter()
        .map(|e| match e {
            Endpoint::Port(addr) => addr.port(),
            Endpoint::Host(_) => unreachable!(),
        })
        .collect();
    assert_eq!(started, vec![9, 3, 7, 1]);
}

/// Lower ports answer slower, so completion order is the reverse of enumeration order.
struct SlowLowPorts;

#[async_trait]
impl Prober for SlowLowPorts {
    async fn resolve(&self, target: &str) -> sweepscan::Result<IpAddr> {
        target.parse().map_err(|_| Error::Resolution {
            target: target.to_string(),
        })
    }

    async fn probe(&self, endpoint: Endpoint, _timeout: Duration) -> ProbeVerdict {
        let Endpoint::Port(addr) = endpoint else {
            return ProbeVerdict::unreachable(ProbeError::Network);
        };
        let wait = 5 * (11 - u64::from(addr.port()));
        tokio::time::sleep(Duration::from_millis(wait)).await;
        ProbeVerdict::reachable(Duration::from_millis(wait))
    }
}

#[tokio::test]
async fn report_hits_sorted_regardless_of_completion_order() {
    let mut coordinator = ScanCoordinator::with_prober(Arc::new(SlowLowPorts));
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let sink = arrivals.clone();
    coordinator.subscribe(move |event: &ProgressEvent| {
        sink.lock().unwrap().push(event.outcome.index);
    });

    let report = coordinator.start(port_spec("1-10", 10)).await.unwrap();

    let indexes: Vec<usize> = report.hits.iter().map(|h| h.index).collect();
    assert_eq!(indexes, (0..10).collect::<Vec<_>>());
    let arrivals = arrivals.lock().unwrap();
    assert_eq!(arrivals.first(), Some(&9));
    assert_eq!(arrivals.len(), 10);
}

#[tokio::test]
async fn duplicate_ports_are_probed_twice() {
    let prober = Arc::new(ScriptedProber::with_open_ports(&[80]));
    let mut coordinator = ScanCoordinator::with_prober(prober.clone());

    let report = coordinator.start(port_spec("80,80", 2)).await.unwrap();

    assert_eq!(report.completed_units, 2);
    let indexes: Vec<usize> = report.hits.iter().map(|h| h.index).collect();
    assert_eq!(indexes, vec![0, 1]);
    assert_eq!(prober.started.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn progress_channel_sees_every_outcome_then_closes() {
    let prober = Arc::new(ScriptedProber::with_open_ports(&[5]));
    let mut coordinator = ScanCoordinator::with_prober(prober);
    let mut rx = coordinator.progress_channel();

    let report = coordinator.start(port_spec("1-30", 4)).await.unwrap().clone();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len() as u64, report.completed_units);
    assert!(events.iter().all(|e| e.completed <= e.total && e.total == 30));

    let mut seqs: Vec<u64> = events.iter().map(|e| e.outcome.sequence).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=30).collect::<Vec<_>>());

    let mut indexes: Vec<usize> = events.iter().map(|e| e.outcome.index).collect();
    indexes.sort_unstable();
    indexes.dedup();
    assert_eq!(indexes.len(), 30);
}

#[tokio::test]
async fn unresolvable_target_fails_without_dispatch() {
    let prober = Arc::new(ScriptedProber::default());
    let mut coordinator = ScanCoordinator::with_prober(prober.clone());
    let spec = ScanSpec::new(
        "no.such.host.invalid",
        parse_port_spec("80"),
        Duration::from_millis(100),
        4,
    );

    let err = coordinator.start(spec).await.unwrap_err();

    assert!(matches!(err, Error::Resolution { .. }));
    assert_eq!(coordinator.phase(), Phase::Failed);
    let report = coordinator.result().unwrap();
    assert_eq!(report.status, ScanStatus::Failed);
    assert_eq!(report.completed_units, 0);
    assert!(report.hits.is_empty());
    assert!(prober.started.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unresolvable_host_unit_fails_whole_sweep() {
    let prober = Arc::new(ScriptedProber::default());
    let mut coordinator = ScanCoordinator::with_prober(prober);
    let spec = ScanSpec::new(
        "sweep",
        vec![
            ProbeUnit::Host("10.0.0.1".into()),
            ProbeUnit::Host("bogus".into()),
        ],
        Duration::from_millis(100),
        2,
    );

    assert!(matches!(
        coordinator.start(spec).await,
        Err(Error::Resolution { .. })
    ));
    assert_eq!(coordinator.phase(), Phase::Failed);
}

#[tokio::test]
async fn validation_errors_leave_coordinator_idle() {
    let mut coordinator = ScanCoordinator::with_prober(Arc::new(ScriptedProber::default()));

    let empty = coordinator.start(port_spec("not-a-port", 4)).await;
    assert!(matches!(empty, Err(Error::Validation(_))));
    assert_eq!(coordinator.phase(), Phase::Idle);
    assert!(coordinator.result().is_none());

    let zero = coordinator.start(port_spec("80", 0)).await;
    assert!(matches!(zero, Err(Error::Validation(_))));
    assert_eq!(coordinator.phase(), Phase::Idle);

    // still usable after a rejected start
    let report = coordinator.start(port_spec("80", 1)).await.unwrap();
    assert_eq!(report.status, ScanStatus::Completed);
}

#[tokio::test]
async fn rejected_start_closes_progress_channel() {
    let prober = Arc::new(ScriptedProber::default());
    let mut coordinator = ScanCoordinator::with_prober(prober.clone());
    let mut rx = coordinator.progress_channel();

    let err = coordinator.start(port_spec("0-3", 4)).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let next = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("channel closes after a rejected start");
    assert!(next.is_none());
    assert!(prober.started.lock().unwrap().is_empty());
}

#[tokio::test]
async fn coordinator_is_single_use() {
    let mut coordinator = ScanCoordinator::with_prober(Arc::new(ScriptedProber::default()));
    coordinator.start(port_spec("80", 1)).await.unwrap();

    let again = coordinator.start(port_spec("81", 1)).await;
    assert!(matches!(again, Err(Error::Validation(_))));
    assert_eq!(coordinator.phase(), Phase::Completed);
    assert_eq!(
        coordinator.result().map(|r| r.completed_units),
        Some(1)
    );
}
