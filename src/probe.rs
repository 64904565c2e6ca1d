//! Single-endpoint reachability probes.
//!
//! A probe never fails: refused, timed out and unroutable endpoints all come
//! back as an unreachable [`ProbeVerdict`]. Only target resolution can error.

use crate::error::{Error, Result};
use crate::types::{ProbeError, ProbeVerdict};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::process::Command;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Ports tried in order when deciding whether a host is alive.
pub const DISCOVERY_PORTS: &[u16] = &[80, 443, 22, 21, 23, 25, 53, 135, 139, 445];

/// Upper bound on the ping fallback, including process start-up.
pub const PING_DEADLINE: Duration = Duration::from_secs(3);

/// A resolved thing to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP connect to a single port.
    Port(SocketAddr),
    /// Liveness check of a whole host.
    Host(IpAddr),
}

/// Probe implementation used by the coordinator.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Resolve a target name to an address. Called once per scan target
    /// (or once per host for discovery) before anything is dispatched.
    async fn resolve(&self, target: &str) -> Result<IpAddr> {
        resolve_target(target).await
    }

    async fn probe(&self, endpoint: Endpoint, timeout: Duration) -> ProbeVerdict;
}

/// Real network prober: TCP connects plus the system `ping` fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, endpoint: Endpoint, timeout: Duration) -> ProbeVerdict {
        match endpoint {
            Endpoint::Port(addr) => probe_port(addr, timeout).await,
            Endpoint::Host(ip) => probe_host(ip, timeout).await,
        }
    }
}

/// Resolve an IP literal or hostname, preferring IPv4 answers.
pub async fn resolve_target(target: &str) -> Result<IpAddr> {
    let target = target.trim();
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    let unresolved = || Error::Resolution {
        target: target.to_string(),
    };
    if target.is_empty() {
        return Err(unresolved());
    }

    let addrs: Vec<SocketAddr> = lookup_host((target, 0))
        .await
        .map_err(|e| {
            debug!(host = target, error = %e, "lookup failed");
            unresolved()
        })?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(|a| a.ip())
        .ok_or_else(unresolved)
}

/// Attempt one TCP connection bounded by `timeout`. The socket is closed on return.
pub async fn probe_port(addr: SocketAddr, timeout: Duration) -> ProbeVerdict {
    let start = Instant::now();
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => {
            trace!(%addr, "open");
            ProbeVerdict::reachable(start.elapsed())
        }
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
            trace!(%addr, "refused");
            ProbeVerdict::unreachable(ProbeError::Refused)
        }
        Ok(Err(e)) => {
            trace!(%addr, error = %e, "connect error");
            ProbeVerdict::unreachable(ProbeError::Network)
        }
        Err(_) => {
            trace!(%addr, "timeout");
            ProbeVerdict::unreachable(ProbeError::TimedOut)
        }
    }
}

/// Decide whether a host is alive.
///
/// Tries [`DISCOVERY_PORTS`] in sequence, each bounded by `timeout`, and only
/// then falls back to one system ping. Hosts that filter every probed port and
/// drop ICMP are reported unreachable.
pub async fn probe_host(ip: IpAddr, timeout: Duration) -> ProbeVerdict {
    probe_host_on(ip, DISCOVERY_PORTS, timeout).await
}

/// [`probe_host`] with an explicit port list. Stops at the first port that
/// connects; the ping runs only after every port failed.
pub async fn probe_host_on(ip: IpAddr, ports: &[u16], timeout: Duration) -> ProbeVerdict {
    for &port in ports {
        let verdict = probe_port(SocketAddr::new(ip, port), timeout).await;
        if verdict.reachable {
            return verdict;
        }
    }
    ping(ip).await
}

async fn ping(ip: IpAddr) -> ProbeVerdict {
    let start = Instant::now();
    let mut cmd = Command::new("ping");
    cmd.args(ping_args(ip))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match time::timeout(PING_DEADLINE, cmd.status()).await {
        Ok(Ok(status)) if status.success() => {
            trace!(%ip, "ping reply");
            ProbeVerdict::reachable(start.elapsed())
        }
        Ok(Ok(_)) => ProbeVerdict::unreachable(ProbeError::PingFailed),
        Ok(Err(e)) => {
            debug!(%ip, error = %e, "ping could not be spawned");
            ProbeVerdict::unreachable(ProbeError::PingUnavailable)
        }
        Err(_) => {
            debug!(%ip, "ping deadline exceeded");
            ProbeVerdict::unreachable(ProbeError::PingUnavailable)
        }
    }
}

fn ping_args(ip: IpAddr) -> Vec<String> {
    let host = ip.to_string();
    if cfg!(windows) {
        vec!["-n".into(), "1".into(), "-w".into(), "1000".into(), host]
    } else {
        vec!["-c".into(), "1".into(), "-W".into(), "1".into(), host]
    }
}
