//! Scan tuning: speed tiers and engine defaults.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of probes allowed in flight.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Hard ceiling on the concurrency budget, whatever the caller asks for.
pub const MAX_CONCURRENCY: usize = 5_000;

/// Per-probe timeout tiers offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanSpeed {
    /// 0.1s per probe
    Fast,
    /// 0.5s per probe
    #[default]
    Normal,
    /// 1.0s per probe
    Slow,
    /// 2.0s per probe
    VerySlow,
}

impl ScanSpeed {
    pub fn timeout(self) -> Duration {
        match self {
            ScanSpeed::Fast => Duration::from_millis(100),
            ScanSpeed::Normal => Duration::from_millis(500),
            ScanSpeed::Slow => Duration::from_secs(1),
            ScanSpeed::VerySlow => Duration::from_secs(2),
        }
    }
}

/// Options a front-end collects before building a [`ScanSpec`](crate::types::ScanSpec).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    #[serde(default)]
    pub speed: ScanSpeed,
    /// Explicit timeout; overrides the speed tier when set.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            speed: ScanSpeed::default(),
            timeout_ms: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ScanOptions {
    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.speed.timeout())
    }
}
