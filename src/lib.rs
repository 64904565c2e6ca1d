//! Library crate for sweepscan: a bounded-concurrency TCP port scanner and
//! host discovery sweep with cooperative cancellation and progress events.
pub mod config;
pub mod error;
pub mod hosts;
pub mod netdetect;
pub mod ports;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod services;
pub mod types;

pub use error::{Error, Result};
pub use scanner::{Phase, ScanCoordinator};
