//! Error types for the probe engine.
//!
//! Only spec-level and resolution-level problems are errors. A closed port or
//! a silent host is a normal [`ProbeOutcome`](crate::types::ProbeOutcome).

use thiserror::Error;

/// Result type alias using the engine error.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The scan request is unusable: no units, bad concurrency, bad port.
    #[error("invalid scan: {0}")]
    Validation(String),

    /// The target (or a discovery host) does not resolve to an address.
    #[error("cannot resolve target: {target}")]
    Resolution { target: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Short code used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION",
            Error::Resolution { .. } => "RESOLUTION",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
        }
    }
}
