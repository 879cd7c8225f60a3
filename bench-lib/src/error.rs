//! Error taxonomy for a benchmark run.
//!
//! Every variant is fatal: this is a measurement tool, and masking a fault
//! with a retry would corrupt the latency and throughput numbers it exists
//! to produce.

use std::io;

use thiserror::Error;

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value, detected before any connection attempt.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A connection could not be established. Partial concurrency would
    /// bias the measurements, so the whole run aborts.
    #[error("could not connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Non-would-block I/O failure on an established connection.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The reply parser reported malformed or error-typed content.
    #[error("protocol error: {0}")]
    Protocol(String),
}
