//! Immutable run configuration.
//!
//! A [`Config`] is created once from external input and passed by reference
//! into the pool and driver at construction; nothing in the engine mutates
//! it mid-run.

use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Largest accepted payload size in bytes (1 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 1_048_576;

/// Where the benchmarked service listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp { host, port } => write!(f, "{host}:{port}"),
            Target::Unix { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Immutable configuration for one benchmark run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of parallel sessions kept live while the budget lasts.
    pub concurrency: usize,
    /// Total request budget for the run.
    pub requests: usize,
    /// Payload size used by the command suite; reported, not interpreted.
    pub payload_size: usize,
    /// Reuse connections for successive requests instead of reconnecting.
    pub keep_alive: bool,
    /// Randomized key space; 0 disables key randomization.
    pub random_keyspace: u64,
    /// Only emit the title and requests/second line.
    pub quiet: bool,
    /// Re-run the configured suite forever.
    pub loop_forever: bool,
    pub target: Target,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 50,
            requests: 10_000,
            payload_size: 3,
            keep_alive: true,
            random_keyspace: 0,
            quiet: false,
            loop_forever: false,
            target: Target::Tcp {
                host: "127.0.0.1".to_owned(),
                port: 6379,
            },
        }
    }
}

impl Config {
    /// Validate all field ranges. Called before any connection is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be positive".to_owned()));
        }
        if self.requests == 0 {
            return Err(Error::Config("request budget must be positive".to_owned()));
        }
        if self.payload_size == 0 || self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(Error::Config(format!(
                "payload size must be within 1..={MAX_PAYLOAD_SIZE} bytes, got {}",
                self.payload_size
            )));
        }
        Ok(())
    }
}
