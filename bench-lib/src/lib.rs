//! Concurrent load-generation and latency-measurement engine for
//! request/response network services.
//!
//! The engine opens and sustains many simultaneous connections to a target,
//! issues a stream of pre-encoded requests per connection, times each
//! round-trip against a local monotonic clock, and aggregates the results
//! into a throughput and latency-percentile report. It never interprets the
//! wire protocol: the caller provides an encoded [`RequestTemplate`] and a
//! [`ReplyParser`] that signals reply completion.
//!
//! Everything runs on a single thread driven by the [`driver::EventDriver`]
//! readiness reactor; the only concurrency is logical, at I/O-readiness
//! granularity.

#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod config;
pub mod conn;
pub mod driver;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod recorder;
pub mod report;
pub mod runner;
pub mod session;

pub use self::{
    config::{Config, Target},
    error::{Error, Result},
    protocol::{Feed, ParserFactory, RAND_KEY_WIDTH, ReplyParser, RequestTemplate},
    report::Report,
    runner::run_benchmark,
};
