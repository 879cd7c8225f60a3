//! Per-connection request/reply state machine.
//!
//! A session moves `Idle → Writing → AwaitingReply`, then back to `Idle`
//! (keep-alive) or to `Retired`. At most one request is outstanding per
//! session.

use std::io;
use std::time::Instant;

use rand::Rng as _;
use rand::rngs::SmallRng;

use crate::conn::ConnectionHandle;
use crate::driver::Token;
use crate::error::{Error, Result};
use crate::protocol::{Feed, RAND_KEY_WIDTH, ReplyParser, RequestTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Idle,
    Writing,
    AwaitingReply,
    Retired,
}

/// Flush progress of the current request buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteProgress {
    /// The OS accepted only part of the buffer; stay subscribed to writable.
    Pending,
    /// The full request is flushed; switch the subscription to readable.
    Sent,
}

/// Overwrite each recorded offset with a fixed-width zero-padded decimal
/// drawn uniformly from `[0, keyspace)`.
pub(crate) fn randomize_keys(
    buf: &mut [u8],
    offsets: &[usize],
    rng: &mut SmallRng,
    keyspace: u64,
) {
    for &off in offsets {
        let key = rng.random_range(0..keyspace);
        let digits = format!("{key:0width$}", width = RAND_KEY_WIDTH);
        buf[off..off + RAND_KEY_WIDTH].copy_from_slice(digits.as_bytes());
    }
}

pub struct RequestSession {
    token: Token,
    conn: ConnectionHandle,
    /// Private write window: a copy of the shared template. Only the
    /// randomization offsets inside this copy are ever rewritten.
    obuf: Vec<u8>,
    rand_offsets: std::sync::Arc<[usize]>,
    written: usize,
    state: SessionState,
    start: Option<Instant>,
    latency_us: Option<u64>,
    parser: Box<dyn ReplyParser>,
}

impl RequestSession {
    pub(crate) fn new(
        token: Token,
        conn: ConnectionHandle,
        template: &RequestTemplate,
        parser: Box<dyn ReplyParser>,
    ) -> Self {
        Self {
            token,
            conn,
            obuf: template.bytes().to_vec(),
            rand_offsets: template.rand_offsets(),
            written: 0,
            state: SessionState::Idle,
            start: None,
            latency_us: None,
            parser,
        }
    }

    pub(crate) fn token(&self) -> Token {
        self.token
    }

    pub(crate) fn fd(&self) -> std::os::fd::RawFd {
        self.conn.fd()
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    /// `Idle → Writing`: rewrite randomized keys, capture the monotonic
    /// start timestamp, reset the write cursor. The timer deliberately
    /// starts at send, not at connect.
    pub(crate) fn begin_request(&mut self, rng: &mut SmallRng, keyspace: u64) {
        debug_assert_eq!(self.state, SessionState::Idle);
        if keyspace > 0 {
            randomize_keys(&mut self.obuf, &self.rand_offsets, rng, keyspace);
        }
        self.written = 0;
        self.latency_us = None;
        self.start = Some(Instant::now());
        self.state = SessionState::Writing;
    }

    /// Writable readiness callback: flush what the OS accepts. Partial
    /// writes are normal; any failure other than would-block is fatal.
    pub(crate) fn on_writable(&mut self) -> Result<WriteProgress> {
        while self.written < self.obuf.len() {
            match self.conn.write(&self.obuf[self.written..]) {
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing request",
                    )));
                }
                Ok(n) => self.written += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteProgress::Pending);
                }
                Err(err) => return Err(Error::Io(err)),
            }
        }
        self.state = SessionState::AwaitingReply;
        Ok(WriteProgress::Sent)
    }

    /// Readable readiness callback: capture latency once, then feed the
    /// reply parser.
    ///
    /// Latency is computed on the first readable event after the request
    /// completed send; the server has answered by then, and parsing (which
    /// may need several reads) is explicitly not part of the measurement.
    pub(crate) fn on_readable(&mut self, scratch: &mut [u8]) -> Result<Feed> {
        if self.latency_us.is_none() {
            let start = self.start.unwrap_or_else(Instant::now);
            self.latency_us = Some(start.elapsed().as_micros() as u64);
        }

        match self.conn.read(scratch) {
            Ok(0) => Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed while awaiting reply",
            ))),
            Ok(n) => Ok(self.parser.feed(&scratch[..n])),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(Feed::Incomplete),
            Err(err) => Err(Error::Io(err)),
        }
    }

    /// Latency of the just-completed request, in microseconds.
    pub(crate) fn take_latency(&mut self) -> u64 {
        debug_assert!(self.latency_us.is_some(), "reply completed without a read");
        self.latency_us.take().unwrap_or_default()
    }

    /// `AwaitingReply → Idle`: keep the connection for the next request.
    pub(crate) fn reset(&mut self) {
        self.written = 0;
        self.start = None;
        self.latency_us = None;
        self.state = SessionState::Idle;
    }

    /// `→ Retired`: the connection is released and the session is done.
    pub(crate) fn retire(&mut self) {
        self.conn.close();
        self.state = SessionState::Retired;
    }
}
