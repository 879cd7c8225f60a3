//! Single-threaded readiness reactor.
//!
//! The driver multiplexes writable/readable notifications across all
//! registered descriptors and synchronously dispatches them to an
//! [`EventHandler`] — in this engine, the client pool routing to its
//! sessions. All suspension happens in the blocking wait; everything else is
//! non-blocking and retried via re-registration, never by busy-waiting.
//!
//! A best-effort periodic tick (default 250 ms) is fired for live progress
//! reporting only; delaying or skipping it under load has no effect on
//! correctness.

use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use crate::error::Result;

pub mod sys;

/// Opaque per-registration identifier chosen by the handler.
pub type Token = usize;

/// Readiness interest. Sessions subscribe to exactly one side at a time:
/// writable while sending, readable while awaiting the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Writable,
    Readable,
}

/// One readiness notification.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
}

/// OS readiness backend. See [`sys`] for the implementations.
pub trait Poller {
    fn register(&mut self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()>;
    fn rearm(&mut self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()>;
    fn deregister(&mut self, fd: RawFd) -> io::Result<()>;
    /// Block until readiness or timeout; `Ok(0)` on timeout or EINTR.
    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<usize>;
}

/// Registration surface handed to the handler during dispatch, so callbacks
/// can switch interests, drop connections, and stop the run mid-tick.
pub trait Registry {
    fn register(&mut self, fd: RawFd, token: Token, interest: Interest) -> Result<()>;
    fn rearm(&mut self, fd: RawFd, token: Token, interest: Interest) -> Result<()>;
    fn deregister(&mut self, fd: RawFd) -> Result<()>;
    /// Make the run loop return after the current dispatch tick.
    fn stop(&mut self);
}

/// Dispatch target of the reactor.
pub trait EventHandler {
    /// A registered descriptor became ready. Errors abort the run.
    fn on_ready(&mut self, reg: &mut dyn Registry, ev: Event) -> Result<()>;
    /// Best-effort periodic callback for progress reporting.
    fn on_tick(&mut self, reg: &mut dyn Registry);
}

const DEFAULT_TICK: Duration = Duration::from_millis(250);

/// The reactor. Owns the readiness backend and the run/stop lifecycle.
pub struct EventDriver<P = sys::DefaultPoller> {
    poller: P,
    events: Vec<Event>,
    tick_every: Duration,
    stopped: bool,
}

impl EventDriver<sys::DefaultPoller> {
    pub fn new() -> io::Result<Self> {
        Ok(Self::with_poller(sys::DefaultPoller::new()?))
    }
}

impl<P: Poller> EventDriver<P> {
    pub fn with_poller(poller: P) -> Self {
        Self {
            poller,
            events: Vec::with_capacity(1024),
            tick_every: DEFAULT_TICK,
            stopped: false,
        }
    }

    pub fn set_tick_interval(&mut self, tick_every: Duration) {
        self.tick_every = tick_every;
    }

    /// Run until [`Registry::stop`] is called or the handler reports a fatal
    /// error. Within one tick, events are dispatched in arbitrary but
    /// deterministic order; no cross-descriptor ordering is guaranteed.
    pub fn run(&mut self, handler: &mut dyn EventHandler) -> Result<()> {
        self.stopped = false;
        let mut next_tick = Instant::now() + self.tick_every;

        while !self.stopped {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            let n = self.poller.wait(&mut self.events, Some(timeout))?;

            // Move the buffer out so dispatch can borrow the driver as the
            // registry. Events may refer to sessions retired earlier in the
            // same tick; handlers treat unknown tokens as stale.
            let events = std::mem::take(&mut self.events);
            for ev in &events[..n] {
                handler.on_ready(self, *ev)?;
                if self.stopped {
                    break;
                }
            }
            self.events = events;

            if Instant::now() >= next_tick {
                handler.on_tick(self);
                next_tick = Instant::now() + self.tick_every;
            }
        }

        tracing::debug!("event driver stopped");
        Ok(())
    }
}

impl<P: Poller> Registry for EventDriver<P> {
    fn register(&mut self, fd: RawFd, token: Token, interest: Interest) -> Result<()> {
        self.poller.register(fd, token, interest)?;
        Ok(())
    }

    fn rearm(&mut self, fd: RawFd, token: Token, interest: Interest) -> Result<()> {
        self.poller.rearm(fd, token, interest)?;
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> Result<()> {
        self.poller.deregister(fd)?;
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
