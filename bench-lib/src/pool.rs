//! Session pool: concurrency enforcement, request budget accounting, and
//! run-complete teardown.
//!
//! The pool is the reactor's dispatch target. It routes readiness events to
//! the owning session, records latencies on reply completion, and keeps the
//! live set at the configured concurrency level until the request budget is
//! exhausted. A request slot is reserved (`issued` incremented) when a
//! session is created or reset, so in non-keep-alive mode exactly one
//! connection is opened per request.

use std::collections::HashMap;
use std::io::Write as _;
use std::time::Duration;

use rand::SeedableRng as _;
use rand::rngs::SmallRng;

use crate::config::Config;
use crate::conn::ConnectionHandle;
use crate::driver::{Event, EventHandler, Interest, Registry, Token};
use crate::error::{Error, Result};
use crate::protocol::{Feed, ParserFactory, RequestTemplate};
use crate::recorder::LatencyRecorder;
use crate::report::Report;
use crate::session::{RequestSession, SessionState, WriteProgress};

/// Listen backlogs are quite limited on most systems: open at most this many
/// connections back to back before pausing.
const MAX_CONNECT_BURST: usize = 64;
const CONNECT_BURST_PAUSE: Duration = Duration::from_millis(50);

const SCRATCH_SIZE: usize = 16 * 1024;

pub struct ClientPool {
    title: String,
    cfg: Config,
    template: RequestTemplate,
    new_parser: ParserFactory,
    sessions: HashMap<Token, RequestSession>,
    next_token: Token,
    /// Requests whose slot has been handed to a session. `finished <=
    /// issued <= budget`, both monotonically non-decreasing.
    issued: usize,
    finished: usize,
    recorder: LatencyRecorder,
    rng: SmallRng,
    scratch: Vec<u8>,
}

impl ClientPool {
    pub fn new(
        title: impl Into<String>,
        cfg: &Config,
        template: RequestTemplate,
        new_parser: ParserFactory,
    ) -> Self {
        Self {
            title: title.into(),
            cfg: cfg.clone(),
            template,
            new_parser,
            sessions: HashMap::with_capacity(cfg.concurrency),
            next_token: 0,
            issued: 0,
            finished: 0,
            recorder: LatencyRecorder::with_budget(cfg.requests),
            rng: SmallRng::from_os_rng(),
            scratch: vec![0; SCRATCH_SIZE],
        }
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Restart the elapsed clock; called once ramp-up is done.
    pub fn start_clock(&mut self) {
        self.recorder.start_clock();
    }

    pub fn into_report(self) -> Report {
        Report::from_run(self.title, &self.cfg, &self.recorder)
    }

    /// Open sessions until the pool is full or the budget is spoken for,
    /// yielding briefly every [`MAX_CONNECT_BURST`] connections so the
    /// target's listen backlog is not overrun.
    pub fn fill(&mut self, reg: &mut dyn Registry) -> Result<()> {
        let mut burst = 0;
        while self.sessions.len() < self.cfg.concurrency && self.issued < self.cfg.requests {
            self.spawn_session(reg)?;
            burst += 1;
            if burst >= MAX_CONNECT_BURST {
                std::thread::sleep(CONNECT_BURST_PAUSE);
                burst = 0;
            }
        }
        Ok(())
    }

    fn spawn_session(&mut self, reg: &mut dyn Registry) -> Result<()> {
        let conn = ConnectionHandle::connect(&self.cfg.target)?;
        let token = self.next_token;
        self.next_token += 1;

        reg.register(conn.fd(), token, Interest::Writable)?;
        let session = RequestSession::new(token, conn, &self.template, (self.new_parser)());
        self.sessions.insert(token, session);
        self.issued += 1;

        tracing::trace!(%token, issued = %self.issued, "session spawned");
        Ok(())
    }

    /// Deregister and close one session.
    fn retire_session(&self, reg: &mut dyn Registry, session: &mut RequestSession) -> Result<()> {
        reg.deregister(session.fd())?;
        session.retire();
        Ok(())
    }

    /// The budget is met: tear down every live session and stop the driver.
    fn complete_run(
        &mut self,
        reg: &mut dyn Registry,
        mut last: RequestSession,
    ) -> Result<()> {
        self.retire_session(reg, &mut last)?;
        let mut sessions = std::mem::take(&mut self.sessions);
        for session in sessions.values_mut() {
            self.retire_session(reg, session)?;
        }
        self.recorder.finish();
        reg.stop();

        tracing::debug!(
            finished = %self.finished,
            elapsed = ?self.recorder.elapsed(),
            "run complete",
        );
        Ok(())
    }

    /// A reply completed: record its latency, then reset, replace, or finish.
    fn on_reply_complete(
        &mut self,
        reg: &mut dyn Registry,
        mut session: RequestSession,
    ) -> Result<()> {
        let latency_us = session.take_latency();
        self.recorder.record(self.finished, latency_us);
        self.finished += 1;

        if self.finished == self.cfg.requests {
            return self.complete_run(reg, session);
        }

        if self.cfg.keep_alive {
            if self.issued < self.cfg.requests {
                self.issued += 1;
                session.reset();
                reg.rearm(session.fd(), session.token(), Interest::Writable)?;
                self.sessions.insert(session.token(), session);
            } else {
                // Budget exhausted; let the pool drain.
                self.retire_session(reg, &mut session)?;
            }
        } else {
            self.retire_session(reg, &mut session)?;
            self.fill(reg)?;
        }
        Ok(())
    }
}

impl EventHandler for ClientPool {
    fn on_ready(&mut self, reg: &mut dyn Registry, ev: Event) -> Result<()> {
        // Earlier dispatches in this tick may have retired the session.
        let Some(mut session) = self.sessions.remove(&ev.token) else {
            tracing::trace!(token = %ev.token, "stale readiness event");
            return Ok(());
        };

        match session.state() {
            SessionState::Idle | SessionState::Writing if ev.writable => {
                if session.state() == SessionState::Idle {
                    session.begin_request(&mut self.rng, self.cfg.random_keyspace);
                }
                match session.on_writable() {
                    Ok(WriteProgress::Sent) => {
                        reg.rearm(session.fd(), session.token(), Interest::Readable)?;
                    }
                    Ok(WriteProgress::Pending) => {}
                    Err(err) => {
                        tracing::error!(token = %ev.token, "write failed: {err}");
                        return Err(err);
                    }
                }
                self.sessions.insert(ev.token, session);
            }

            SessionState::AwaitingReply if ev.readable => {
                match session.on_readable(&mut self.scratch) {
                    Ok(Feed::Incomplete) => {
                        self.sessions.insert(ev.token, session);
                    }
                    Ok(Feed::Complete { is_error: false }) => {
                        self.on_reply_complete(reg, session)?;
                    }
                    Ok(Feed::Complete { is_error: true }) => {
                        tracing::error!(token = %ev.token, "server answered with an error reply");
                        return Err(Error::Protocol("unexpected error reply".to_owned()));
                    }
                    Ok(Feed::Malformed) => {
                        tracing::error!(token = %ev.token, "malformed reply");
                        return Err(Error::Protocol("malformed reply".to_owned()));
                    }
                    Err(err) => {
                        tracing::error!(token = %ev.token, "read failed: {err}");
                        return Err(err);
                    }
                }
            }

            state => {
                tracing::trace!(token = %ev.token, ?state, "spurious readiness event");
                self.sessions.insert(ev.token, session);
            }
        }

        Ok(())
    }

    /// Live progress line; purely informational and safe to skip under load.
    #[allow(clippy::print_stdout)]
    fn on_tick(&mut self, _reg: &mut dyn Registry) {
        if self.cfg.quiet {
            return;
        }
        print!("{}: {:.2}\r", self.title, self.recorder.throughput());
        let _ = std::io::stdout().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;
    use crate::protocol::ReplyParser;
    use std::net::TcpListener;

    struct NeverDone;
    impl ReplyParser for NeverDone {
        fn feed(&mut self, _bytes: &[u8]) -> Feed {
            Feed::Incomplete
        }
    }

    struct NoopRegistry;
    impl Registry for NoopRegistry {
        fn register(&mut self, _: std::os::fd::RawFd, _: Token, _: Interest) -> Result<()> {
            Ok(())
        }
        fn rearm(&mut self, _: std::os::fd::RawFd, _: Token, _: Interest) -> Result<()> {
            Ok(())
        }
        fn deregister(&mut self, _: std::os::fd::RawFd) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    fn pool_against(listener: &TcpListener, cfg: &Config) -> ClientPool {
        let addr = listener.local_addr().expect("local addr");
        let cfg = Config {
            target: Target::Tcp {
                host: addr.ip().to_string(),
                port: addr.port(),
            },
            ..cfg.clone()
        };
        ClientPool::new(
            "test",
            &cfg,
            RequestTemplate::new(b"PING\r\n".to_vec()),
            Box::new(|| Box::new(NeverDone)),
        )
    }

    #[test]
    fn fill_reaches_concurrency_while_budget_lasts() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let cfg = Config {
            concurrency: 5,
            requests: 100,
            ..Config::default()
        };
        let mut pool = pool_against(&listener, &cfg);

        pool.fill(&mut NoopRegistry).expect("fill");
        assert_eq!(pool.live_sessions(), 5);
        assert_eq!(pool.issued, 5);
    }

    #[test]
    fn fill_never_issues_beyond_the_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let cfg = Config {
            concurrency: 8,
            requests: 3,
            ..Config::default()
        };
        let mut pool = pool_against(&listener, &cfg);

        pool.fill(&mut NoopRegistry).expect("fill");
        assert_eq!(pool.live_sessions(), 3);
        assert_eq!(pool.issued, 3);

        // A second fill is a no-op: every slot is spoken for.
        pool.fill(&mut NoopRegistry).expect("fill");
        assert_eq!(pool.live_sessions(), 3);
        assert_eq!(pool.issued, 3);
    }

    #[test]
    fn stale_events_are_ignored() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let mut pool = pool_against(&listener, &Config::default());

        let ev = Event {
            token: 999,
            readable: true,
            writable: true,
        };
        pool.on_ready(&mut NoopRegistry, ev).expect("stale event");
    }
}
