//! poll(2) readiness backend.
//!
//! Portable fallback for unix targets without epoll, also selectable on
//! Linux through the `poll-backend` feature. Behaviorally indistinguishable
//! from the epoll backend as far as the rest of the engine is concerned.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use crate::driver::{Event, Interest, Poller, Token};

pub struct PollPoller {
    fds: Vec<libc::pollfd>,
    tokens: Vec<Token>,
    // fd -> position in `fds`/`tokens`, kept in sync across swap_remove.
    index: HashMap<RawFd, usize>,
}

fn interest_bits(interest: Interest) -> libc::c_short {
    match interest {
        Interest::Readable => libc::POLLIN,
        Interest::Writable => libc::POLLOUT,
    }
}

impl PollPoller {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            fds: Vec::new(),
            tokens: Vec::new(),
            index: HashMap::new(),
        })
    }
}

impl Poller for PollPoller {
    fn register(&mut self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        if self.index.contains_key(&fd) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("fd {fd} already registered"),
            ));
        }
        self.index.insert(fd, self.fds.len());
        self.fds.push(libc::pollfd {
            fd,
            events: interest_bits(interest),
            revents: 0,
        });
        self.tokens.push(token);
        Ok(())
    }

    fn rearm(&mut self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let &pos = self
            .index
            .get(&fd)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("fd {fd} unknown")))?;
        self.fds[pos].events = interest_bits(interest);
        self.tokens[pos] = token;
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        let pos = self
            .index
            .remove(&fd)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("fd {fd} unknown")))?;
        self.fds.swap_remove(pos);
        self.tokens.swap_remove(pos);
        if pos < self.fds.len() {
            self.index.insert(self.fds[pos].fd, pos);
        }
        Ok(())
    }

    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<usize> {
        let timeout_ms = match timeout {
            Some(d) => d.as_nanos().div_ceil(1_000_000).min(i32::MAX as u128) as i32,
            None => -1,
        };

        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        events.clear();
        for (pfd, &token) in self.fds.iter().zip(&self.tokens) {
            if pfd.revents == 0 {
                continue;
            }
            let fault = pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0;
            events.push(Event {
                token,
                readable: pfd.revents & libc::POLLIN != 0 || fault,
                writable: pfd.revents & libc::POLLOUT != 0 || fault,
            });
            if events.len() == n as usize {
                break;
            }
        }
        Ok(events.len())
    }
}
