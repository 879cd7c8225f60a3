//! epoll(7) readiness backend, the default on Linux.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use crate::driver::{Event, Interest, Poller, Token};

const MAX_EVENTS: usize = 1024;

pub struct EpollPoller {
    fd: RawFd,
    raw: Vec<libc::epoll_event>,
}

fn interest_bits(interest: Interest) -> u32 {
    match interest {
        Interest::Readable => libc::EPOLLIN as u32,
        Interest::Writable => libc::EPOLLOUT as u32,
    }
}

fn epoll_ctl(epfd: RawFd, op: libc::c_int, fd: RawFd, token: Token, bits: u32) -> io::Result<()> {
    let mut ev = libc::epoll_event {
        events: bits,
        u64: token as u64,
    };
    let res = unsafe { libc::epoll_ctl(epfd, op, fd, &mut ev) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl EpollPoller {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            fd,
            raw: vec![libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS],
        })
    }
}

impl Poller for EpollPoller {
    fn register(&mut self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        epoll_ctl(
            self.fd,
            libc::EPOLL_CTL_ADD,
            fd,
            token,
            interest_bits(interest),
        )
    }

    fn rearm(&mut self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        epoll_ctl(
            self.fd,
            libc::EPOLL_CTL_MOD,
            fd,
            token,
            interest_bits(interest),
        )
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        let res = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<usize> {
        // Round up so a sub-millisecond remainder does not busy-spin.
        let timeout_ms = match timeout {
            Some(d) => d.as_nanos().div_ceil(1_000_000).min(i32::MAX as u128) as i32,
            None => -1,
        };

        let n = unsafe {
            libc::epoll_wait(
                self.fd,
                self.raw.as_mut_ptr(),
                self.raw.len() as i32,
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
        for raw_ev in &self.raw[..n as usize] {
            let bits = raw_ev.events;
            let fault = bits & (libc::EPOLLERR as u32 | libc::EPOLLHUP as u32) != 0;
            events.push(Event {
                token: raw_ev.u64 as Token,
                // Error and hangup conditions surface through whichever I/O
                // attempt the session makes next, so they count as both.
                readable: bits & libc::EPOLLIN as u32 != 0 || fault,
                writable: bits & libc::EPOLLOUT as u32 != 0 || fault,
            });
        }
        Ok(n as usize)
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}
