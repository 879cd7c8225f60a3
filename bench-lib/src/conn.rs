//! One non-blocking connection to the benchmark target.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::config::Target;
use crate::error::{Error, Result};

enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

/// Owns exactly one socket descriptor for the lifetime of a session.
///
/// Read and write are single non-blocking attempts; partial progress and
/// would-block are for the caller to handle. [`ConnectionHandle::close`] is
/// idempotent.
pub struct ConnectionHandle {
    stream: Option<Stream>,
    fd: RawFd,
}

impl ConnectionHandle {
    /// Establish a connection to the target and switch it to non-blocking
    /// mode. Failure here aborts the whole run: a missing connection would
    /// bias the throughput and latency measurements.
    pub fn connect(target: &Target) -> Result<Self> {
        let connect_err = |source: io::Error| Error::Connect {
            target: target.to_string(),
            source,
        };

        let stream = match target {
            Target::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).map_err(connect_err)?;
                stream.set_nodelay(true).map_err(connect_err)?;
                stream.set_nonblocking(true).map_err(connect_err)?;
                Stream::Tcp(stream)
            }
            Target::Unix { path } => {
                let stream = UnixStream::connect(path).map_err(connect_err)?;
                stream.set_nonblocking(true).map_err(connect_err)?;
                Stream::Unix(stream)
            }
        };

        let fd = match &stream {
            Stream::Tcp(s) => s.as_raw_fd(),
            Stream::Unix(s) => s.as_raw_fd(),
        };

        Ok(Self {
            stream: Some(stream),
            fd,
        })
    }

    /// Descriptor used for readiness registration. Stable across the handle's
    /// lifetime, including after `close`.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Attempt to write a byte range. A short write or
    /// [`io::ErrorKind::WouldBlock`] is normal under non-blocking I/O.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream.as_mut() {
            Some(Stream::Tcp(s)) => s.write(buf),
            Some(Stream::Unix(s)) => s.write(buf),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    /// Attempt to read into a fixed-size buffer. `Ok(0)` means the peer
    /// closed the connection.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.as_mut() {
            Some(Stream::Tcp(s)) => s.read(buf),
            Some(Stream::Unix(s)) => s.read(buf),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    /// Release the descriptor. Safe to call more than once; the caller is
    /// responsible for deregistering readiness subscriptions first.
    pub fn close(&mut self) {
        self.stream.take();
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}
