//! Collaborator seams between the engine and the wire protocol.
//!
//! The engine never interprets request or reply bytes. The caller hands it a
//! fully encoded [`RequestTemplate`] and a [`ReplyParser`] that only has to
//! answer one question per chunk of bytes: is the reply still incomplete,
//! complete (and if so, an error reply), or malformed.

use std::sync::Arc;

use crate::error::{Error, Result};

/// Width of the zero-padded decimal substituted at each randomization offset.
pub const RAND_KEY_WIDTH: usize = 12;

/// Verdict of feeding reply bytes to a [`ReplyParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// More bytes are needed before a full reply is available.
    Incomplete,
    /// One complete reply object was parsed.
    Complete { is_error: bool },
    /// The bytes cannot be a valid reply.
    Malformed,
}

/// Incremental reply parser supplied by the protocol client library.
///
/// `feed` is called with whatever the socket produced; the parser buffers
/// partial input across calls. At most one request is outstanding per
/// session, so at most one complete reply is ever expected per request.
pub trait ReplyParser {
    fn feed(&mut self, bytes: &[u8]) -> Feed;
}

/// Factory producing one fresh parser per session.
pub type ParserFactory = Box<dyn Fn() -> Box<dyn ReplyParser>>;

/// A fully encoded request, shared read-only across all sessions.
///
/// Sessions copy the bytes into a private write window; the template itself
/// is never mutated. `rand_offsets` are the byte positions where a
/// [`RAND_KEY_WIDTH`]-character zero-padded decimal is substituted before
/// each send when randomization is enabled.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    bytes: Arc<[u8]>,
    rand_offsets: Arc<[usize]>,
}

impl RequestTemplate {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            rand_offsets: Arc::from(Vec::new()),
        }
    }

    /// Attach randomization offsets; each must leave room for a full
    /// [`RAND_KEY_WIDTH`]-byte substitution window inside the buffer.
    pub fn with_rand_offsets(
        bytes: impl Into<Vec<u8>>,
        rand_offsets: impl Into<Vec<usize>>,
    ) -> Result<Self> {
        let bytes: Vec<u8> = bytes.into();
        let rand_offsets: Vec<usize> = rand_offsets.into();
        for &off in &rand_offsets {
            if off + RAND_KEY_WIDTH > bytes.len() {
                return Err(Error::Config(format!(
                    "randomization offset {off} leaves no room for a {RAND_KEY_WIDTH}-byte key \
                     in a {}-byte request",
                    bytes.len()
                )));
            }
        }
        Ok(Self {
            bytes: Arc::from(bytes),
            rand_offsets: Arc::from(rand_offsets),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn rand_offsets(&self) -> Arc<[usize]> {
        self.rand_offsets.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_must_fit_the_buffer() {
        let buf = b"GET key:000000000000\r\n".to_vec();
        assert!(RequestTemplate::with_rand_offsets(buf.clone(), vec![8]).is_ok());
        assert!(RequestTemplate::with_rand_offsets(buf, vec![15]).is_err());
    }

    #[test]
    fn plain_template_has_no_offsets() {
        let t = RequestTemplate::new(b"PING\r\n".to_vec());
        assert!(t.rand_offsets().is_empty());
        assert_eq!(t.bytes(), b"PING\r\n");
    }
}
