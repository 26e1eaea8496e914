use std::time::Duration;

use bytes::BytesMut;
use devlink_transport::Transport;
use tracing::debug;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::Result;
use crate::message::Message;
use crate::parser::StreamParser;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Sends and receives complete frames over any [`Transport`].
///
/// Owns the transport, the encode buffer, and the parser state, so a single
/// value is all a link needs. Partial reads are handled internally; callers
/// always get complete messages.
pub struct FramedTransport<T> {
    inner: T,
    parser: StreamParser,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Transport> FramedTransport<T> {
    /// Wrap a transport with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Wrap a transport with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            parser: StreamParser::with_config(&config),
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write one message.
    ///
    /// Rejected payloads (oversize, reserved byte) never reach the transport.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(
            self.config.scheme,
            payload,
            &mut self.buf,
            self.config.max_payload_size,
        )?;
        self.inner.write_all(&self.buf)?;
        debug!(len = payload.len(), scheme = ?self.config.scheme, "frame sent");
        Ok(())
    }

    /// Read the next complete message using the configured read timeout.
    pub fn recv(&mut self) -> Result<Message> {
        let timeout = self.config.read_timeout;
        self.recv_timeout(timeout)
    }

    /// Read the next complete message, waiting at most `timeout` per byte.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Message> {
        self.parser.feed(&mut self.inner, timeout)
    }

    /// Close the transport. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        self.parser.reset();
        self.inner.close()?;
        Ok(())
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the wrapper and return the transport.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Borrow the parser driving receives.
    pub fn parser(&self) -> &StreamParser {
        &self.parser
    }

    /// Split borrow of the parser and transport, for driving the parser
    /// directly (readiness handshakes, for one).
    pub fn parts_mut(&mut self) -> (&mut StreamParser, &mut T) {
        (&mut self.parser, &mut self.inner)
    }

    /// Current framing configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T> std::fmt::Debug for FramedTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedTransport")
            .field("parser", &self.parser)
            .field("config", &self.config)
            .finish()
    }
}
