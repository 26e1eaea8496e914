use std::time::Duration;

use bytes::BytesMut;
use devlink_transport::Transport;
use tracing::{debug, trace};

use crate::codec::{FrameConfig, FramingScheme, END_MARKER, START_MARKER};
use crate::error::{FrameError, Result};
use crate::message::Message;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Where the parser is within a frame.
///
/// A completed frame is handed out by the same step that finishes it, and the
/// parser is back to `Idle` by the time the caller sees the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Discarding bytes until a start marker.
    Idle,
    /// Reading the decimal length field (length-prefixed only).
    AwaitingLength { value: usize, digits: usize },
    /// Collecting payload bytes.
    ///
    /// `remaining` counts payload bytes still owed by a length-prefixed
    /// frame; `Some(0)` means only the end marker is outstanding. Marker-only
    /// frames carry `None` and end at the first end marker.
    Accumulating { remaining: Option<usize> },
}

/// Incremental byte-at-a-time frame parser.
///
/// Owns the partial-frame buffer. State changes only in [`push`](Self::push);
/// any protocol violation drops the frame and returns the parser to
/// [`ParserState::Idle`].
pub struct StreamParser {
    scheme: FramingScheme,
    max_payload: usize,
    persist_partial: bool,
    state: ParserState,
    buf: BytesMut,
}

impl StreamParser {
    /// Create a parser with default configuration for `scheme`.
    pub fn new(scheme: FramingScheme) -> Self {
        Self::with_config(&FrameConfig {
            scheme,
            ..FrameConfig::default()
        })
    }

    /// Create a parser with explicit configuration.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            scheme: config.scheme,
            max_payload: config.max_payload_size,
            persist_partial: config.persist_partial,
            state: ParserState::Idle,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn scheme(&self) -> FramingScheme {
        self.scheme
    }

    /// Payload bytes buffered for the frame in progress.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.state = ParserState::Idle;
        self.buf.clear();
    }

    /// Keep (or discard) a partial frame when a read times out.
    pub fn set_persist_partial(&mut self, persist: bool) {
        self.persist_partial = persist;
    }

    /// Consume one byte.
    ///
    /// Returns `Ok(Some(message))` when the byte completes a frame.
    pub fn push(&mut self, byte: u8) -> Result<Option<Message>> {
        match self.state {
            ParserState::Idle => {
                if byte == START_MARKER {
                    self.open_frame();
                } else {
                    trace!(byte, "discarding byte outside frame");
                }
                Ok(None)
            }
            ParserState::AwaitingLength { value, digits } => {
                self.push_length_digit(byte, value, digits)
            }
            ParserState::Accumulating { remaining: None } => {
                if byte == END_MARKER {
                    return Ok(Some(self.finish()));
                }
                if self.buf.len() >= self.max_payload {
                    let size = self.buf.len() + 1;
                    self.reset();
                    return Err(FrameError::FrameTooLarge {
                        size,
                        max: self.max_payload,
                    });
                }
                self.buf.extend_from_slice(&[byte]);
                Ok(None)
            }
            ParserState::Accumulating { remaining: Some(0) } => {
                if byte == END_MARKER {
                    return Ok(Some(self.finish()));
                }
                if byte == START_MARKER {
                    // The frame is dropped; the marker opens the next one.
                    self.open_frame();
                } else {
                    self.reset();
                }
                Err(FrameError::MissingEndMarker { found: byte })
            }
            ParserState::Accumulating {
                remaining: Some(remaining),
            } => {
                self.buf.extend_from_slice(&[byte]);
                self.state = ParserState::Accumulating {
                    remaining: Some(remaining - 1),
                };
                Ok(None)
            }
        }
    }

    /// Read from `transport` until a complete frame is assembled.
    ///
    /// Each byte read waits at most `timeout`. When a read times out the call
    /// fails with [`FrameError::Timeout`] and, unless partial frames are
    /// persisted, the frame in progress is discarded.
    pub fn feed<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        timeout: Duration,
    ) -> Result<Message> {
        loop {
            let byte = match transport.read_byte(timeout) {
                Ok(Some(byte)) => byte,
                Ok(None) => {
                    self.read_timed_out();
                    return Err(FrameError::Timeout(timeout));
                }
                Err(err) => {
                    self.reset();
                    return Err(FrameError::Transport(err));
                }
            };

            if let Some(message) = self.push(byte)? {
                debug!(len = message.len(), "frame received");
                return Ok(message);
            }
        }
    }

    /// Apply the partial-frame policy after a byte read timed out.
    ///
    /// The frame in progress is discarded unless partial frames are persisted.
    pub fn read_timed_out(&mut self) {
        if !self.persist_partial && self.state != ParserState::Idle {
            debug!(
                buffered = self.buf.len(),
                "read timed out mid-frame; discarding partial frame"
            );
            self.reset();
        }
    }

    fn open_frame(&mut self) {
        self.buf.clear();
        self.state = match self.scheme {
            FramingScheme::MarkerOnly => ParserState::Accumulating { remaining: None },
            FramingScheme::LengthPrefixed => ParserState::AwaitingLength {
                value: 0,
                digits: 0,
            },
        };
    }

    fn push_length_digit(
        &mut self,
        byte: u8,
        value: usize,
        digits: usize,
    ) -> Result<Option<Message>> {
        match byte {
            b'0'..=b'9' => {
                let value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(usize::from(byte - b'0')))
                    .unwrap_or(usize::MAX);
                if value > self.max_payload {
                    self.reset();
                    return Err(FrameError::FrameTooLarge {
                        size: value,
                        max: self.max_payload,
                    });
                }
                self.state = ParserState::AwaitingLength {
                    value,
                    digits: digits + 1,
                };
                Ok(None)
            }
            END_MARKER if digits == 0 => {
                self.reset();
                Err(FrameError::EmptyLength)
            }
            END_MARKER => {
                self.buf.reserve(value);
                self.state = ParserState::Accumulating {
                    remaining: Some(value),
                };
                Ok(None)
            }
            START_MARKER => {
                // The broken frame is reported; the marker opens the next one.
                self.open_frame();
                Err(FrameError::MalformedLength { found: byte })
            }
            other => {
                self.reset();
                Err(FrameError::MalformedLength { found: other })
            }
        }
    }

    fn finish(&mut self) -> Message {
        self.state = ParserState::Idle;
        Message::new(self.buf.split().freeze())
    }
}

impl std::fmt::Debug for StreamParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParser")
            .field("scheme", &self.scheme)
            .field("state", &self.state)
            .field("buffered", &self.buf.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::BytesMut;
    use devlink_transport::{MemoryTransport, TransportError};

    use super::*;
    use crate::codec::{encode_frame, MAX_PAYLOAD};

    /// Replays a fixed script of reads; `None` entries are timeouts.
    struct ScriptedTransport {
        reads: VecDeque<Option<u8>>,
    }

    impl ScriptedTransport {
        fn new(script: impl IntoIterator<Item = Option<u8>>) -> Self {
            Self {
                reads: script.into_iter().collect(),
            }
        }

        fn bytes(bytes: &[u8]) -> Self {
            Self::new(bytes.iter().copied().map(Some))
        }
    }

    impl Transport for ScriptedTransport {
        fn write_all(&mut self, _bytes: &[u8]) -> devlink_transport::Result<()> {
            Ok(())
        }

        fn read_byte(&mut self, _timeout: Duration) -> devlink_transport::Result<Option<u8>> {
            Ok(self.reads.pop_front().flatten())
        }

        fn close(&mut self) -> devlink_transport::Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn write_all(&mut self, _bytes: &[u8]) -> devlink_transport::Result<()> {
            Ok(())
        }

        fn read_byte(&mut self, _timeout: Duration) -> devlink_transport::Result<Option<u8>> {
            Err(TransportError::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )))
        }

        fn close(&mut self) -> devlink_transport::Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    const TICK: Duration = Duration::from_millis(10);

    fn wire(scheme: FramingScheme, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(scheme, payload, &mut buf, MAX_PAYLOAD).unwrap();
        buf.to_vec()
    }

    fn push_all(parser: &mut StreamParser, bytes: &[u8]) -> Vec<Message> {
        bytes
            .iter()
            .filter_map(|&b| parser.push(b).unwrap())
            .collect()
    }

    #[test]
    fn feed_marker_only_frame() {
        let mut transport = ScriptedTransport::bytes(b"<hello>");
        let mut parser = StreamParser::new(FramingScheme::MarkerOnly);
        let msg = parser.feed(&mut transport, TICK).unwrap();
        assert_eq!(msg.as_bytes(), b"hello");
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[test]
    fn feed_length_prefixed_frame() {
        let mut transport = ScriptedTransport::bytes(b"<0002>hi>");
        let mut parser = StreamParser::new(FramingScheme::LengthPrefixed);
        let msg = parser.feed(&mut transport, TICK).unwrap();
        assert_eq!(msg.text().unwrap(), "hi");
    }

    #[test]
    fn noise_before_start_marker_is_discarded() {
        for scheme in [FramingScheme::MarkerOnly, FramingScheme::LengthPrefixed] {
            let mut bytes = b"\x00\xffline noise 12>>".to_vec();
            bytes.extend(wire(scheme, b"payload"));
            let mut transport = ScriptedTransport::bytes(&bytes);
            let mut parser = StreamParser::new(scheme);
            let msg = parser.feed(&mut transport, TICK).unwrap();
            assert_eq!(msg.as_bytes(), b"payload", "{scheme:?}");
        }
    }

    #[test]
    fn split_at_every_boundary_matches_whole() {
        for scheme in [FramingScheme::MarkerOnly, FramingScheme::LengthPrefixed] {
            let bytes = wire(scheme, b"split me");
            for cut in 0..=bytes.len() {
                let mut parser = StreamParser::new(scheme);
                let mut out = push_all(&mut parser, &bytes[..cut]);
                out.extend(push_all(&mut parser, &bytes[cut..]));
                assert_eq!(out.len(), 1, "{scheme:?} cut {cut}");
                assert_eq!(out[0].as_bytes(), b"split me");
            }
        }
    }

    #[test]
    fn persisted_partial_frame_survives_timeout() {
        let bytes = wire(FramingScheme::LengthPrefixed, b"slow sender");
        let (head, tail) = bytes.split_at(5);

        let script = head
            .iter()
            .copied()
            .map(Some)
            .chain([None])
            .chain(tail.iter().copied().map(Some));
        let mut transport = ScriptedTransport::new(script);

        let mut parser = StreamParser::new(FramingScheme::LengthPrefixed);
        parser.set_persist_partial(true);

        let err = parser.feed(&mut transport, TICK).unwrap_err();
        assert!(matches!(err, FrameError::Timeout(_)));
        assert_ne!(parser.state(), ParserState::Idle);

        let msg = parser.feed(&mut transport, TICK).unwrap();
        assert_eq!(msg.as_bytes(), b"slow sender");
    }

    #[test]
    fn timeout_discards_partial_frame_by_default() {
        let mut script: Vec<Option<u8>> = b"<0005>he".iter().copied().map(Some).collect();
        script.push(None);
        script.extend(wire(FramingScheme::LengthPrefixed, b"next").into_iter().map(Some));
        let mut transport = ScriptedTransport::new(script);
        let mut parser = StreamParser::new(FramingScheme::LengthPrefixed);

        let err = parser.feed(&mut transport, TICK).unwrap_err();
        assert!(matches!(err, FrameError::Timeout(d) if d == TICK));
        assert_eq!(parser.state(), ParserState::Idle);
        assert_eq!(parser.buffered(), 0);

        let msg = parser.feed(&mut transport, TICK).unwrap();
        assert_eq!(msg.as_bytes(), b"next");
    }

    #[test]
    fn timeout_on_idle_line() {
        let mut transport = ScriptedTransport::new([]);
        let mut parser = StreamParser::new(FramingScheme::MarkerOnly);
        let err = parser.feed(&mut transport, TICK).unwrap_err();
        assert!(matches!(err, FrameError::Timeout(_)));
    }

    #[test]
    fn non_digit_in_length_is_malformed() {
        let mut parser = StreamParser::new(FramingScheme::LengthPrefixed);
        parser.push(b'<').unwrap();
        parser.push(b'1').unwrap();
        let err = parser.push(b'a').unwrap_err();
        assert!(matches!(err, FrameError::MalformedLength { found: b'a' }));
        assert!(err.is_protocol_violation());
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[test]
    fn empty_length_field_rejected() {
        let mut parser = StreamParser::new(FramingScheme::LengthPrefixed);
        parser.push(b'<').unwrap();
        let err = parser.push(b'>').unwrap_err();
        assert!(matches!(err, FrameError::EmptyLength));
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[test]
    fn start_marker_in_length_reopens_frame() {
        let mut parser = StreamParser::new(FramingScheme::LengthPrefixed);
        parser.push(b'<').unwrap();
        parser.push(b'0').unwrap();
        let err = parser.push(b'<').unwrap_err();
        assert!(matches!(err, FrameError::MalformedLength { found: b'<' }));

        let out = push_all(&mut parser, b"0002>ok>");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_bytes(), b"ok");
    }

    #[test]
    fn oversized_length_field_rejected() {
        let mut parser = StreamParser::new(FramingScheme::LengthPrefixed);
        let mut result = Ok(None);
        for &b in b"<99999" {
            result = parser.push(b);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(
            result,
            Err(FrameError::FrameTooLarge { size: 99999, max: 9999 })
        ));
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[test]
    fn configured_limit_applies_to_length_field() {
        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };

        let mut parser = StreamParser::with_config(&cfg);
        let out = push_all(&mut parser, b"<0016>0123456789abcdef>");
        assert_eq!(out.len(), 1);

        let mut last = Ok(None);
        for &b in b"<0017" {
            last = parser.push(b);
        }
        assert!(matches!(
            last,
            Err(FrameError::FrameTooLarge { size: 17, max: 16 })
        ));
    }

    #[test]
    fn marker_only_overflow_rejected() {
        let cfg = FrameConfig {
            scheme: FramingScheme::MarkerOnly,
            max_payload_size: 4,
            ..FrameConfig::default()
        };
        let mut parser = StreamParser::with_config(&cfg);
        assert!(push_all(&mut parser, b"<abcd").is_empty());
        let err = parser.push(b'e').unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 5, max: 4 }));
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[test]
    fn missing_end_marker_after_payload() {
        let mut parser = StreamParser::new(FramingScheme::LengthPrefixed);
        assert!(push_all(&mut parser, b"<0002>hi").is_empty());
        let err = parser.push(b'!').unwrap_err();
        assert!(matches!(err, FrameError::MissingEndMarker { found: b'!' }));
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[test]
    fn start_marker_in_end_position_reopens_frame() {
        let mut parser = StreamParser::new(FramingScheme::LengthPrefixed);
        let mut errors = Vec::new();
        let mut out = Vec::new();
        for &b in b"<0002>hi<0002>ok>" {
            match parser.push(b) {
                Ok(Some(msg)) => out.push(msg),
                Ok(None) => {}
                Err(err) => errors.push(err),
            }
        }

        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            FrameError::MissingEndMarker { found: b'<' }
        ));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_bytes(), b"ok");
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[test]
    fn zero_length_frame() {
        let mut parser = StreamParser::new(FramingScheme::LengthPrefixed);
        let out = push_all(&mut parser, b"<0000>>");
        assert_eq!(out.len(), 1);
        assert!(out[0].is_empty());
    }

    #[test]
    fn transport_error_resets_parser() {
        let mut parser = StreamParser::new(FramingScheme::MarkerOnly);
        parser.push(b'<').unwrap();
        parser.push(b'a').unwrap();

        let err = parser.feed(&mut FailingTransport, TICK).unwrap_err();
        assert!(matches!(err, FrameError::Transport(_)));
        assert!(!err.is_protocol_violation());
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[test]
    fn consecutive_frames_over_memory_pair() {
        let (mut host, mut device) = MemoryTransport::pair();
        let mut bytes = wire(FramingScheme::LengthPrefixed, b"one");
        bytes.extend(wire(FramingScheme::LengthPrefixed, b"two"));
        device.write_all(&bytes).unwrap();

        let mut parser = StreamParser::new(FramingScheme::LengthPrefixed);
        let first = parser.feed(&mut host, TICK).unwrap();
        let second = parser.feed(&mut host, TICK).unwrap();
        assert_eq!(first.as_bytes(), b"one");
        assert_eq!(second.as_bytes(), b"two");
        assert_eq!(host.pending(), 0);
    }
}
