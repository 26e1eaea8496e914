use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::Message;
use crate::parser::{ParserState, StreamParser};

/// Opens every frame: `<`.
pub const START_MARKER: u8 = 0x3C;

/// Closes the length field and the frame: `>`.
pub const END_MARKER: u8 = 0x3E;

/// Width of the zero-padded decimal length field.
pub const LENGTH_DIGITS: usize = 4;

/// Largest payload a 4-digit length field can describe.
pub const MAX_PAYLOAD: usize = 9999;

/// Wire layout used for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub enum FramingScheme {
    /// `<payload>`. The payload must not contain the end marker.
    MarkerOnly,
    /// `<LLLL>payload>`. Binary-safe.
    #[default]
    LengthPrefixed,
}

impl FramingScheme {
    /// Bytes added around a payload on the wire.
    pub fn overhead(self) -> usize {
        match self {
            FramingScheme::MarkerOnly => 2,
            FramingScheme::LengthPrefixed => LENGTH_DIGITS + 3,
        }
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// marker-only:      ┌─────┬──────────────────────┬─────┐
///                   │ '<' │ payload (no '>')     │ '>' │
///                   └─────┴──────────────────────┴─────┘
/// length-prefixed:  ┌─────┬────────┬─────┬─────────────┬─────┐
///                   │ '<' │ LLLL   │ '>' │ payload     │ '>' │
///                   │     │ ASCII  │     │ (LLLL bytes)│     │
///                   └─────┴────────┴─────┴─────────────┴─────┘
/// ```
///
/// Nothing is written to `dst` when the payload is rejected.
pub fn encode_frame(
    scheme: FramingScheme,
    payload: &[u8],
    dst: &mut BytesMut,
    max_payload: usize,
) -> Result<()> {
    let max = max_payload.min(MAX_PAYLOAD);
    if payload.len() > max {
        return Err(FrameError::FrameTooLarge {
            size: payload.len(),
            max,
        });
    }

    dst.reserve(scheme.overhead() + payload.len());
    match scheme {
        FramingScheme::MarkerOnly => {
            if let Some(offset) = payload.iter().position(|&b| b == END_MARKER) {
                return Err(FrameError::ReservedByte { offset });
            }
            dst.put_u8(START_MARKER);
            dst.put_slice(payload);
            dst.put_u8(END_MARKER);
        }
        FramingScheme::LengthPrefixed => {
            dst.put_u8(START_MARKER);
            dst.put_slice(format!("{:0width$}", payload.len(), width = LENGTH_DIGITS).as_bytes());
            dst.put_u8(END_MARKER);
            dst.put_slice(payload);
            dst.put_u8(END_MARKER);
        }
    }
    Ok(())
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// Noise before the start marker is discarded. On success or on a protocol
/// violation, the bytes examined so far are consumed from the buffer.
pub fn decode_frame(
    scheme: FramingScheme,
    src: &mut BytesMut,
    max_payload: usize,
) -> Result<Option<Message>> {
    let mut parser = StreamParser::with_config(&FrameConfig {
        scheme,
        max_payload_size: max_payload,
        ..FrameConfig::default()
    });

    for idx in 0..src.len() {
        match parser.push(src[idx]) {
            Ok(Some(message)) => {
                src.advance(idx + 1);
                return Ok(Some(message));
            }
            Ok(None) => {}
            Err(err) => {
                // A start marker that broke a length field opens the next frame.
                let consumed = if parser.state() == ParserState::Idle {
                    idx + 1
                } else {
                    idx
                };
                src.advance(consumed);
                return Err(err);
            }
        }
    }

    // Need more data. Keep the partial frame, drop the noise ahead of it.
    if parser.state() == ParserState::Idle {
        src.clear();
    } else if let Some(start) = src.iter().position(|&b| b == START_MARKER) {
        src.advance(start);
    }
    Ok(None)
}

/// Configuration for framing on a link.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Wire layout. Default: length-prefixed.
    pub scheme: FramingScheme,
    /// Maximum payload size in bytes. Default: 9999.
    pub max_payload_size: usize,
    /// How long to wait for each byte before giving up on a frame.
    pub read_timeout: Duration,
    /// Keep a partially received frame across timed-out reads.
    pub persist_partial: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            scheme: FramingScheme::default(),
            max_payload_size: MAX_PAYLOAD,
            read_timeout: Duration::from_secs(1),
            persist_partial: false,
        }
    }
}
