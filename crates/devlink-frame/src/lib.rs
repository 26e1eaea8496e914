//! Message framing for host/device byte links.
//!
//! Two wire schemes are supported, both opened by a `<` start marker:
//! - Marker-only: `<payload>`, payload must not contain `>`
//! - Length-prefixed: `<LLLL>payload>`, a 4-digit zero-padded decimal length,
//!   binary-safe
//!
//! The [`StreamParser`] consumes bytes one at a time and yields complete
//! messages, discarding line noise before a frame starts.

pub mod codec;
pub mod error;
pub mod framed;
pub mod message;
pub mod parser;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{
    decode_frame, encode_frame, FrameConfig, FramingScheme, END_MARKER, LENGTH_DIGITS,
    MAX_PAYLOAD, START_MARKER,
};
pub use error::{FrameError, Result};
pub use framed::FramedTransport;
pub use message::Message;
pub use parser::{ParserState, StreamParser};

#[cfg(feature = "async")]
pub use tokio_codec::LinkCodec;
