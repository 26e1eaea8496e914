use std::time::Duration;

use devlink_transport::TransportError;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds what the frame format (or configuration) allows.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A non-digit byte appeared inside the length field.
    #[error("malformed length field (unexpected byte {found:#04x})")]
    MalformedLength { found: u8 },

    /// The length field was closed before any digit arrived.
    #[error("empty length field")]
    EmptyLength,

    /// A marker-only payload contains the end marker and cannot be framed.
    #[error("payload contains reserved end marker at offset {offset}")]
    ReservedByte { offset: usize },

    /// A length-prefixed payload was not followed by the end marker.
    #[error("missing end marker after payload (found {found:#04x})")]
    MissingEndMarker { found: u8 },

    /// No complete frame arrived within the read timeout.
    #[error("no complete frame within {0:?}")]
    Timeout(Duration),

    /// The payload is not valid UTF-8 text.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The underlying transport failed.
    #[error("frame transport error: {0}")]
    Transport(#[from] TransportError),
}

impl FrameError {
    /// True if the offending frame was dropped and the next read starts fresh.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FrameError::FrameTooLarge { .. }
                | FrameError::MalformedLength { .. }
                | FrameError::EmptyLength
                | FrameError::ReservedByte { .. }
                | FrameError::MissingEndMarker { .. }
                | FrameError::InvalidUtf8(_)
        )
    }
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        FrameError::Transport(TransportError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
