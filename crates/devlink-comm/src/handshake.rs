use std::fmt;
use std::time::{Duration, Instant};

use devlink_frame::{Message, StreamParser};
use devlink_transport::{Transport, TransportError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SetupError;

const MAX_READY_TOKEN_LEN: usize = 256;

/// How a received message is compared against the ready token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadyMatch {
    /// The token may appear anywhere in the message.
    #[default]
    Substring,
    /// The message must start with the token.
    Prefix,
}

impl ReadyMatch {
    pub fn matches(self, message: &Message, token: &str) -> bool {
        match self {
            ReadyMatch::Substring => message.contains_text(token),
            ReadyMatch::Prefix => message.as_bytes().starts_with(token.as_bytes()),
        }
    }
}

/// Configuration for the readiness handshake.
#[derive(Clone)]
pub struct HandshakeConfig {
    /// Text the device sends once it is ready. Must not be empty.
    pub ready_token: String,
    /// How the token is matched.
    pub match_mode: ReadyMatch,
    /// Give up after this long. `None` waits forever.
    pub max_wait: Option<Duration>,
    /// Per-byte read timeout while waiting.
    pub read_timeout: Duration,
}

impl HandshakeConfig {
    /// Handshake on `ready_token` with default timing.
    pub fn new(ready_token: impl Into<String>) -> Self {
        Self {
            ready_token: ready_token.into(),
            ..Self::default()
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            ready_token: String::new(),
            match_mode: ReadyMatch::default(),
            max_wait: Some(Duration::from_secs(10)),
            read_timeout: Duration::from_millis(250),
        }
    }
}

impl fmt::Debug for HandshakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeConfig")
            .field("ready_token", &self.ready_token)
            .field("match_mode", &self.match_mode)
            .field("max_wait", &self.max_wait)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// The message that carried the ready token.
    pub ready_message: Message,
    /// Complete frames consumed, the ready message included.
    pub frames_seen: usize,
    /// Malformed frames dropped while waiting.
    pub frames_dropped: usize,
    /// Time spent waiting.
    pub elapsed: Duration,
}

/// Drive `parser` over `transport` until a message matches the ready token.
///
/// Stops at the first match and reads nothing beyond that frame. The deadline
/// is checked before every byte, so a line that never goes quiet still times
/// out. Timed-out reads and malformed frames are tolerated while waiting;
/// transport failures end the handshake.
pub fn wait_for_ready<T: Transport + ?Sized>(
    parser: &mut StreamParser,
    transport: &mut T,
    config: &HandshakeConfig,
) -> Result<HandshakeOutcome, SetupError> {
    validate_ready_token(&config.ready_token)?;
    if config.read_timeout.is_zero() {
        return Err(SetupError::InvalidConfig(
            "handshake read timeout must be greater than zero".to_string(),
        ));
    }

    info!(token = %config.ready_token, "waiting for device ready");

    let start = Instant::now();
    let deadline = config.max_wait.map(|wait| start + wait);
    let mut frames_seen = 0usize;
    let mut frames_dropped = 0usize;

    loop {
        let read_timeout = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    parser.reset();
                    warn!(frames_seen, "device never reported ready");
                    return Err(SetupError::HandshakeTimeout(
                        config.max_wait.unwrap_or_default(),
                    ));
                }
                config.read_timeout.min(deadline - now)
            }
            None => config.read_timeout,
        };

        let byte = match transport.read_byte(read_timeout) {
            Ok(Some(byte)) => byte,
            Ok(None) => {
                parser.read_timed_out();
                continue;
            }
            Err(err) => {
                parser.reset();
                return Err(transport_failure(err));
            }
        };

        match parser.push(byte) {
            Ok(Some(message)) => {
                frames_seen += 1;
                if config.match_mode.matches(&message, &config.ready_token) {
                    let elapsed = start.elapsed();
                    info!(frames_seen, ?elapsed, "device connection established");
                    return Ok(HandshakeOutcome {
                        ready_message: message,
                        frames_seen,
                        frames_dropped,
                        elapsed,
                    });
                }
                debug!(len = message.len(), "ignoring message before ready token");
            }
            Ok(None) => {}
            Err(err) => {
                frames_dropped += 1;
                debug!(error = %err, "dropping malformed frame during handshake");
            }
        }
    }
}

fn transport_failure(err: TransportError) -> SetupError {
    match err {
        TransportError::Closed => {
            SetupError::HandshakeFailed("transport closed during handshake".to_string())
        }
        TransportError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            SetupError::HandshakeFailed("device disconnected during handshake".to_string())
        }
        other => SetupError::Transport(other),
    }
}

pub(crate) fn validate_ready_token(token: &str) -> Result<(), SetupError> {
    if token.is_empty() || token.len() > MAX_READY_TOKEN_LEN {
        return Err(SetupError::InvalidConfig(format!(
            "invalid ready token length: {} (expected 1..={})",
            token.len(),
            MAX_READY_TOKEN_LEN
        )));
    }
    Ok(())
}
