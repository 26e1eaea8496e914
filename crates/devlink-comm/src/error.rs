use std::path::PathBuf;
use std::time::Duration;

use devlink_frame::FrameError;
use devlink_transport::TransportError;

/// Fatal errors raised while bringing a communicator up.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The device could not be opened or failed during setup.
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),

    /// The configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A configuration document is not valid JSON for this schema.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The ready token never arrived.
    #[error("device not ready after {0:?}")]
    HandshakeTimeout(Duration),

    /// The link went away before the device reported ready.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The dispatcher thread could not be started.
    #[error("failed to start dispatcher: {0}")]
    Spawn(std::io::Error),
}

/// Errors returned by individual send/receive operations.
#[derive(Debug, thiserror::Error)]
pub enum CommError {
    /// The frame was rejected or dropped.
    #[error("frame error: {0}")]
    Frame(FrameError),

    /// The transport failed; close and reopen the communicator.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// No complete message arrived in time.
    #[error("receive timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the request before it was serviced.
    #[error("request cancelled")]
    Cancelled,

    /// The dispatcher is no longer running.
    #[error("dispatcher stopped")]
    DispatcherStopped,

    /// Block links need the caller to say how many bytes to read.
    #[error("receive on this link requires an expected length")]
    ExpectedLengthRequired,
}

impl CommError {
    /// True if the caller may simply retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CommError::Timeout(_) | CommError::Cancelled => true,
            CommError::Frame(err) => err.is_protocol_violation(),
            CommError::Transport(err) => !err.is_fatal(),
            CommError::DispatcherStopped | CommError::ExpectedLengthRequired => false,
        }
    }

    /// True if the link can no longer be used.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, CommError::Transport(err) if err.is_fatal())
    }
}

impl From<FrameError> for CommError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Timeout(after) => CommError::Timeout(after),
            FrameError::Transport(err) => CommError::Transport(err),
            other => CommError::Frame(other),
        }
    }
}

impl From<TransportError> for CommError {
    fn from(err: TransportError) -> Self {
        CommError::Transport(err)
    }
}

pub type Result<T> = std::result::Result<T, CommError>;
