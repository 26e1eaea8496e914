use std::fmt;
use std::io;

use devlink_comm::{CommError, SetupError};
use devlink_frame::FrameError;
use devlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => {
            TRANSPORT_ERROR
        }
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn comm_error(context: &str, err: CommError) -> CliError {
    match err {
        CommError::Frame(err) => frame_error(context, err),
        CommError::Transport(err) => transport_error(context, err),
        CommError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        CommError::ExpectedLengthRequired => CliError::new(USAGE, format!("{context}: {err}")),
        CommError::Cancelled | CommError::DispatcherStopped => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

pub fn setup_error(context: &str, err: SetupError) -> CliError {
    match err {
        SetupError::Transport(err) => transport_error(context, err),
        SetupError::InvalidConfig(_) | SetupError::ConfigFile { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        SetupError::ConfigParse(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        SetupError::HandshakeTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        SetupError::HandshakeFailed(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        SetupError::Spawn(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
