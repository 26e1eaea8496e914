/// Errors that can occur in device transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open or configure the device.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the byte stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A bus transfer to a peripheral failed.
    #[error("bus error at address {address:#04x}: {source}")]
    Bus {
        address: u16,
        source: std::io::Error,
    },

    /// The serial driver reported an error.
    #[cfg(feature = "serial")]
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The transport has already been closed.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Returns true if this error means the device handle is no longer usable.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Io(err) => !matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
            ),
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
