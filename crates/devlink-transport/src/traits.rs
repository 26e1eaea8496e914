use std::time::Duration;

use crate::error::Result;

/// A byte-oriented link to a peripheral device.
///
/// This is the fundamental I/O seam of devlink. A serial line, a loopback
/// pair, or a test double all look the same to the framing layer: bytes go
/// out in one piece and come back one at a time.
///
/// Implementations own their device handle exclusively. `close` must be
/// idempotent: the first call releases the handle, later calls return `Ok(())`.
pub trait Transport: Send {
    /// Write every byte of `bytes` to the device.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read a single byte, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` if nothing arrived in time.
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>>;

    /// Release the device handle.
    fn close(&mut self) -> Result<()>;

    /// Whether `close` has already run.
    fn is_closed(&self) -> bool;

    /// Transport name for diagnostics.
    fn name(&self) -> &str {
        "transport"
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        (**self).read_byte(timeout)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
