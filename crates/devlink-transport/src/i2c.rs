use crate::error::Result;

/// Largest block an SMBus block transfer can carry.
pub const I2C_BLOCK_MAX: usize = 32;

/// A register-addressed block bus (I2C/SMBus).
///
/// I2C transfers carry no markers: the caller decides the block length and
/// the register offset. Bus failures must be reported as
/// [`TransportError::Bus`](crate::TransportError::Bus) so callers see one
/// error taxonomy regardless of the link.
pub trait I2cBus: Send {
    /// Write `data` as one block starting at `register` on device `address`.
    fn write_block(&mut self, address: u16, register: u8, data: &[u8]) -> Result<()>;

    /// Read exactly `len` bytes starting at `register` on device `address`.
    fn read_block(&mut self, address: u16, register: u8, len: usize) -> Result<Vec<u8>>;

    /// Release the bus handle. Must be idempotent.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: I2cBus + ?Sized> I2cBus for Box<B> {
    fn write_block(&mut self, address: u16, register: u8, data: &[u8]) -> Result<()> {
        (**self).write_block(address, register, data)
    }

    fn read_block(&mut self, address: u16, register: u8, len: usize) -> Result<Vec<u8>> {
        (**self).read_block(address, register, len)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
