use devlink_frame::{FrameError, Message};
use devlink_transport::{I2cBus, TransportError, I2C_BLOCK_MAX};
use tracing::debug;

use crate::error::{CommError, Result};
use crate::link::Link;

/// Register every block transfer starts at.
pub const DATA_REGISTER: u8 = 0;

/// Block link to one device on an I2C bus.
///
/// Frames carry no markers: each send writes the payload as one block at
/// register 0, and each receive reads exactly the requested number of bytes.
pub struct I2cLink<B> {
    bus: B,
    address: u16,
    closed: bool,
}

impl<B: I2cBus> I2cLink<B> {
    pub fn new(bus: B, address: u16) -> Self {
        Self {
            bus,
            address,
            closed: false,
        }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    /// Borrow the underlying bus.
    pub fn get_ref(&self) -> &B {
        &self.bus
    }

    fn check_block(&self, len: usize) -> Result<()> {
        if len > I2C_BLOCK_MAX {
            return Err(CommError::Frame(FrameError::FrameTooLarge {
                size: len,
                max: I2C_BLOCK_MAX,
            }));
        }
        if self.closed {
            return Err(CommError::Transport(TransportError::Closed));
        }
        Ok(())
    }
}

impl<B: I2cBus + 'static> Link for I2cLink<B> {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.check_block(payload.len())?;
        self.bus.write_block(self.address, DATA_REGISTER, payload)?;
        debug!(address = self.address, len = payload.len(), "i2c block written");
        Ok(())
    }

    fn receive(&mut self, expected_len: Option<usize>) -> Result<Message> {
        let len = expected_len.ok_or(CommError::ExpectedLengthRequired)?;
        self.check_block(len)?;
        let block = self.bus.read_block(self.address, DATA_REGISTER, len)?;
        debug!(address = self.address, len = block.len(), "i2c block read");
        Ok(Message::from(block))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.bus.close()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "i2c"
    }
}

impl<B> std::fmt::Debug for I2cLink<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I2cLink")
            .field("address", &format_args!("{:#04x}", self.address))
            .field("closed", &self.closed)
            .finish()
    }
}
