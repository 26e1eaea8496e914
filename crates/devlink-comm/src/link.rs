use devlink_frame::{FramedTransport, Message};
use devlink_transport::Transport;

use crate::error::Result;

/// A message-level link serviced by the dispatcher.
///
/// Framed byte links are self-describing; block links (I2C) need the caller
/// to state how many bytes to read.
pub trait Link: Send + 'static {
    /// Deliver one message to the device.
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Receive one message. `expected_len` is required by block links and
    /// ignored by framed links.
    fn receive(&mut self, expected_len: Option<usize>) -> Result<Message>;

    /// Release the device. Must be idempotent.
    fn close(&mut self) -> Result<()>;

    /// Link name for diagnostics.
    fn name(&self) -> &str;
}

impl<T: Transport + 'static> Link for FramedTransport<T> {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        FramedTransport::send(self, payload)?;
        Ok(())
    }

    fn receive(&mut self, _expected_len: Option<usize>) -> Result<Message> {
        Ok(self.recv()?)
    }

    fn close(&mut self) -> Result<()> {
        FramedTransport::close(self)?;
        Ok(())
    }

    fn name(&self) -> &str {
        self.get_ref().name()
    }
}
