use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Settings used to open a serial line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyACM0` or `COM3`.
    pub port_name: String,
    /// Line speed in bits per second.
    pub baud_rate: u32,
    /// Use RTS/CTS hardware flow control.
    pub hardware_flow_control: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: "/dev/ttyACM0".to_string(),
            baud_rate: 9600,
            hardware_flow_control: true,
        }
    }
}

/// Serial line transport backed by the OS driver.
pub struct SerialPort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    current_timeout: Duration,
}

impl SerialPort {
    const INITIAL_TIMEOUT: Duration = Duration::from_millis(100);

    /// Open and configure a serial device.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let flow = if config.hardware_flow_control {
            serialport::FlowControl::Hardware
        } else {
            serialport::FlowControl::None
        };

        let port = serialport::new(&config.port_name, config.baud_rate)
            .flow_control(flow)
            .timeout(Self::INITIAL_TIMEOUT)
            .open()
            .map_err(|err| TransportError::Open {
                port: config.port_name.clone(),
                source: err.into(),
            })?;

        info!(
            port = %config.port_name,
            baud_rate = config.baud_rate,
            "serial port opened"
        );

        Ok(Self {
            port: Some(port),
            name: config.port_name.clone(),
            current_timeout: Self::INITIAL_TIMEOUT,
        })
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

impl Transport for SerialPort {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        if self.current_timeout != timeout {
            self.port_mut()?.set_timeout(timeout)?;
            self.current_timeout = timeout;
        }

        let port = self.port_mut()?;
        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(None),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!(port = %self.name, "serial port closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.port.is_none()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("name", &self.name)
            .field("closed", &self.port.is_none())
            .finish()
    }
}
