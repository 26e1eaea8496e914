//! Transport abstraction for host/device links.
//!
//! Provides a unified interface over the channels a host uses to talk to a
//! peripheral:
//! - Byte-oriented links (serial lines, in-memory loopback) via [`Transport`]
//! - Register-addressed block links (I2C/SMBus) via [`I2cBus`]
//!
//! This is the lowest layer of devlink. Framing and dispatch build on top of
//! the traits defined here; opening and configuring real hardware lives behind
//! the `serial` feature.

pub mod error;
pub mod i2c;
pub mod memory;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;

pub use error::{Result, TransportError};
pub use i2c::{I2cBus, I2C_BLOCK_MAX};
pub use memory::MemoryTransport;
pub use traits::Transport;

#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialPort};
