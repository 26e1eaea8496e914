//! Framed message links to microcontrollers.
//!
//! devlink talks to small devices (Arduino-class boards and the like) over a
//! serial line or an I2C bus. Messages travel in short `<`/`>` delimited
//! frames, optionally carrying a four-digit length, and every link access is
//! serialized through one dispatcher thread.
//!
//! # Crate Structure
//!
//! - [`transport`] - Byte and block transports (serial, I2C, in-memory)
//! - [`frame`] - Frame codec and incremental stream parser
//! - [`comm`] - Readiness handshake, dispatcher, and the [`comm::Communicator`]

/// Re-export transport types.
pub mod transport {
    pub use devlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use devlink_frame::*;
}

/// Re-export communicator types.
pub mod comm {
    pub use devlink_comm::*;
}

pub use devlink_comm::{CommError, Communicator, CommunicatorConfig, SetupError};
pub use devlink_frame::{FramingScheme, Message};
