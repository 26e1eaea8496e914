//! Device communicators.
//!
//! This is the "just works" layer. Open a link, optionally wait for the
//! device to announce it is ready, then send and receive messages. Every
//! transport access goes through one dispatcher thread, so concurrent callers
//! can never interleave frames on the wire.

pub mod communicator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod i2c;
pub mod link;

pub use communicator::Communicator;
pub use config::CommunicatorConfig;
pub use dispatcher::{Completion, Dispatcher};
pub use error::{CommError, Result, SetupError};
pub use handshake::{wait_for_ready, HandshakeConfig, HandshakeOutcome, ReadyMatch};
pub use i2c::I2cLink;
pub use link::Link;
