use std::path::Path;
use std::time::Duration;

use devlink_frame::{FrameConfig, FramingScheme, MAX_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::error::SetupError;
use crate::handshake::{validate_ready_token, HandshakeConfig, ReadyMatch};

/// Communicator settings, loadable from JSON.
///
/// Missing keys take their defaults, so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommunicatorConfig {
    pub baud_rate: u32,
    pub port_name: String,
    /// Per-byte read timeout, in seconds.
    pub receive_timeout_seconds: f64,
    /// Text the device sends when it is ready.
    pub ready_verification_token: Option<String>,
    /// Run the readiness handshake before accepting requests.
    pub wait_for_connection: bool,
    pub framing: FramingScheme,
    /// Handshake deadline in seconds; `null` waits forever.
    pub handshake_timeout_seconds: Option<f64>,
    pub ready_match: ReadyMatch,
    /// Keep partial frames across timed-out reads.
    pub persist_partial_frames: bool,
    pub max_payload_size: usize,
    pub hardware_flow_control: bool,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            port_name: "/dev/ttyACM0".to_string(),
            receive_timeout_seconds: 1.0,
            ready_verification_token: None,
            wait_for_connection: false,
            framing: FramingScheme::default(),
            handshake_timeout_seconds: Some(10.0),
            ready_match: ReadyMatch::default(),
            persist_partial_frames: false,
            max_payload_size: MAX_PAYLOAD,
            hardware_flow_control: true,
        }
    }
}

impl CommunicatorConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, SetupError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SetupError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        if !(self.receive_timeout_seconds.is_finite() && self.receive_timeout_seconds > 0.0) {
            return Err(SetupError::InvalidConfig(format!(
                "receiveTimeoutSeconds must be positive, got {}",
                self.receive_timeout_seconds
            )));
        }
        if self.max_payload_size == 0 || self.max_payload_size > MAX_PAYLOAD {
            return Err(SetupError::InvalidConfig(format!(
                "maxPayloadSize must be in 1..={MAX_PAYLOAD}, got {}",
                self.max_payload_size
            )));
        }
        if self.baud_rate == 0 {
            return Err(SetupError::InvalidConfig(
                "baudRate must be greater than zero".to_string(),
            ));
        }
        if let Some(secs) = self.handshake_timeout_seconds {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(SetupError::InvalidConfig(format!(
                    "handshakeTimeoutSeconds must be positive, got {secs}"
                )));
            }
        }
        if self.wait_for_connection {
            match &self.ready_verification_token {
                Some(token) => validate_ready_token(token)?,
                None => {
                    return Err(SetupError::InvalidConfig(
                        "waitForConnection requires readyVerificationToken".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Per-byte read timeout.
    pub fn receive_timeout(&self) -> Duration {
        seconds(self.receive_timeout_seconds).unwrap_or(Duration::from_secs(1))
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            scheme: self.framing,
            max_payload_size: self.max_payload_size,
            read_timeout: self.receive_timeout(),
            persist_partial: self.persist_partial_frames,
        }
    }

    /// Handshake settings, or `None` when the handshake is disabled.
    pub fn handshake_config(&self) -> Option<HandshakeConfig> {
        if !self.wait_for_connection {
            return None;
        }
        let token = self.ready_verification_token.clone()?;
        let defaults = HandshakeConfig::default();
        Some(HandshakeConfig {
            ready_token: token,
            match_mode: self.ready_match,
            max_wait: self.handshake_timeout_seconds.and_then(seconds),
            read_timeout: defaults.read_timeout.min(self.receive_timeout()),
        })
    }

    #[cfg(feature = "serial")]
    pub fn serial_config(&self) -> devlink_transport::SerialConfig {
        devlink_transport::SerialConfig {
            port_name: self.port_name.clone(),
            baud_rate: self.baud_rate,
            hardware_flow_control: self.hardware_flow_control,
        }
    }
}

fn seconds(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}
