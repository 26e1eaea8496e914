use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use devlink_comm::CommunicatorConfig;
use devlink_frame::FramingScheme;

use crate::exit::{setup_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod probe;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message to a device.
    Send(SendArgs),
    /// Print messages received from a device.
    Listen(ListenArgs),
    /// Wait for a device to report ready.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Link settings shared by every subcommand that opens a port.
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    pub config: Option<PathBuf>,
    pub baud: Option<u32>,
    pub framing: Option<Framing>,
}

impl LinkOptions {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn resolve(&self, port: &str) -> CliResult<CommunicatorConfig> {
        let mut config = match &self.config {
            Some(path) => CommunicatorConfig::from_json_file(path)
                .map_err(|err| setup_error("config load failed", err))?,
            None => CommunicatorConfig::default(),
        };
        config.port_name = port.to_string();
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(framing) = self.framing {
            config.framing = framing.into();
        }
        config
            .validate()
            .map_err(|err| setup_error("invalid configuration", err))?;
        Ok(config)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Framing {
    /// `<payload>`
    MarkerOnly,
    /// `<LLLL>payload>`
    LengthPrefixed,
}

impl From<Framing> for FramingScheme {
    fn from(framing: Framing) -> Self {
        match framing {
            Framing::MarkerOnly => FramingScheme::MarkerOnly,
            Framing::LengthPrefixed => FramingScheme::LengthPrefixed,
        }
    }
}

pub fn run(command: Command, link: &LinkOptions, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, link, format),
        Command::Listen(args) => listen::run(args, link, format),
        Command::Probe(args) => probe::run(args, link, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Serial port, e.g. /dev/ttyACM0 or COM3.
    pub port: String,
    /// Text payload.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Per-byte read timeout while waiting for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Serial port to read from.
    pub port: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Serial port to probe.
    pub port: String,
    /// Text the device sends once it is ready.
    #[arg(long)]
    pub token: String,
    /// Require the message to start with the token.
    #[arg(long)]
    pub prefix: bool,
    /// Give up after this long (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let link = LinkOptions {
            config: None,
            baud: Some(115200),
            framing: Some(Framing::MarkerOnly),
        };
        let config = link.resolve("/dev/ttyUSB0").unwrap();
        assert_eq!(config.port_name, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.framing, FramingScheme::MarkerOnly);
    }

    #[test]
    fn zero_baud_is_usage_error() {
        let link = LinkOptions {
            baud: Some(0),
            ..LinkOptions::default()
        };
        let err = link.resolve("/dev/ttyUSB0").unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn missing_config_file_is_usage_error() {
        let link = LinkOptions {
            config: Some(PathBuf::from("/nonexistent/devlink.json")),
            ..LinkOptions::default()
        };
        assert_eq!(link.resolve("/dev/ttyUSB0").unwrap_err().code, USAGE);
    }
}
