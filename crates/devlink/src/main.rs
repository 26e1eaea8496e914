mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::{Command, Framing, LinkOptions};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "devlink", version, about = "Framed serial links to microcontrollers")]
struct Cli {
    /// JSON config file (camelCase keys, e.g. {"baudRate": 115200}).
    #[arg(long, value_name = "FILE", global = true, env = "DEVLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Line speed; overrides the config file.
    #[arg(long, value_name = "BAUD", global = true)]
    baud: Option<u32>,

    /// Wire framing; overrides the config file.
    #[arg(long, value_name = "SCHEME", global = true)]
    framing: Option<Framing>,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let link = LinkOptions {
        config: cli.config,
        baud: cli.baud,
        framing: cli.framing,
    };
    let result = cmd::run(cli.command, &link, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
