use devlink_comm::{Communicator, ReadyMatch};

use crate::cmd::{parse_duration, LinkOptions, ProbeArgs};
use crate::exit::{comm_error, setup_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_probe, OutputFormat};

pub fn run(args: ProbeArgs, link: &LinkOptions, format: OutputFormat) -> CliResult<i32> {
    let mut config = link.resolve(&args.port)?;
    config.wait_for_connection = true;
    config.ready_verification_token = Some(args.token.clone());
    config.handshake_timeout_seconds = Some(parse_duration(&args.timeout)?.as_secs_f64());
    if args.prefix {
        config.ready_match = ReadyMatch::Prefix;
    }

    let comm = Communicator::open(&config).map_err(|err| setup_error("probe failed", err))?;
    let outcome = comm
        .handshake()
        .cloned()
        .ok_or_else(|| CliError::new(INTERNAL, "handshake did not run"))?;
    comm.close().map_err(|err| comm_error("close failed", err))?;

    print_probe(&outcome, &args.port, format);
    Ok(SUCCESS)
}
