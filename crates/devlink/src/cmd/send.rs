use std::fs;

use devlink_comm::Communicator;

use crate::cmd::{parse_duration, LinkOptions, SendArgs};
use crate::exit::{comm_error, io_error, setup_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, link: &LinkOptions, format: OutputFormat) -> CliResult<i32> {
    let mut config = link.resolve(&args.port)?;
    if args.wait {
        config.receive_timeout_seconds = parse_duration(&args.wait_timeout)?.as_secs_f64();
    }

    let payload = resolve_payload(&args)?;
    let comm = Communicator::open(&config).map_err(|err| setup_error("open failed", err))?;

    comm.send(payload)
        .map_err(|err| comm_error("send failed", err))?;

    if args.wait {
        let reply = comm
            .receive()
            .map_err(|err| comm_error("receive failed", err))?;
        print_message(&reply, &args.port, format);
    }

    comm.close().map_err(|err| comm_error("close failed", err))?;
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
