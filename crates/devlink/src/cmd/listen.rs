use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use devlink_comm::{CommError, Communicator};
use tracing::warn;

use crate::cmd::{LinkOptions, ListenArgs};
use crate::exit::{comm_error, setup_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, link: &LinkOptions, format: OutputFormat) -> CliResult<i32> {
    let config = link.resolve(&args.port)?;
    let comm = Communicator::open(&config).map_err(|err| setup_error("open failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let message = match comm.receive() {
            Ok(message) => message,
            Err(CommError::Timeout(_)) => continue,
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "dropped frame");
                continue;
            }
            Err(err) => return Err(comm_error("receive failed", err)),
        };

        print_message(&message, &args.port, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    comm.close().map_err(|err| comm_error("close failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
