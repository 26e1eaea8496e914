//! Host and simulated device over an in-memory link.
//!
//! The device thread announces readiness, then answers each command with an
//! acknowledgement. Run with `cargo run -p devlink --example loopback`.

use std::thread;
use std::time::Duration;

use devlink::comm::{Communicator, CommunicatorConfig};
use devlink::frame::{FrameConfig, FrameError, FramedTransport};
use devlink::transport::MemoryTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host, device) = MemoryTransport::pair();

    let device_thread = thread::spawn(move || -> Result<usize, FrameError> {
        let mut device = FramedTransport::with_config(device, FrameConfig::default());
        device.send(b"booting")?;
        device.send(b"device is ready")?;

        let mut handled = 0;
        loop {
            let command = match device.recv_timeout(Duration::from_secs(2)) {
                Ok(command) => command,
                Err(FrameError::Timeout(_)) => continue,
                Err(FrameError::Transport(_)) => return Ok(handled),
                Err(err) => return Err(err),
            };
            let reply = format!("ack {}", command.text()?);
            device.send(reply.as_bytes())?;
            handled += 1;
        }
    });

    let config = CommunicatorConfig {
        wait_for_connection: true,
        ready_verification_token: Some("ready".to_string()),
        ..CommunicatorConfig::default()
    };
    let comm = Communicator::with_transport(host, &config)?;
    if let Some(ready) = comm.ready_message() {
        println!("device said: {}", ready.text()?);
    }

    for command in ["LED:ON", "SERVO:90", "LED:OFF"] {
        comm.send(command)?;
        println!("{command} -> {}", comm.receive_text()?);
    }

    comm.close()?;
    let handled = device_thread
        .join()
        .map_err(|_| "device thread panicked")??;
    println!("device handled {handled} commands");
    Ok(())
}
