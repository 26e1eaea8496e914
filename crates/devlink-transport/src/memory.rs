use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// One direction of a duplex link.
#[derive(Default)]
struct Pipe {
    state: Mutex<PipeState>,
    ready: Condvar,
}

#[derive(Default)]
struct PipeState {
    bytes: VecDeque<u8>,
    writer_closed: bool,
}

impl Pipe {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        // A panicking peer thread cannot leave the byte queue half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-process duplex byte link.
///
/// [`MemoryTransport::pair`] returns two connected ends: bytes written to one
/// end are read from the other, in order. Reads block until a byte arrives or
/// the timeout elapses, which makes the pair a faithful stand-in for a serial
/// line in tests and loopback demos.
pub struct MemoryTransport {
    inbound: Arc<Pipe>,
    outbound: Arc<Pipe>,
    closed: bool,
}

impl MemoryTransport {
    /// Create a connected pair of transports.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());

        let a = Self {
            inbound: Arc::clone(&b_to_a),
            outbound: Arc::clone(&a_to_b),
            closed: false,
        };
        let b = Self {
            inbound: a_to_b,
            outbound: b_to_a,
            closed: false,
        };
        (a, b)
    }

    /// Number of bytes waiting to be read on this end.
    pub fn pending(&self) -> usize {
        self.inbound.lock().bytes.len()
    }
}

impl Transport for MemoryTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut state = self.outbound.lock();
        state.bytes.extend(bytes.iter().copied());
        drop(state);
        self.outbound.ready.notify_all();
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.inbound.lock();
        loop {
            if let Some(byte) = state.bytes.pop_front() {
                return Ok(Some(byte));
            }
            if state.writer_closed {
                return Err(TransportError::Io(std::io::Error::from(
                    std::io::ErrorKind::UnexpectedEof,
                )));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .inbound
                .ready
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.outbound.lock().writer_closed = true;
        self.outbound.ready.notify_all();
        debug!("memory transport closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("pending", &self.pending())
            .field("closed", &self.closed)
            .finish()
    }
}
