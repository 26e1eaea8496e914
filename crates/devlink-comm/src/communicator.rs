use devlink_frame::{FramedTransport, Message};
use devlink_transport::{I2cBus, Transport};
use tracing::{debug, info};

use crate::config::CommunicatorConfig;
use crate::dispatcher::{Completion, Dispatcher};
use crate::error::{Result, SetupError};
use crate::handshake::{wait_for_ready, HandshakeOutcome};
use crate::i2c::I2cLink;
use crate::link::Link;

/// Message-level handle to one device.
///
/// All requests are queued to a single dispatcher thread that owns the link,
/// so a `Communicator` can be shared (for example behind an `Arc`) by any
/// number of threads without frames ever interleaving on the wire.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use devlink_comm::{Communicator, CommunicatorConfig};
/// use devlink_transport::MemoryTransport;
///
/// let (host, _device) = MemoryTransport::pair();
/// let comm = Communicator::with_transport(host, &CommunicatorConfig::default())?;
/// comm.send("LED:ON")?;
/// let reply = comm.receive_text()?;
/// println!("{reply}");
/// comm.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Communicator {
    dispatcher: Dispatcher,
    ready: Option<HandshakeOutcome>,
}

impl Communicator {
    /// Open the configured serial port, wait for the device if asked to, and
    /// start the dispatcher.
    #[cfg(feature = "serial")]
    pub fn open(config: &CommunicatorConfig) -> std::result::Result<Self, SetupError> {
        config.validate()?;
        let port = devlink_transport::SerialPort::open(&config.serial_config())?;
        Self::with_transport(port, config)
    }

    /// Frame `transport` per `config`, run the readiness handshake when
    /// `waitForConnection` is set, and start the dispatcher.
    ///
    /// If the handshake fails the transport is closed before returning.
    pub fn with_transport<T: Transport + 'static>(
        transport: T,
        config: &CommunicatorConfig,
    ) -> std::result::Result<Self, SetupError> {
        config.validate()?;
        let mut framed = FramedTransport::with_config(transport, config.frame_config());

        let ready = match config.handshake_config() {
            Some(handshake) => {
                let (parser, transport) = framed.parts_mut();
                match wait_for_ready(parser, transport, &handshake) {
                    Ok(outcome) => Some(outcome),
                    Err(err) => {
                        if let Err(close_err) = framed.close() {
                            debug!(error = %close_err, "close after failed handshake");
                        }
                        return Err(err);
                    }
                }
            }
            None => None,
        };

        let dispatcher = Dispatcher::spawn(framed)?;
        Ok(Self { dispatcher, ready })
    }

    /// Talk to the device at `address` on an I2C bus.
    ///
    /// Block links carry no framing, so receives must use
    /// [`receive_exact`](Self::receive_exact).
    pub fn i2c<B: I2cBus + 'static>(
        bus: B,
        address: u16,
    ) -> std::result::Result<Self, SetupError> {
        info!(address = format_args!("{address:#04x}"), "opening i2c link");
        Self::with_link(I2cLink::new(bus, address))
    }

    /// Start a dispatcher over any [`Link`].
    pub fn with_link<L: Link>(link: L) -> std::result::Result<Self, SetupError> {
        Ok(Self {
            dispatcher: Dispatcher::spawn(link)?,
            ready: None,
        })
    }

    /// Queue a message for sending.
    pub fn send_msg(&self, message: impl Into<Message>) -> Completion<()> {
        self.dispatcher.enqueue_send(message.into())
    }

    /// Queue a receive of the next framed message.
    pub fn receive_msg(&self) -> Completion<Message> {
        self.dispatcher.enqueue_receive(None)
    }

    /// Queue a receive of exactly `len` bytes (block links).
    pub fn receive_exact(&self, len: usize) -> Completion<Message> {
        self.dispatcher.enqueue_receive(Some(len))
    }

    /// Send and wait for the result.
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        self.send_msg(message).wait()
    }

    /// Receive the next message, waiting for it.
    pub fn receive(&self) -> Result<Message> {
        self.receive_msg().wait()
    }

    /// Receive the next message as UTF-8 text.
    pub fn receive_text(&self) -> Result<String> {
        let message = self.receive()?;
        Ok(message.text()?.to_string())
    }

    /// The message that completed the readiness handshake, if one ran.
    pub fn ready_message(&self) -> Option<&Message> {
        self.ready.as_ref().map(|outcome| &outcome.ready_message)
    }

    pub fn handshake(&self) -> Option<&HandshakeOutcome> {
        self.ready.as_ref()
    }

    /// Finish queued requests, stop the dispatcher, and close the link.
    ///
    /// Repeated calls are no-ops.
    pub fn close(&self) -> Result<()> {
        self.dispatcher.shutdown()
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use bytes::BytesMut;
    use devlink_frame::{decode_frame, FrameError, FramingScheme, MAX_PAYLOAD};
    use devlink_transport::MemoryTransport;

    use super::*;
    use crate::error::CommError;
    use crate::i2c::tests::MockBus;

    fn quick_config() -> CommunicatorConfig {
        CommunicatorConfig {
            receive_timeout_seconds: 0.2,
            ..CommunicatorConfig::default()
        }
    }

    /// Flags any overlapping access and records each write.
    struct ExclusiveTransport {
        inner: MemoryTransport,
        busy: Arc<AtomicBool>,
        overlaps: Arc<AtomicUsize>,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl ExclusiveTransport {
        fn enter(&self) {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn leave(&self) {
            self.busy.store(false, Ordering::SeqCst);
        }
    }

    impl Transport for ExclusiveTransport {
        fn write_all(&mut self, bytes: &[u8]) -> devlink_transport::Result<()> {
            self.enter();
            self.writes.lock().unwrap().push(bytes.to_vec());
            let result = self.inner.write_all(bytes);
            self.leave();
            result
        }

        fn read_byte(&mut self, timeout: Duration) -> devlink_transport::Result<Option<u8>> {
            self.enter();
            let result = self.inner.read_byte(timeout);
            self.leave();
            result
        }

        fn close(&mut self) -> devlink_transport::Result<()> {
            self.inner.close()
        }

        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }
    }

    #[test]
    fn concurrent_callers_never_tear_frames() {
        const SENDERS: usize = 8;
        const RECEIVERS: usize = 6;

        let (host, device) = MemoryTransport::pair();
        let overlaps = Arc::new(AtomicUsize::new(0));
        let writes = Arc::new(Mutex::new(Vec::new()));
        let transport = ExclusiveTransport {
            inner: host,
            busy: Arc::new(AtomicBool::new(false)),
            overlaps: Arc::clone(&overlaps),
            writes: Arc::clone(&writes),
        };

        let mut device = FramedTransport::new(device);
        for i in 0..RECEIVERS {
            device.send(format!("reading {i}").as_bytes()).unwrap();
        }
        let device_thread = thread::spawn(move || {
            let mut seen = Vec::new();
            for _ in 0..SENDERS {
                seen.push(device.recv_timeout(Duration::from_secs(2)).unwrap());
            }
            seen
        });

        let comm = Communicator::with_transport(transport, &CommunicatorConfig::default()).unwrap();
        let comm = Arc::new(comm);
        let mut handles = Vec::new();
        for i in 0..SENDERS {
            let comm = Arc::clone(&comm);
            handles.push(thread::spawn(move || {
                comm.send(format!("command {i} {}", "x".repeat(i * 7))).map(|_| None::<String>)
            }));
        }
        for _ in 0..RECEIVERS {
            let comm = Arc::clone(&comm);
            handles.push(thread::spawn(move || comm.receive_text().map(Some)));
        }

        let mut received = HashSet::new();
        for handle in handles {
            if let Some(text) = handle.join().unwrap().unwrap() {
                received.insert(text);
            }
        }

        let expected: HashSet<String> = (0..RECEIVERS).map(|i| format!("reading {i}")).collect();
        assert_eq!(received, expected);

        let seen = device_thread.join().unwrap();
        let sent: HashSet<String> = seen.iter().map(|m| m.text().unwrap().to_string()).collect();
        assert_eq!(sent.len(), SENDERS);

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), SENDERS);
        for write in writes.iter() {
            let mut buf = BytesMut::from(write.as_slice());
            let msg = decode_frame(FramingScheme::LengthPrefixed, &mut buf, MAX_PAYLOAD)
                .unwrap()
                .unwrap();
            assert!(msg.text().unwrap().starts_with("command "));
            assert!(buf.is_empty());
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);

        comm.close().unwrap();
    }

    #[test]
    fn handshake_runs_before_requests() {
        let (host, device) = MemoryTransport::pair();
        let mut device = FramedTransport::new(device);
        device.send(b"booting").unwrap();
        device.send(b"Arduino is ready").unwrap();
        device.send(b"sensor=42").unwrap();

        let config = CommunicatorConfig {
            wait_for_connection: true,
            ready_verification_token: Some("ready".to_string()),
            handshake_timeout_seconds: Some(2.0),
            ..quick_config()
        };
        let comm = Communicator::with_transport(host, &config).unwrap();

        assert_eq!(comm.ready_message().unwrap().text().unwrap(), "Arduino is ready");
        assert_eq!(comm.handshake().unwrap().frames_seen, 2);
        assert_eq!(comm.receive_text().unwrap(), "sensor=42");
    }

    #[test]
    fn failed_handshake_closes_transport() {
        let (host, device) = MemoryTransport::pair();
        let config = CommunicatorConfig {
            wait_for_connection: true,
            ready_verification_token: Some("ready".to_string()),
            handshake_timeout_seconds: Some(0.1),
            ..quick_config()
        };

        let err = Communicator::with_transport(host, &config).unwrap_err();
        assert!(matches!(err, SetupError::HandshakeTimeout(_)));

        let mut device = device;
        let err = device.read_byte(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(
            err,
            devlink_transport::TransportError::Io(ref io)
                if io.kind() == std::io::ErrorKind::UnexpectedEof
        ));
    }

    #[test]
    fn invalid_config_rejected_before_spawn() {
        let (host, _device) = MemoryTransport::pair();
        let config = CommunicatorConfig {
            wait_for_connection: true,
            ..CommunicatorConfig::default()
        };
        assert!(matches!(
            Communicator::with_transport(host, &config),
            Err(SetupError::InvalidConfig(_))
        ));
    }

    #[test]
    fn receive_times_out_then_recovers() {
        let (host, device) = MemoryTransport::pair();
        let comm = Communicator::with_transport(host, &quick_config()).unwrap();

        let err = comm.receive().unwrap_err();
        assert!(matches!(err, CommError::Timeout(_)));
        assert!(err.is_recoverable());

        let mut device = FramedTransport::new(device);
        device.send(b"late").unwrap();
        assert_eq!(comm.receive().unwrap().as_bytes(), b"late");
    }

    #[test]
    fn invalid_utf8_surfaces_as_frame_error() {
        let (host, device) = MemoryTransport::pair();
        let comm = Communicator::with_transport(host, &quick_config()).unwrap();
        let mut device = FramedTransport::new(device);
        device.send(&[0xff, 0xfe]).unwrap();

        let err = comm.receive_text().unwrap_err();
        assert!(matches!(err, CommError::Frame(FrameError::InvalidUtf8(_))));
    }

    #[test]
    fn queued_receive_cancelled_behind_inflight_read() {
        let (host, _device) = MemoryTransport::pair();
        let comm = Communicator::with_transport(host, &quick_config()).unwrap();

        let inflight = comm.receive_msg();
        let queued = comm.receive_msg();
        assert!(queued.cancel());

        assert!(matches!(inflight.wait(), Err(CommError::Timeout(_))));
        assert!(matches!(queued.wait(), Err(CommError::Cancelled)));
    }

    #[test]
    fn close_twice_then_requests_fail() {
        let (host, device) = MemoryTransport::pair();
        let comm = Communicator::with_transport(host, &quick_config()).unwrap();

        comm.close().unwrap();
        comm.close().unwrap();
        assert!(comm.is_closed());
        assert!(matches!(comm.send("x"), Err(CommError::DispatcherStopped)));
        assert!(matches!(comm.receive(), Err(CommError::DispatcherStopped)));

        let mut device = device;
        assert!(device.read_byte(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn peer_disconnect_stops_dispatcher() {
        let (host, device) = MemoryTransport::pair();
        let comm = Communicator::with_transport(host, &quick_config()).unwrap();
        drop(device);

        let err = comm.receive().unwrap_err();
        assert!(matches!(err, CommError::Transport(_)));
        assert!(!err.is_recoverable());
        assert!(matches!(comm.send("x"), Err(CommError::DispatcherStopped)));
        comm.close().unwrap();
    }

    #[test]
    fn i2c_roundtrip_requires_length() {
        let comm = Communicator::i2c(MockBus::default(), 0x08).unwrap();
        comm.send(&b"ping"[..]).unwrap();

        assert_eq!(comm.receive_exact(4).wait().unwrap().as_bytes(), b"ping");
        assert!(matches!(comm.receive(), Err(CommError::ExpectedLengthRequired)));
    }

    #[tokio::test]
    async fn completions_can_be_awaited() {
        let (host, device) = MemoryTransport::pair();
        let comm = Communicator::with_transport(host, &quick_config()).unwrap();
        let mut device = FramedTransport::new(device);
        device.send(b"async hello").unwrap();

        comm.send_msg("from async").await.unwrap();
        let msg = comm.receive_msg().await.unwrap();
        assert_eq!(msg.as_bytes(), b"async hello");
        assert_eq!(device.recv().unwrap().as_bytes(), b"from async");
    }
}
