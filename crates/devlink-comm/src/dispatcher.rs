use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use devlink_frame::Message;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{CommError, Result, SetupError};
use crate::link::Link;

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

const WORKER_NAME: &str = "devlink-dispatcher";

/// A queued request, paired with the slot its result goes to.
pub(crate) enum Intent {
    Send {
        message: Message,
        reply: oneshot::Sender<Result<()>>,
        status: Arc<AtomicU8>,
    },
    Receive {
        expected_len: Option<usize>,
        reply: oneshot::Sender<Result<Message>>,
        status: Arc<AtomicU8>,
    },
    Shutdown,
}

/// Handle to the outcome of one enqueued request.
///
/// Resolve it with [`Completion::wait`] from synchronous code or `.await` it
/// from async code. Dropping it discards the result; the request still runs.
#[derive(Debug)]
#[must_use = "a completion does nothing unless waited on or awaited"]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T>>,
    status: Arc<AtomicU8>,
}

impl<T> Completion<T> {
    /// Block the current thread until the request has been serviced.
    ///
    /// Must not be called from within an async runtime; `.await` instead.
    pub fn wait(self) -> Result<T> {
        let status = self.status;
        match self.rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(stopped_or_cancelled(&status)),
        }
    }

    /// Withdraw the request if the dispatcher has not started it yet.
    ///
    /// Returns `false` once the request is in flight or finished; an
    /// in-flight transfer always runs to completion or timeout.
    pub fn cancel(&self) -> bool {
        self.status
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// True if [`cancel`](Self::cancel) succeeded.
    pub fn is_cancelled(&self) -> bool {
        self.status.load(Ordering::Acquire) == CANCELLED
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(stopped_or_cancelled(&this.status))),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn stopped_or_cancelled(status: &AtomicU8) -> CommError {
    if status.load(Ordering::Acquire) == CANCELLED {
        CommError::Cancelled
    } else {
        CommError::DispatcherStopped
    }
}

/// Single worker that owns a [`Link`] and services requests in order.
///
/// Requests go through an unbounded FIFO queue, so enqueueing never blocks.
/// The worker stops on shutdown or on the first fatal transport error, and
/// closes the link exactly once on its way out. Requests still queued at that
/// point resolve to [`CommError::DispatcherStopped`].
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Intent>,
    worker: Mutex<Option<JoinHandle<Result<()>>>>,
    link_name: String,
}

impl Dispatcher {
    /// Move `link` onto a new worker thread.
    pub fn spawn<L: Link>(link: L) -> std::result::Result<Self, SetupError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let link_name = link.name().to_string();
        let worker = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run(link, rx))
            .map_err(SetupError::Spawn)?;

        info!(link = %link_name, "dispatcher started");
        Ok(Self {
            tx,
            worker: Mutex::new(Some(worker)),
            link_name,
        })
    }

    /// Queue a send. Never blocks.
    pub fn enqueue_send(&self, message: Message) -> Completion<()> {
        let (reply, rx) = oneshot::channel();
        let status = Arc::new(AtomicU8::new(QUEUED));
        self.push(Intent::Send {
            message,
            reply,
            status: Arc::clone(&status),
        });
        Completion { rx, status }
    }

    /// Queue a receive. Never blocks.
    pub fn enqueue_receive(&self, expected_len: Option<usize>) -> Completion<Message> {
        let (reply, rx) = oneshot::channel();
        let status = Arc::new(AtomicU8::new(QUEUED));
        self.push(Intent::Receive {
            expected_len,
            reply,
            status: Arc::clone(&status),
        });
        Completion { rx, status }
    }

    fn push(&self, intent: Intent) {
        // A stopped worker drops the returned intent, and with it the reply
        // slot, so the completion resolves to `DispatcherStopped`.
        if self.tx.send(intent).is_err() {
            debug!(link = %self.link_name, "request after dispatcher stopped");
        }
    }

    /// Stop the worker after everything already queued, then wait for it to
    /// close the link. Later calls are no-ops.
    pub fn shutdown(&self) -> Result<()> {
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return Ok(());
        };

        let _ = self.tx.send(Intent::Shutdown);
        match handle.join() {
            Ok(result) => result,
            Err(_) => {
                warn!(link = %self.link_name, "dispatcher thread panicked");
                Err(CommError::DispatcherStopped)
            }
        }
    }

    /// True once the worker has exited or been shut down.
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
            || match self.worker.lock() {
                Ok(guard) => guard.is_none(),
                Err(_) => true,
            }
    }

    pub fn link_name(&self) -> &str {
        &self.link_name
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            debug!(error = %err, "dispatcher shutdown on drop failed");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("link", &self.link_name)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Claim a queued request for servicing. Fails if the caller cancelled it.
fn claim(status: &AtomicU8) -> bool {
    status
        .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Description of a result's error if it should stop the dispatcher.
fn fatal_reason<T>(result: &Result<T>) -> Option<String> {
    match result {
        Err(err) if err.is_fatal() => Some(err.to_string()),
        _ => None,
    }
}

fn run<L: Link>(mut link: L, mut rx: mpsc::UnboundedReceiver<Intent>) -> Result<()> {
    let mut serviced = 0u64;

    while let Some(intent) = rx.blocking_recv() {
        let fatal = match intent {
            Intent::Send {
                message,
                reply,
                status,
            } => {
                if !claim(&status) {
                    debug!("skipping cancelled send");
                    continue;
                }
                let result = link.send(message.as_bytes());
                let fatal = fatal_reason(&result);
                let _ = reply.send(result);
                fatal
            }
            Intent::Receive {
                expected_len,
                reply,
                status,
            } => {
                if !claim(&status) {
                    debug!("skipping cancelled receive");
                    continue;
                }
                let result = link.receive(expected_len);
                let fatal = fatal_reason(&result);
                let _ = reply.send(result);
                fatal
            }
            Intent::Shutdown => {
                debug!(serviced, "dispatcher shutdown requested");
                break;
            }
        };

        serviced += 1;
        if let Some(reason) = fatal {
            warn!(error = %reason, "fatal transport error, stopping dispatcher");
            break;
        }
    }

    // Pending reply slots are dropped here, before the link goes away.
    drop(rx);
    let closed = link.close();
    info!(link = %link.name(), serviced, "dispatcher stopped");
    closed
}
