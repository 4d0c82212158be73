//! Outbound queue and pacer.
//!
//! Commands are issued from arbitrary handler tasks through a cloneable
//! [`OutboundQueue`]. Enqueueing never blocks: when the queue is full the
//! new command is dropped with a diagnostic. A single sender worker
//! ([`run_pacer`]) drains the queue in FIFO order and sleeps for the pacing
//! interval after every write so the server never sees a flood.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc::{
    self,
    error::{SendError, TryRecvError, TrySendError},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::Command;
use crate::transport::{LineWriter, Liveness};

#[derive(Clone, Debug)]
enum Sender {
    Bounded(mpsc::Sender<String>),
    Unbounded(mpsc::UnboundedSender<String>),
}

#[derive(Debug)]
enum Receiver {
    Bounded(mpsc::Receiver<String>),
    Unbounded(mpsc::UnboundedReceiver<String>),
}

/// Drop-on-full queue of outbound command lines.
///
/// A capacity of 0 means unlimited.
#[derive(Clone, Debug)]
pub struct OutboundQueue {
    tx: Sender,
    depth: Arc<AtomicUsize>,
}

/// Receiving end of an [`OutboundQueue`], owned by the pacer.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: Receiver,
    depth: Arc<AtomicUsize>,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` lines, or any number when
    /// `capacity` is 0.
    pub fn new(capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = if capacity == 0 {
            let (tx, rx) = mpsc::unbounded_channel();
            (Sender::Unbounded(tx), Receiver::Unbounded(rx))
        } else {
            let (tx, rx) = mpsc::channel(capacity);
            (Sender::Bounded(tx), Receiver::Bounded(rx))
        };
        let depth = Arc::new(AtomicUsize::new(0));
        (
            Self {
                tx,
                depth: Arc::clone(&depth),
            },
            OutboundReceiver { rx, depth },
        )
    }

    /// Queue a line without blocking. Returns whether it was accepted.
    ///
    /// A full or closed queue drops the line; callers must not assume
    /// delivery.
    pub fn enqueue(&self, line: impl Into<String>) -> bool {
        let sent = match &self.tx {
            Sender::Bounded(tx) => tx.try_send(line.into()),
            Sender::Unbounded(tx) => tx
                .send(line.into())
                .map_err(|SendError(line)| TrySendError::Closed(line)),
        };
        match sent {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::AcqRel);
                true
            }
            Err(TrySendError::Full(line)) => {
                warn!(dropped = %line, "message queue full");
                false
            }
            Err(TrySendError::Closed(line)) => {
                warn!(dropped = %line, "message queue closed");
                false
            }
        }
    }

    /// Queue a formatted command.
    pub fn enqueue_command(&self, command: &Command) -> bool {
        self.enqueue(command.to_string())
    }

    /// Number of lines waiting to be sent.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Whether no lines are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity, `None` when unlimited.
    pub fn capacity(&self) -> Option<usize> {
        match &self.tx {
            Sender::Bounded(tx) => Some(tx.max_capacity()),
            Sender::Unbounded(_) => None,
        }
    }
}

impl OutboundReceiver {
    /// Wait for the next line. `None` once every queue handle is dropped.
    pub async fn recv(&mut self) -> Option<String> {
        let line = match &mut self.rx {
            Receiver::Bounded(rx) => rx.recv().await,
            Receiver::Unbounded(rx) => rx.recv().await,
        };
        self.taken(line)
    }

    /// Take the next line if one is waiting.
    pub fn try_recv(&mut self) -> Result<String, TryRecvError> {
        let line = match &mut self.rx {
            Receiver::Bounded(rx) => rx.try_recv(),
            Receiver::Unbounded(rx) => rx.try_recv(),
        }?;
        self.depth.fetch_sub(1, Ordering::AcqRel);
        Ok(line)
    }

    fn taken(&self, line: Option<String>) -> Option<String> {
        if line.is_some() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
        }
        line
    }
}

/// Sender worker: drain `rx` into `writer`, one line per pacing interval.
///
/// Exits when `shutdown` is cancelled, when every queue handle is dropped,
/// or after a failed write, which is reported through `liveness`.
pub async fn run_pacer<W>(
    mut rx: OutboundReceiver,
    mut writer: LineWriter<W>,
    interval: Duration,
    liveness: Liveness,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            item = rx.recv() => match item {
                Some(line) => line,
                None => break,
            },
        };

        if let Err(e) = writer.send(line).await {
            liveness.fail(&e);
            break;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("sender worker stopped");
}
