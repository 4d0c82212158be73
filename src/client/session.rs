//! One live connection: socket, pacer and receiver workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::Command;
use crate::queue::{run_pacer, OutboundQueue};
use crate::transport::{connect_with_retry, split_tcp, Liveness};

use super::inbound::{run_receiver, LineEngine};
use super::{ClientConfig, Shared};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Handles to the workers of one connection.
///
/// Recreated, never reused, on reconnect.
pub(crate) struct Session {
    pub(crate) id: u64,
    pub(crate) queue: OutboundQueue,
    pub(crate) liveness: Liveness,
    pub(crate) shutdown: CancellationToken,
    receiver: JoinHandle<()>,
}

impl Session {
    /// Open the socket (retrying until it succeeds) and start both workers.
    ///
    /// Returns `None` if `abort` is cancelled before the socket opens.
    pub(crate) async fn open(
        config: &ClientConfig,
        shared: &Arc<Shared>,
        abort: &CancellationToken,
    ) -> Option<Self> {
        let stream =
            connect_with_retry(&config.host, config.port, config.connect_retry(), abort).await?;
        let (reader, writer) = split_tcp(stream);

        let (queue, rx) = OutboundQueue::new(config.queue_capacity);
        let liveness = Liveness::new();
        let shutdown = CancellationToken::new();

        tokio::spawn(run_pacer(
            rx,
            writer,
            config.pacing_interval(),
            liveness.clone(),
            shutdown.clone(),
        ));

        let nick = shared.nick.read().clone();
        queue.enqueue_command(&Command::NICK(nick.clone()));
        queue.enqueue_command(&Command::USER(nick));

        let engine = LineEngine::new(Arc::clone(shared), queue.clone());
        let receiver = tokio::spawn(run_receiver(
            reader,
            engine,
            liveness.clone(),
            shutdown.clone(),
        ));

        Some(Self {
            id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            queue,
            liveness,
            shutdown,
            receiver,
        })
    }

    /// Stop both workers at once, without `QUIT`.
    pub(crate) fn abandon(self) {
        self.liveness.disarm();
        self.shutdown.cancel();
        debug!(session = self.id, "abandoned connection opened after disconnect");
    }

    /// Deliberate teardown.
    ///
    /// Disarms the liveness signal, queues `QUIT`, waits up to `wait` for
    /// the receiver to stop, then stops both workers.
    pub(crate) async fn close(self, message: &str, wait: Duration) {
        self.liveness.disarm();
        self.queue.enqueue_command(&Command::QUIT(message.to_string()));

        match tokio::time::timeout(wait, self.receiver).await {
            Ok(Ok(())) => debug!("receiver acknowledged shutdown"),
            Ok(Err(e)) => warn!(error = %e, "receiver worker failed"),
            Err(_) => warn!(?wait, "receiver did not stop in time"),
        }
        self.shutdown.cancel();
    }
}
