//! Receiver worker: framed lines in, state updates and handler calls out.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::casemap::irc_eq;
use crate::command::Command;
use crate::error::TransportError;
use crate::event::ParsedEvent;
use crate::queue::OutboundQueue;
use crate::transport::{LineReader, Liveness};

use super::Shared;

/// Whether the receiver keeps reading after a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Per-connection line handler.
///
/// Runs parse, state update and dispatch for one line at a time, in
/// arrival order. It is the only writer of the channel tracker.
pub(crate) struct LineEngine {
    shared: Arc<Shared>,
    queue: OutboundQueue,
}

impl LineEngine {
    pub(crate) fn new(shared: Arc<Shared>, queue: OutboundQueue) -> Self {
        Self { shared, queue }
    }

    pub(crate) fn handle_line(&self, line: &str) -> Flow {
        let own_nick = self.shared.nick.read().clone();
        let Some(event) = self.shared.parser.parse(line, &own_nick) else {
            trace!("ignoring unrecognised line");
            return Flow::Continue;
        };
        debug!(kind = event.kind(), "parsed event");

        if let ParsedEvent::Ping(token) = &event {
            self.queue.enqueue_command(&Command::PONG(token.clone()));
            return Flow::Continue;
        }

        self.shared.tracker.write().apply(&event, &own_nick);

        let dispatcher = &self.shared.dispatcher;
        match &event {
            ParsedEvent::PrivateMessage {
                nick,
                client,
                target,
                text,
            } => dispatcher.dispatch_message(nick, client, target, text, &own_nick),
            ParsedEvent::Join {
                nick,
                client,
                channel,
            } if !irc_eq(nick, &own_nick) => dispatcher.dispatch_join(nick, client, channel),
            ParsedEvent::Part {
                nick,
                client,
                channel,
            } if !irc_eq(nick, &own_nick) => dispatcher.dispatch_part(nick, client, channel),
            ParsedEvent::Quit(nick) if irc_eq(nick, &own_nick) => {
                info!("own QUIT seen, stopping receiver");
                return Flow::Stop;
            }
            _ => {}
        }
        Flow::Continue
    }
}

/// Receiver worker loop.
///
/// Stops on shutdown, on a transport failure (reported through
/// `liveness`), or after the bot's own `QUIT` comes back. An own `QUIT`
/// outside a deliberate teardown is treated like a closed socket.
pub(crate) async fn run_receiver<R>(
    mut reader: LineReader<R>,
    engine: LineEngine,
    liveness: Liveness,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = reader.receive() => received,
        };

        match received {
            Ok(line) => {
                if engine.handle_line(&line) == Flow::Stop {
                    liveness.fail(&TransportError::Closed);
                    break;
                }
            }
            Err(e) => {
                liveness.fail(&e);
                break;
            }
        }
    }
    debug!("receiver worker stopped");
}
