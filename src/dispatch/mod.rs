//! Event dispatch to registered handlers.
//!
//! The dispatcher keeps three ordered registries (message, join, part).
//! Registration and removal lock a registry; dispatch copies the registry
//! under the same lock and walks the copy unlocked. A handler may therefore
//! register or remove handlers from inside its own invocation. A removal
//! made while a dispatch is in flight does not cancel that dispatch's
//! invocation of the removed handler.
//!
//! Each registration carries a [`Concurrency`] mode. `Inline` handlers run
//! on the receiver task and block it until they return; `Spawned` handlers
//! run on the blocking pool and never hold up dispatch. A panic in either
//! kind is caught and logged; it never reaches the receiver loop.

mod filter;

pub use filter::{MatchFlags, MembershipFilter, MessageFilter, MessageMatch, Pattern};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::casemap::irc_eq;

/// How a handler is invoked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Concurrency {
    /// Run synchronously on the dispatch path.
    Inline,
    /// Run as an independent task.
    #[default]
    Spawned,
}

/// Opaque registration handle used for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Arguments handed to a message handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageContext {
    /// Message text.
    pub text: String,
    /// Channel the message was sent to, or the sender's nick for a
    /// private message.
    pub channel: String,
    /// Sender nick.
    pub nick: String,
    /// Sender client-id (`user@host`).
    pub client: String,
    /// Result of the message-text filter.
    pub matched: MessageMatch,
}

/// Arguments handed to a join or part handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipContext {
    /// Channel joined or left.
    pub channel: String,
    /// Nick of the member.
    pub nick: String,
    /// Their client-id (`user@host`).
    pub client: String,
}

struct Entry<F, C> {
    id: HandlerId,
    filter: F,
    concurrency: Concurrency,
    callback: Arc<dyn Fn(C) + Send + Sync>,
}

type Registry<F, C> = Mutex<Vec<Arc<Entry<F, C>>>>;

/// Ordered handler registries.
#[derive(Default)]
pub struct Dispatcher {
    next_id: AtomicU64,
    messages: Registry<MessageFilter, MessageContext>,
    joins: Registry<MembershipFilter, MembershipContext>,
    parts: Registry<MembershipFilter, MembershipContext>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("messages", &self.messages.lock().len())
            .field("joins", &self.joins.lock().len())
            .field("parts", &self.parts.lock().len())
            .finish()
    }
}

fn register<F, C>(
    registry: &Registry<F, C>,
    id: HandlerId,
    filter: F,
    concurrency: Concurrency,
    callback: Arc<dyn Fn(C) + Send + Sync>,
) -> HandlerId {
    registry.lock().push(Arc::new(Entry {
        id,
        filter,
        concurrency,
        callback,
    }));
    id
}

fn remove<F, C>(registry: &Registry<F, C>, id: HandlerId) -> bool {
    let mut entries = registry.lock();
    let before = entries.len();
    entries.retain(|e| e.id != id);
    entries.len() != before
}

fn snapshot<F, C>(registry: &Registry<F, C>) -> Vec<Arc<Entry<F, C>>> {
    registry.lock().clone()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

fn run_guarded<C>(
    kind: &'static str,
    id: HandlerId,
    callback: &(dyn Fn(C) + Send + Sync),
    ctx: C,
) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(ctx))) {
        error!(
            kind,
            handler = id.0,
            "handler panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

fn invoke<C: Send + 'static>(
    kind: &'static str,
    id: HandlerId,
    concurrency: Concurrency,
    callback: &Arc<dyn Fn(C) + Send + Sync>,
    ctx: C,
) {
    match concurrency {
        Concurrency::Inline => run_guarded(kind, id, callback.as_ref(), ctx),
        Concurrency::Spawned => {
            let callback = Arc::clone(callback);
            let job = move || run_guarded(kind, id, callback.as_ref(), ctx);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(job);
                }
                Err(_) => {
                    std::thread::spawn(job);
                }
            }
        }
    }
}

impl Dispatcher {
    /// Create a dispatcher with empty registries.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a message handler. Handlers run in registration order.
    pub fn add_message_handler<F>(
        &self,
        filter: MessageFilter,
        concurrency: Concurrency,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(MessageContext) + Send + Sync + 'static,
    {
        register(&self.messages, self.next_id(), filter, concurrency, Arc::new(callback))
    }

    /// Remove a message handler. Returns whether it was registered.
    pub fn remove_message_handler(&self, id: HandlerId) -> bool {
        remove(&self.messages, id)
    }

    /// Register a join handler.
    pub fn add_join_handler<F>(
        &self,
        filter: MembershipFilter,
        concurrency: Concurrency,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(MembershipContext) + Send + Sync + 'static,
    {
        register(&self.joins, self.next_id(), filter, concurrency, Arc::new(callback))
    }

    /// Remove a join handler. Returns whether it was registered.
    pub fn remove_join_handler(&self, id: HandlerId) -> bool {
        remove(&self.joins, id)
    }

    /// Register a part handler.
    pub fn add_part_handler<F>(
        &self,
        filter: MembershipFilter,
        concurrency: Concurrency,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(MembershipContext) + Send + Sync + 'static,
    {
        register(&self.parts, self.next_id(), filter, concurrency, Arc::new(callback))
    }

    /// Remove a part handler. Returns whether it was registered.
    pub fn remove_part_handler(&self, id: HandlerId) -> bool {
        remove(&self.parts, id)
    }

    /// Dispatch a `PRIVMSG`.
    ///
    /// Filters see the raw target. When the target is `own_nick` the
    /// handler's `channel` argument is replaced by the sender's nick, so
    /// replies to `channel` reach the right place either way.
    pub fn dispatch_message(
        &self,
        nick: &str,
        client: &str,
        target: &str,
        text: &str,
        own_nick: &str,
    ) {
        let reply_to = if irc_eq(target, own_nick) { nick } else { target };

        for entry in snapshot(&self.messages) {
            let Some(matched) = entry.filter.check(target, nick, client, text) else {
                continue;
            };
            debug!(handler = entry.id.0, "message handler matched");
            let ctx = MessageContext {
                text: text.to_string(),
                channel: reply_to.to_string(),
                nick: nick.to_string(),
                client: client.to_string(),
                matched,
            };
            invoke("message", entry.id, entry.concurrency, &entry.callback, ctx);
        }
    }

    /// Dispatch a `JOIN` by another user.
    pub fn dispatch_join(&self, nick: &str, client: &str, channel: &str) {
        Self::dispatch_membership("join", &self.joins, nick, client, channel);
    }

    /// Dispatch a `PART` by another user.
    pub fn dispatch_part(&self, nick: &str, client: &str, channel: &str) {
        Self::dispatch_membership("part", &self.parts, nick, client, channel);
    }

    fn dispatch_membership(
        kind: &'static str,
        registry: &Registry<MembershipFilter, MembershipContext>,
        nick: &str,
        client: &str,
        channel: &str,
    ) {
        for entry in snapshot(registry) {
            if !entry.filter.check(channel, nick, client) {
                continue;
            }
            let ctx = MembershipContext {
                channel: channel.to_string(),
                nick: nick.to_string(),
                client: client.to_string(),
            };
            invoke(kind, entry.id, entry.concurrency, &entry.callback, ctx);
        }
    }
}
