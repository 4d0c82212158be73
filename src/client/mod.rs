//! Client facade.
//!
//! [`Client`] is a cheap, cloneable handle. It owns the connection
//! lifecycle (connect, disconnect, reconnect on socket death), issues
//! protocol commands through the paced outbound queue, exposes read-only
//! channel state, and holds the handler registries.
//!
//! # Example
//!
//! ```no_run
//! use ircbot_core::{Client, ClientConfig, MessageFilter};
//!
//! # async fn run() -> ircbot_core::Result<()> {
//! let mut config = ClientConfig::new("irc.example.net", 6667, "snaibot");
//! config.channels = vec!["#rust".to_string()];
//! let client = Client::new(config);
//!
//! let replies = client.clone();
//! client.on_message(MessageFilter::new().message("^!ping")?, move |ctx| {
//!     replies.send_message(&ctx.channel, "pong");
//! });
//!
//! client.connect().await?;
//! client.wait_for_disconnect().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod inbound;
mod session;

pub use config::ClientConfig;

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::casemap::irc_eq;
use crate::command::{Command, ModeSign};
use crate::dispatch::{
    Concurrency, Dispatcher, HandlerId, MembershipContext, MembershipFilter, MessageContext,
    MessageFilter,
};
use crate::error::{ClientError, Result};
use crate::parser::LineParser;
use crate::state::{ChannelTracker, Tier};

use session::Session;

/// Lifecycle state of a [`Client`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Idle, or stopped by [`Client::disconnect`].
    #[default]
    Disconnected,
    /// First connect in progress, possibly still retrying.
    Connecting,
    /// Registered on a live socket.
    Connected,
    /// Tearing down and opening a fresh connection.
    Reconnecting,
}

/// State shared between the facade and the receiver worker.
pub(crate) struct Shared {
    pub(crate) parser: LineParser,
    pub(crate) tracker: RwLock<ChannelTracker>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) nick: RwLock<String>,
}

impl Shared {
    pub(crate) fn new(nick: &str) -> Self {
        Self {
            parser: LineParser::new(),
            tracker: RwLock::new(ChannelTracker::new()),
            dispatcher: Dispatcher::new(),
            nick: RwLock::new(nick.to_string()),
        }
    }
}

struct Inner {
    config: ClientConfig,
    password: Mutex<Option<String>>,
    shared: Arc<Shared>,
    state: Mutex<ConnectionState>,
    session: Mutex<Option<Session>>,
    // cancelled and replaced by every disconnect
    attempt: Mutex<CancellationToken>,
    // channels an establish will join once its settle delay ends
    pending: Mutex<Vec<String>>,
    disconnected: watch::Sender<bool>,
}

/// Handle to a single-server bot connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("nickname", &*self.inner.shared.nick.read())
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

impl Client {
    /// Create a disconnected client.
    pub fn new(config: ClientConfig) -> Self {
        let (disconnected, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                password: Mutex::new(config.password.clone()),
                shared: Arc::new(Shared::new(&config.nickname)),
                state: Mutex::new(ConnectionState::Disconnected),
                session: Mutex::new(None),
                attempt: Mutex::new(CancellationToken::new()),
                pending: Mutex::new(Vec::new()),
                disconnected,
                config,
            }),
        }
    }

    /// The configuration this client was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// The nickname the client currently uses.
    pub fn nickname(&self) -> String {
        self.inner.shared.nick.read().clone()
    }

    // ==================== lifecycle ====================

    /// Connect, register, identify and join the configured channels.
    ///
    /// Retries the TCP connection until it succeeds, then waits the settle
    /// delay before identifying and joining. A [`disconnect`](Self::disconnect)
    /// issued meanwhile ends the attempt with [`ClientError::Aborted`].
    pub async fn connect(&self) -> Result<()> {
        let abort = {
            let mut state = self.inner.state.lock();
            match *state {
                ConnectionState::Connected => return Err(ClientError::AlreadyConnected),
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    return Err(ClientError::AlreadyConnecting)
                }
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
            }
            self.inner.disconnected.send_replace(false);
            self.inner.attempt.lock().clone()
        };
        let channels = self.inner.config.channels.clone();
        self.establish(channels, abort).await
    }

    async fn establish(&self, channels: Vec<String>, abort: CancellationToken) -> Result<()> {
        let config = &self.inner.config;
        info!(host = %config.host, port = config.port, "connecting");

        let session = match Session::open(config, &self.inner.shared, &abort).await {
            Some(session) => session,
            None => {
                info!("connection attempt aborted");
                return Err(ClientError::Aborted);
            }
        };
        let id = session.id;
        let liveness = session.liveness.clone();
        let shutdown = session.shutdown.clone();
        {
            let mut slot = self.inner.session.lock();
            if abort.is_cancelled() {
                session.abandon();
                return Err(ClientError::Aborted);
            }
            *slot = Some(session);
            *self.inner.pending.lock() = channels;
            *self.inner.state.lock() = ConnectionState::Connected;
        }
        info!(host = %config.host, port = config.port, "connected");

        let recover = self.clone().recover(abort);
        tokio::spawn(async move {
            tokio::select! {
                _ = liveness.failed() => recover.await,
                _ = shutdown.cancelled() => {}
            }
        });

        tokio::time::sleep(config.settle_delay()).await;

        let password = self.inner.password.lock().clone();
        let slot = self.inner.session.lock();
        let session = match slot.as_ref() {
            Some(session) if session.id == id => session,
            _ => {
                debug!(session = id, "connection replaced during settle delay");
                return Ok(());
            }
        };
        if let Some(password) = password {
            session.queue.enqueue_command(&Command::identify(&password));
        }
        let channels = std::mem::take(&mut *self.inner.pending.lock());
        let mut tracker = self.inner.shared.tracker.write();
        for channel in channels {
            if session.queue.enqueue_command(&Command::JOIN(channel.clone())) {
                tracker.insert_joined(&channel);
            }
        }
        Ok(())
    }

    // Boxed: establish -> recover -> restart -> establish.
    fn recover(self, abort: CancellationToken) -> BoxFuture<'static, ()> {
        async move {
            if let Err(e) = self.restart("Reconnecting", true, abort).await {
                debug!(error = %e, "automatic reconnect skipped");
            }
        }
        .boxed()
    }

    async fn teardown(&self, message: &str) {
        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            session.close(message, self.inner.config.shutdown_wait()).await;
        }
    }

    /// Send `QUIT`, stop the workers and release anyone waiting in
    /// [`wait_for_disconnect`](Self::wait_for_disconnect).
    ///
    /// Also stops a connect or reconnect that is still retrying; the client
    /// stays disconnected until the next [`connect`](Self::connect).
    pub async fn disconnect(&self, message: &str) -> Result<()> {
        if self.state() == ConnectionState::Disconnected {
            return Err(ClientError::NotConnected);
        }
        let attempt = std::mem::replace(&mut *self.inner.attempt.lock(), CancellationToken::new());
        attempt.cancel();

        self.teardown(message).await;
        self.inner.pending.lock().clear();
        self.inner.shared.tracker.write().clear();
        {
            let mut state = self.inner.state.lock();
            *state = ConnectionState::Disconnected;
            self.inner.disconnected.send_replace(true);
        }
        info!("disconnected");
        Ok(())
    }

    /// Tear down the current connection and connect again.
    ///
    /// With `rejoin`, the channels joined before teardown are joined again
    /// instead of the configured ones. Privileges are not restored. A
    /// [`disconnect`](Self::disconnect) issued meanwhile wins and this returns
    /// [`ClientError::Aborted`].
    pub async fn reconnect(&self, message: &str, rejoin: bool) -> Result<()> {
        let abort = self.inner.attempt.lock().clone();
        self.restart(message, rejoin, abort).await
    }

    async fn restart(&self, message: &str, rejoin: bool, abort: CancellationToken) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if abort.is_cancelled() {
                return Err(ClientError::Aborted);
            }
            match *state {
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    return Err(ClientError::AlreadyConnecting)
                }
                _ => *state = ConnectionState::Reconnecting,
            }
            self.inner.disconnected.send_replace(false);
        }
        info!("reconnecting");

        let session = self.inner.session.lock().take();
        let pending = std::mem::take(&mut *self.inner.pending.lock());
        let channels = if rejoin {
            let mut channels = self.inner.shared.tracker.read().channels();
            for channel in pending {
                if !channels.iter().any(|known| irc_eq(known, &channel)) {
                    channels.push(channel);
                }
            }
            channels
        } else {
            self.inner.config.channels.clone()
        };

        if let Some(session) = session {
            session.close(message, self.inner.config.shutdown_wait()).await;
        }
        self.inner.shared.tracker.write().clear();
        self.establish(channels, abort).await
    }

    /// Wait until the client is deliberately disconnected.
    ///
    /// Returns immediately if it never connected.
    pub async fn wait_for_disconnect(&self) {
        let mut rx = self.inner.disconnected.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|done| *done).await;
    }

    // ==================== commands ====================

    fn send(&self, command: &Command) -> bool {
        match self.inner.session.lock().as_ref() {
            Some(session) => session.queue.enqueue_command(command),
            None => {
                warn!(%command, "not connected, dropping command");
                false
            }
        }
    }

    /// Join a channel. It is tracked immediately, before the server echo.
    pub fn join(&self, channel: &str) {
        if self.send(&Command::JOIN(channel.to_string())) {
            self.inner.shared.tracker.write().insert_joined(channel);
        }
    }

    /// Leave a channel and forget its state.
    pub fn part(&self, channel: &str) {
        self.send(&Command::PART(channel.to_string()));
        self.inner.shared.tracker.write().remove_channel(channel);
    }

    /// Kick `client` from `channel` with a reason.
    pub fn kick(&self, channel: &str, client: &str, message: &str) {
        self.send(&Command::KICK(
            channel.to_string(),
            client.to_string(),
            message.to_string(),
        ));
    }

    /// Ban the host part of `client` (`*!*@host`).
    pub fn ban(&self, channel: &str, client: &str) {
        match Command::ban(channel, client) {
            Some(command) => {
                self.send(&command);
            }
            None => warn!(channel, client, "client-id has no host part, not banning"),
        }
    }

    /// `MODE <channel> +<flag> <target>`
    pub fn set_mode(&self, channel: &str, flag: char, target: &str) {
        self.send(&Command::MODE(
            channel.to_string(),
            ModeSign::Plus,
            flag.to_string(),
            target.to_string(),
        ));
    }

    /// `MODE <channel> -<flag> <target>`
    pub fn unset_mode(&self, channel: &str, flag: char, target: &str) {
        self.send(&Command::MODE(
            channel.to_string(),
            ModeSign::Minus,
            flag.to_string(),
            target.to_string(),
        ));
    }

    /// Send a `PRIVMSG` to a channel or nick.
    pub fn send_message(&self, target: &str, text: &str) {
        self.send(&Command::PRIVMSG(target.to_string(), text.to_string()));
    }

    /// Send a `NOTICE` to a channel or nick.
    pub fn send_notice(&self, target: &str, text: &str) {
        self.send(&Command::NOTICE(target.to_string(), text.to_string()));
    }

    /// Replace the topic of `channel`.
    pub fn set_topic(&self, channel: &str, topic: &str) {
        self.send(&Command::TOPIC(channel.to_string(), topic.to_string()));
    }

    /// Invite `nick` to `channel`.
    pub fn invite(&self, nick: &str, channel: &str) {
        self.send(&Command::INVITE(nick.to_string(), channel.to_string()));
    }

    /// Change nickname. The new nick is used for matching right away.
    pub fn rename(&self, nick: &str) {
        self.send(&Command::NICK(nick.to_string()));
        *self.inner.shared.nick.write() = nick.to_string();
    }

    /// Mark the bot away with `message`.
    pub fn set_away(&self, message: &str) {
        self.send(&Command::AWAY(Some(message.to_string())));
    }

    /// Clear the away status.
    pub fn set_back(&self) {
        self.send(&Command::AWAY(None));
    }

    /// Identify to NickServ and keep the password for later reconnects.
    pub fn identify(&self, password: &str) {
        *self.inner.password.lock() = Some(password.to_string());
        self.send(&Command::identify(password));
    }

    // ==================== channel state ====================

    /// Every known member of `channel`. Empty if not joined.
    pub fn members(&self, channel: &str) -> HashSet<String> {
        self.inner.shared.tracker.read().members(channel)
    }

    /// Voiced members (`+`).
    pub fn voices(&self, channel: &str) -> HashSet<String> {
        self.tier(channel, Tier::Voice)
    }

    /// Half-operators (`%`).
    pub fn half_ops(&self, channel: &str) -> HashSet<String> {
        self.tier(channel, Tier::HalfOp)
    }

    /// Operators (`@`).
    pub fn ops(&self, channel: &str) -> HashSet<String> {
        self.tier(channel, Tier::Op)
    }

    /// Admin operators (`&`).
    pub fn admin_ops(&self, channel: &str) -> HashSet<String> {
        self.tier(channel, Tier::AdminOp)
    }

    /// Channel owners (`~`).
    pub fn owners(&self, channel: &str) -> HashSet<String> {
        self.tier(channel, Tier::Owner)
    }

    /// Members holding `tier` in `channel`.
    pub fn tier(&self, channel: &str, tier: Tier) -> HashSet<String> {
        self.inner.shared.tracker.read().tier(channel, tier)
    }

    /// Members holding any tier.
    pub fn privileged(&self, channel: &str) -> HashSet<String> {
        self.inner.shared.tracker.read().privileged(channel)
    }

    /// Last topic seen for `channel`.
    pub fn topic(&self, channel: &str) -> Option<String> {
        self.inner.shared.tracker.read().topic(channel)
    }

    /// Mode flags set on the bot itself in `channel`.
    pub fn modes(&self, channel: &str) -> HashSet<char> {
        self.inner.shared.tracker.read().bot_modes(channel)
    }

    /// Whether `channel` is tracked as joined.
    pub fn is_joined(&self, channel: &str) -> bool {
        self.inner.shared.tracker.read().is_joined(channel)
    }

    /// Names of every joined channel.
    pub fn joined_channels(&self) -> Vec<String> {
        self.inner.shared.tracker.read().channels()
    }

    // ==================== handlers ====================

    /// Register a message handler.
    ///
    /// `callback` receives the text, the channel (or the sender's nick for a
    /// private message), the sender's nick and client-id, and the
    /// message-filter match.
    pub fn add_message_handler<F>(
        &self,
        filter: MessageFilter,
        concurrency: Concurrency,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(MessageContext) + Send + Sync + 'static,
    {
        self.inner
            .shared
            .dispatcher
            .add_message_handler(filter, concurrency, callback)
    }

    /// Register a spawned message handler.
    pub fn on_message<F>(&self, filter: MessageFilter, callback: F) -> HandlerId
    where
        F: Fn(MessageContext) + Send + Sync + 'static,
    {
        self.add_message_handler(filter, Concurrency::Spawned, callback)
    }

    /// Unregister a message handler. Returns whether it was registered.
    pub fn remove_message_handler(&self, id: HandlerId) -> bool {
        self.inner.shared.dispatcher.remove_message_handler(id)
    }

    /// Register a handler for other users joining.
    pub fn add_join_handler<F>(
        &self,
        filter: MembershipFilter,
        concurrency: Concurrency,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(MembershipContext) + Send + Sync + 'static,
    {
        self.inner
            .shared
            .dispatcher
            .add_join_handler(filter, concurrency, callback)
    }

    /// Unregister a join handler.
    pub fn remove_join_handler(&self, id: HandlerId) -> bool {
        self.inner.shared.dispatcher.remove_join_handler(id)
    }

    /// Register a handler for other users parting.
    pub fn add_part_handler<F>(
        &self,
        filter: MembershipFilter,
        concurrency: Concurrency,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(MembershipContext) + Send + Sync + 'static,
    {
        self.inner
            .shared
            .dispatcher
            .add_part_handler(filter, concurrency, callback)
    }

    /// Unregister a part handler.
    pub fn remove_part_handler(&self, id: HandlerId) -> bool {
        self.inner.shared.dispatcher.remove_part_handler(id)
    }
}
