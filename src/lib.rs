//! # ircbot-core
//!
//! A long-lived IRC bot client engine for a single server connection.
//!
//! ## Features
//!
//! - Connection lifecycle with unbounded fixed-delay connect retry and
//!   automatic reconnect on socket death
//! - Drop-on-full outbound queue (unlimited at capacity 0) drained at a
//!   fixed pacing interval
//! - CRLF line framing tolerant of partial and garbled input
//! - Regex line grammar producing structured [`ParsedEvent`]s
//! - Per-channel membership, privilege tier and topic tracking
//! - Message, join and part handlers with regex filters, run inline or on
//!   the blocking pool
//!
//! ## Quick Start
//!
//! ```no_run
//! use ircbot_core::{Client, ClientConfig, MessageFilter};
//!
//! #[tokio::main]
//! async fn main() -> ircbot_core::Result<()> {
//!     let mut config = ClientConfig::new("irc.example.net", 6667, "snaibot");
//!     config.channels = vec!["#rust".to_string()];
//!
//!     let client = Client::new(config);
//!     let replies = client.clone();
//!     client.on_message(MessageFilter::new().message(r"^!hello\b")?, move |ctx| {
//!         replies.send_message(&ctx.channel, &format!("hello, {}", ctx.nick));
//!     });
//!
//!     client.connect().await?;
//!     client.wait_for_disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Parsing Lines
//!
//! ```rust
//! use ircbot_core::{LineParser, ParsedEvent};
//!
//! let parser = LineParser::new();
//! let event = parser.parse(":alice!a@host PRIVMSG #chan :hello", "snaibot");
//! assert!(matches!(event, Some(ParsedEvent::PrivateMessage { .. })));
//! ```
//!
//! The library logs through `tracing` and never installs a subscriber.

#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod casemap;
pub mod client;
pub mod codec;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod parser;
pub mod queue;
pub mod state;
pub mod transport;

pub use self::client::{Client, ClientConfig, ConnectionState};
pub use self::codec::LineCodec;
pub use self::command::{ban_mask, Command, ModeSign};
pub use self::dispatch::{
    Concurrency, Dispatcher, HandlerId, MatchFlags, MembershipContext, MembershipFilter,
    MessageContext, MessageFilter, MessageMatch, Pattern,
};
pub use self::error::{ClientError, Result, TransportError};
pub use self::event::ParsedEvent;
pub use self::parser::LineParser;
pub use self::queue::OutboundQueue;
pub use self::state::{ChannelState, ChannelTracker, Tier};
