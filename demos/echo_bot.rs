//! Echo bot example
//!
//! Connects to a server, joins the channels given on the command line and
//! answers `!echo <text>` with `<text>`. `!quit` from any user shuts it down.
//!
//! ```text
//! RUST_LOG=ircbot_core=debug cargo run --example echo_bot -- \
//!     irc.libera.chat 6667 echobot '#mychannel'
//! ```

use anyhow::Context;
use ircbot_core::{Client, ClientConfig, Concurrency, MatchFlags, MembershipFilter, MessageFilter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = match args.next() {
        Some(port) => port.parse().context("port must be a number")?,
        None => 6667,
    };
    let nick = args.next().unwrap_or_else(|| "echobot".to_string());

    let mut config = ClientConfig::new(host, port, nick);
    config.channels = args.collect();
    config.password = std::env::var("ECHOBOT_PASSWORD").ok();

    let client = Client::new(config);

    let replies = client.clone();
    client.add_message_handler(
        MessageFilter::new().message_with(r"^!echo\s+(.+)$", MatchFlags::IGNORE_CASE)?,
        Concurrency::Spawned,
        move |ctx| {
            if let Some(text) = ctx.matched.get(1) {
                replies.send_message(&ctx.channel, text);
            }
        },
    );

    let greeter = client.clone();
    client.add_join_handler(MembershipFilter::new(), Concurrency::Spawned, move |ctx| {
        greeter.send_notice(&ctx.nick, &format!("welcome to {}", ctx.channel));
    });

    let (quit_tx, mut quit_rx) = tokio::sync::mpsc::unbounded_channel();
    client.add_message_handler(
        MessageFilter::new().message("^!quit$")?,
        Concurrency::Inline,
        move |ctx| {
            let _ = quit_tx.send(ctx.nick);
        },
    );

    client.connect().await?;

    let stopper = client.clone();
    tokio::spawn(async move {
        if let Some(nick) = quit_rx.recv().await {
            if let Err(e) = stopper.disconnect(&format!("asked to leave by {}", nick)).await {
                tracing::warn!(error = %e, "disconnect failed");
            }
        }
    });

    client.wait_for_disconnect().await;
    Ok(())
}
