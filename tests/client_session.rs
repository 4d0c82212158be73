//! End-to-end tests for the client facade against a scripted server.
//!
//! Each test binds a `TcpListener` on `127.0.0.1:0`, lets the client
//! connect, and asserts on the exact lines the server receives.

use std::sync::Arc;
use std::time::Duration;

use ircbot_core::{Client, ClientConfig, ClientError, Concurrency, ConnectionState, MessageFilter};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

const STEP: Duration = Duration::from_secs(5);

// =============================================================================
// SCRIPTED SERVER
// =============================================================================

struct Peer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl Peer {
    async fn accept(listener: &TcpListener) -> Peer {
        let (stream, _) = tokio::time::timeout(STEP, listener.accept())
            .await
            .expect("client did not connect")
            .expect("accept failed");
        let (read, write) = stream.into_split();
        Peer {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    async fn expect_line(&mut self) -> String {
        tokio::time::timeout(STEP, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .expect("read failed")
            .expect("client closed the connection")
    }

    async fn expect_registration(&mut self, nick: &str) {
        assert_eq!(self.expect_line().await, format!("NICK {}", nick));
        assert_eq!(
            self.expect_line().await,
            format!("USER {0} {0} {0} :{0}", nick)
        );
    }

    async fn send(&mut self, line: &str) {
        self.write
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .expect("write failed");
    }
}

async fn listen() -> (TcpListener, ClientConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = ClientConfig::new("127.0.0.1", port, "snaibot");
    config.pacing_interval_ms = 10;
    config.settle_delay_ms = 50;
    config.connect_retry_ms = 50;
    config.shutdown_wait_ms = 1000;
    (listener, config)
}

async fn wait_for_state(client: &Client, want: ConnectionState) {
    tokio::time::timeout(STEP, async {
        while client.state() != want {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("state not reached");
}

/// Assert that nothing connects to `listener` for a while.
async fn assert_no_connection(listener: &TcpListener) {
    let accepted = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(accepted.is_err(), "client connected after disconnect");
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_registers_identifies_and_joins() {
    let (listener, mut config) = listen().await;
    config.password = Some("hunter2".to_string());
    config.channels = vec!["#chan".to_string(), "#other".to_string()];
    let client = Client::new(config);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut peer = Peer::accept(&listener).await;
    peer.expect_registration("snaibot").await;
    assert_eq!(peer.expect_line().await, "PRIVMSG NickServ :IDENTIFY hunter2");
    assert_eq!(peer.expect_line().await, "JOIN #chan");
    assert_eq!(peer.expect_line().await, "JOIN #other");

    connecting.await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.is_joined("#CHAN"));
    assert!(matches!(
        client.connect().await,
        Err(ClientError::AlreadyConnected)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_retries_until_server_appears() {
    // reserve a port, then free it so the first attempts are refused
    let (listener, config) = listen().await;
    let port = config.port;
    drop(listener);

    let client = Client::new(config);
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(client.state(), ConnectionState::Connecting);

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let mut peer = Peer::accept(&listener).await;
    peer.expect_registration("snaibot").await;
    connecting.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_sends_quit_and_releases_waiters() {
    let (listener, config) = listen().await;
    let client = Client::new(config);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut peer = Peer::accept(&listener).await;
    peer.expect_registration("snaibot").await;
    connecting.await.unwrap().unwrap();

    let waiter = tokio::spawn({
        let client = client.clone();
        async move { client.wait_for_disconnect().await }
    });

    let disconnecting = tokio::spawn({
        let client = client.clone();
        async move { client.disconnect("goodbye").await }
    });
    assert_eq!(peer.expect_line().await, "QUIT :goodbye");
    drop(peer);

    disconnecting.await.unwrap().unwrap();
    tokio::time::timeout(STEP, waiter).await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.joined_channels().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_socket_death_reconnects_and_rejoins() {
    let (listener, mut config) = listen().await;
    config.channels = vec!["#chan".to_string()];
    let client = Client::new(config);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut first = Peer::accept(&listener).await;
    first.expect_registration("snaibot").await;
    assert_eq!(first.expect_line().await, "JOIN #chan");
    connecting.await.unwrap().unwrap();

    // membership learned on the dying connection, rejoined on the new one
    client.join("#late");
    assert_eq!(first.expect_line().await, "JOIN #late");
    drop(first);

    let mut second = Peer::accept(&listener).await;
    second.expect_registration("snaibot").await;
    let mut rejoined = vec![second.expect_line().await, second.expect_line().await];
    rejoined.sort();
    assert_eq!(rejoined, vec!["JOIN #chan", "JOIN #late"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_without_rejoin_uses_configured_channels() {
    let (listener, mut config) = listen().await;
    config.channels = vec!["#chan".to_string()];
    let client = Client::new(config);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut first = Peer::accept(&listener).await;
    first.expect_registration("snaibot").await;
    assert_eq!(first.expect_line().await, "JOIN #chan");
    connecting.await.unwrap().unwrap();

    client.join("#extra");
    assert_eq!(first.expect_line().await, "JOIN #extra");

    let reconnecting = tokio::spawn({
        let client = client.clone();
        async move { client.reconnect("brb", false).await }
    });
    assert_eq!(first.expect_line().await, "QUIT :brb");
    drop(first);

    let mut second = Peer::accept(&listener).await;
    second.expect_registration("snaibot").await;
    assert_eq!(second.expect_line().await, "JOIN #chan");
    reconnecting.await.unwrap().unwrap();

    second.send("PING :check").await;
    assert_eq!(second.expect_line().await, "PONG check");
    assert_eq!(client.joined_channels(), vec!["#chan".to_string()]);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_while_connecting_is_final() {
    let (listener, config) = listen().await;
    let port = config.port;
    drop(listener);

    let client = Client::new(config);
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    wait_for_state(&client, ConnectionState::Connecting).await;
    assert!(matches!(
        client.reconnect("again", true).await,
        Err(ClientError::AlreadyConnecting)
    ));

    client.disconnect("never mind").await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    tokio::time::timeout(STEP, client.wait_for_disconnect())
        .await
        .unwrap();
    let outcome = tokio::time::timeout(STEP, connecting).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(ClientError::Aborted)));

    // the server comes up late: the client must not come back by itself
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    assert_no_connection(&listener).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // an explicit connect still works and owns the only connection
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut peer = Peer::accept(&listener).await;
    peer.expect_registration("snaibot").await;
    connecting.await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_no_connection(&listener).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_while_reconnecting_is_final() {
    let (listener, config) = listen().await;
    let port = config.port;
    let client = Client::new(config);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut peer = Peer::accept(&listener).await;
    peer.expect_registration("snaibot").await;
    connecting.await.unwrap().unwrap();

    // server goes away entirely, automatic reconnect keeps retrying
    drop(listener);
    drop(peer);
    wait_for_state(&client, ConnectionState::Reconnecting).await;

    client.disconnect("shutting down").await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    tokio::time::timeout(STEP, client.wait_for_disconnect())
        .await
        .unwrap();

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    assert_no_connection(&listener).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_socket_death_during_settle_joins_once() {
    let (listener, mut config) = listen().await;
    config.settle_delay_ms = 300;
    config.password = Some("hunter2".to_string());
    config.channels = vec!["#chan".to_string()];
    let client = Client::new(config);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut first = Peer::accept(&listener).await;
    first.expect_registration("snaibot").await;
    drop(first);

    let mut second = Peer::accept(&listener).await;
    second.expect_registration("snaibot").await;
    assert_eq!(second.expect_line().await, "PRIVMSG NickServ :IDENTIFY hunter2");
    assert_eq!(second.expect_line().await, "JOIN #chan");
    connecting.await.unwrap().unwrap();

    second.send("PING :once").await;
    assert_eq!(second.expect_line().await, "PONG once");
    assert_eq!(client.joined_channels(), vec!["#chan".to_string()]);
}

// =============================================================================
// INBOUND TRAFFIC
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ping_pong_and_channel_state() {
    let (listener, mut config) = listen().await;
    config.channels = vec!["#chan".to_string()];
    let client = Client::new(config);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut peer = Peer::accept(&listener).await;
    peer.expect_registration("snaibot").await;
    assert_eq!(peer.expect_line().await, "JOIN #chan");
    connecting.await.unwrap().unwrap();

    peer.send(":snaibot!bot@host JOIN :#chan").await;
    peer.send(":srv 332 snaibot #chan :release day").await;
    peer.send(":srv 353 snaibot = #chan :@alice +bob snaibot").await;
    peer.send(":ChanServ!s@services MODE #chan +o snaibot").await;
    peer.send("PING :sync").await;
    assert_eq!(peer.expect_line().await, "PONG sync");

    // PONG is queued after the lines above were processed
    assert!(client.ops("#chan").contains("alice"));
    assert!(client.ops("#chan").contains("snaibot"));
    assert!(client.voices("#chan").contains("bob"));
    assert_eq!(client.members("#chan").len(), 3);
    assert!(client.modes("#chan").contains(&'o'));
    assert_eq!(client.topic("#chan").as_deref(), Some("release day"));

    peer.send(":bob!b@h PART #chan :later").await;
    peer.send("PING :sync2").await;
    assert_eq!(peer.expect_line().await, "PONG sync2");
    assert!(!client.members("#chan").contains("bob"));
    assert!(client.voices("#chan").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handlers_reply_through_queue() {
    let (listener, config) = listen().await;
    let client = Client::new(config);

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let replies = client.clone();
        let seen = Arc::clone(&seen);
        client.add_message_handler(
            MessageFilter::new().message(r"^!echo (.+)$").unwrap(),
            Concurrency::Inline,
            move |ctx| {
                seen.lock().push(ctx.channel.clone());
                let text = ctx.matched.get(1).unwrap_or_default().to_string();
                replies.send_message(&ctx.channel, &text);
            },
        );
    }

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut peer = Peer::accept(&listener).await;
    peer.expect_registration("snaibot").await;
    connecting.await.unwrap().unwrap();

    peer.send(":alice!a@host PRIVMSG #chan :!echo hello").await;
    assert_eq!(peer.expect_line().await, "PRIVMSG #chan :hello");

    // private message: reply goes to the sender
    peer.send(":alice!a@host PRIVMSG snaibot :!echo psst").await;
    assert_eq!(peer.expect_line().await, "PRIVMSG alice :psst");

    peer.send(":alice!a@host PRIVMSG #chan :no command here").await;
    peer.send("PING :done").await;
    assert_eq!(peer.expect_line().await, "PONG done");

    assert_eq!(*seen.lock(), vec!["#chan".to_string(), "alice".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queue_overflow_drops_newest() {
    let (listener, mut config) = listen().await;
    config.queue_capacity = 2;
    config.pacing_interval_ms = 200;
    let client = Client::new(config);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut peer = Peer::accept(&listener).await;
    peer.expect_registration("snaibot").await;
    connecting.await.unwrap().unwrap();

    // wait for the pacing gap after USER so the queue starts empty
    tokio::time::sleep(Duration::from_millis(250)).await;
    for n in 1..=5 {
        client.send_message("#chan", &n.to_string());
    }

    // let the pacer drain whatever was accepted before probing
    tokio::time::sleep(Duration::from_millis(1000)).await;
    peer.send("PING :after").await;

    let mut received = Vec::new();
    loop {
        let line = peer.expect_line().await;
        if line == "PONG after" {
            break;
        }
        received.push(line);
    }

    // the pacer may already hold the first line when the rest arrive
    assert!((2..=3).contains(&received.len()), "got {:?}", received);
    let expected: Vec<String> = (1..=received.len())
        .map(|n| format!("PRIVMSG #chan :{}", n))
        .collect();
    assert_eq!(received, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_capacity_queue_is_unlimited() {
    let (listener, mut config) = listen().await;
    config.queue_capacity = 0;
    config.channels = vec!["#a".to_string(), "#b".to_string(), "#c".to_string()];
    let client = Client::new(config);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut peer = Peer::accept(&listener).await;
    peer.expect_registration("snaibot").await;
    for channel in ["#a", "#b", "#c"] {
        assert_eq!(peer.expect_line().await, format!("JOIN {}", channel));
    }
    connecting.await.unwrap().unwrap();

    for n in 1..=5 {
        client.send_message("#a", &n.to_string());
    }
    for n in 1..=5 {
        assert_eq!(peer.expect_line().await, format!("PRIVMSG #a :{}", n));
    }
}
