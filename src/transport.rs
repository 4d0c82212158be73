//! Stream transport for a single server connection.
//!
//! The transport knows nothing about IRC beyond line framing. It opens the
//! TCP stream (retrying forever at a fixed delay), then splits into a
//! [`LineReader`] owned by the receiver worker and a [`LineWriter`] owned
//! by the pacer. Either side reports a dead socket through the shared
//! [`Liveness`] signal, which fires at most once per connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::codec::LineCodec;
use crate::error::TransportError;

/// Open a TCP connection, retrying at a fixed delay until it succeeds.
///
/// There is no attempt limit. Returns `None` only when `abort` is
/// cancelled first.
pub async fn connect_with_retry(
    host: &str,
    port: u16,
    retry_delay: Duration,
    abort: &CancellationToken,
) -> Option<TcpStream> {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        info!(host, port, attempt, "trying to connect");
        let result = tokio::select! {
            biased;
            _ = abort.cancelled() => return None,
            result = TcpStream::connect((host, port)) => result,
        };
        match result {
            Ok(stream) => {
                if let Err(e) = enable_keepalive(&stream) {
                    warn!("failed to enable TCP keepalive: {}", e);
                }
                return Some(stream);
            }
            Err(e) => {
                warn!(host, port, attempt, error = %e, "connect failed, retrying");
                tokio::select! {
                    _ = abort.cancelled() => return None,
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
        }
    }
}

fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));

    sock.set_tcp_keepalive(&keepalive)
}

/// Split a connected stream into framed reader and writer halves.
pub fn split_tcp(stream: TcpStream) -> (LineReader<OwnedReadHalf>, LineWriter<OwnedWriteHalf>) {
    let (read, write) = stream.into_split();
    (LineReader::new(read), LineWriter::new(write))
}

/// Receiving half: yields decoded protocol lines.
pub struct LineReader<R> {
    framed: FramedRead<R, LineCodec>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wrap a raw byte source.
    pub fn new(io: R) -> Self {
        Self {
            framed: FramedRead::new(io, LineCodec::new()),
        }
    }

    /// Wait for the next complete line.
    ///
    /// A closed stream is reported as [`TransportError::Closed`].
    pub async fn receive(&mut self) -> Result<String, TransportError> {
        match self.framed.next().await {
            Some(Ok(line)) => {
                trace!("RECV: {}", line);
                Ok(line)
            }
            Some(Err(e)) => Err(TransportError::Io(e)),
            None => Err(TransportError::Closed),
        }
    }
}

/// Sending half: writes one line per call, CRLF appended by the codec.
pub struct LineWriter<W> {
    framed: FramedWrite<W, LineCodec>,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    /// Wrap a raw byte sink.
    pub fn new(io: W) -> Self {
        Self {
            framed: FramedWrite::new(io, LineCodec::new()),
        }
    }

    /// Write and flush a single line.
    pub async fn send(&mut self, line: String) -> Result<(), TransportError> {
        trace!("SENT: {}", line);
        self.framed.send(line).await.map_err(TransportError::Io)
    }
}

/// One-shot "socket is dead" signal shared by the workers of a connection.
#[derive(Clone, Debug, Default)]
pub struct Liveness {
    inner: Arc<LivenessInner>,
}

#[derive(Debug, Default)]
struct LivenessInner {
    fired: AtomicBool,
    failed: CancellationToken,
}

impl Liveness {
    /// Create an armed signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a transport failure.
    ///
    /// Returns `true` only for the call that actually fired the signal.
    pub fn fail(&self, cause: &TransportError) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        warn!(error = %cause, "socket dead, going to reconnect");
        self.inner.failed.cancel();
        true
    }

    /// Stop the signal from ever firing, for a deliberate teardown.
    ///
    /// Returns `false` if it had already fired.
    pub fn disarm(&self) -> bool {
        !self.inner.fired.swap(true, Ordering::AcqRel)
    }

    /// Whether a failure has been reported.
    pub fn has_failed(&self) -> bool {
        self.inner.failed.is_cancelled()
    }

    /// Resolve once a failure has been reported.
    pub async fn failed(&self) {
        self.inner.failed.cancelled().await
    }
}
