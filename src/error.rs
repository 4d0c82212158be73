//! Error types for the IRC bot client.
//!
//! Only conditions a caller can act on are modelled as errors. A full
//! outbound queue, an unrecognised line or a query for an unknown channel
//! are diagnostics, not errors, and are reported through `tracing` instead.

use thiserror::Error;

/// Convenience type alias for Results using [`ClientError`].
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Failure of the underlying stream. Always fatal to the current connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection (zero-length read).
    #[error("connection closed by peer")]
    Closed,
}

/// Errors returned by the client facade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// `connect` was called while a connection is live.
    #[error("already connected")]
    AlreadyConnected,

    /// `connect` was called while another connect is in progress.
    #[error("already trying to connect")]
    AlreadyConnecting,

    /// The operation needs a live connection.
    #[error("not connected")]
    NotConnected,

    /// A connect or reconnect was still in progress when `disconnect` ran.
    #[error("connection attempt aborted by disconnect")]
    Aborted,

    /// A handler filter failed to compile.
    #[error("invalid filter pattern {pattern:?}")]
    InvalidPattern {
        /// The pattern as given by the caller.
        pattern: String,
        /// The underlying compile error.
        #[source]
        source: regex::Error,
    },

    /// Transport failure surfaced to the caller.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
