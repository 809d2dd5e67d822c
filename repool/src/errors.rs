//! The error types surfaced at the driver boundary.
//!
//! Every failure from dialing, pipelining or reply decoding is translated
//! into [`RedisError`]; callers pattern-match on its variants instead of
//! installing a recovery boundary around each call.

use std::sync::Arc;

use thiserror::Error;

use crate::network::tls::TlsError;
use repool_resp::frame::frame_errors::FrameError;
use repool_resp::frame::value::ValueKind;

/// The single error type surfaced by pool, connection and response calls.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RedisError {
    /// Establishing a connection failed: dial, TLS handshake or
    /// authentication.
    #[error("failed to connect: {0}")]
    Connect(#[from] ConnectError),

    /// The server sent something the driver could not accept: a framing
    /// or decode failure, a mid-stream IO failure, or a reply of an
    /// unexpected shape.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A caller bug: reading more pipelined replies than commands were
    /// appended. Surfaced loudly instead of being masked.
    #[error("connection misuse: {0}")]
    Misuse(&'static str),

    /// A read deadline elapsed before the server replied.
    #[error("operation timed out")]
    Timeout,

    /// The pool is at capacity and configured to fail fast.
    #[error("connection pool exhausted")]
    PoolExhausted,
}

impl From<FrameError> for RedisError {
    fn from(err: FrameError) -> RedisError {
        RedisError::Protocol(ProtocolError::Frame(err))
    }
}

/// An error that occurred while establishing a single connection.
///
/// Fatal to that one attempt; the driver does not retry internally.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConnectError {
    /// Input/Output error while dialing or during the handshake.
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// The TCP connect did not complete within the configured timeout.
    #[error("connect timeout")]
    ConnectTimeout,

    /// Setting up the TLS layer failed.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// The server rejected the `AUTH` command. The socket has already
    /// been closed by the time this is returned.
    #[error("authentication rejected by server: {0}")]
    AuthenticationFailed(String),

    /// The reply to the `AUTH` command could not be decoded.
    #[error("handshake failed: {0}")]
    Handshake(#[from] FrameError),
}

impl From<std::io::Error> for ConnectError {
    fn from(err: std::io::Error) -> ConnectError {
        ConnectError::Io(Arc::new(err))
    }
}

/// A reply decode failure or a mid-stream failure during a pipelined read.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProtocolError {
    /// RESP2 framing or IO failure while reading a reply.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The server answered with an error reply where a typed value was
    /// demanded.
    #[error("server returned an error: {0}")]
    Server(String),

    /// The reply decoded fine but had the wrong shape for the requested
    /// conversion.
    #[error("unexpected reply kind: expected {expected}, got {got}")]
    UnexpectedReply {
        /// The shape the accessor demanded.
        expected: &'static str,
        /// The shape the server actually sent.
        got: ValueKind,
    },
}
