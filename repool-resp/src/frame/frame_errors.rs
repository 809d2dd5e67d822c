//! Errors that can occur while encoding or decoding RESP2 frames.

use thiserror::Error;

/// An error that occurred while reading or decoding a single RESP2 reply.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FrameError {
    /// Input/Output error while reading from the transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed in the middle of a frame.
    #[error("connection closed mid-frame")]
    UnexpectedEof,

    /// The first byte of a reply did not denote any RESP2 type.
    #[error("invalid frame type byte: {0:#04x}")]
    InvalidTypeByte(u8),

    /// A frame line was not terminated with CRLF.
    #[error("frame line missing CRLF terminator")]
    MissingCrlf,

    /// An integer line (`:` reply, bulk length or array length) did not
    /// contain a valid decimal integer.
    #[error("malformed integer in frame")]
    MalformedInteger,

    /// A bulk string or array carried a negative length other than the
    /// null marker (-1).
    #[error("invalid length in frame: {0}")]
    InvalidLength(i64),

    /// A simple string or error line contained invalid UTF-8.
    #[error("frame line is not valid UTF-8")]
    InvalidUtf8,
}
