//! Typed access to one decoded reply.

use crate::errors::{ProtocolError, RedisError};
use repool_resp::frame::value::RespValue;

/// One reply read back from a pipelined command.
///
/// Conversion is performed on access, not at construction: a reply the
/// caller never inspects costs nothing beyond the decode of its frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    value: RespValue,
}

impl Response {
    pub(crate) fn new(value: RespValue) -> Self {
        Response { value }
    }

    /// Borrows the raw decoded reply.
    pub fn value(&self) -> &RespValue {
        &self.value
    }

    /// Decodes the reply as a signed 64-bit integer.
    ///
    /// Server error replies and replies of any other shape fail with
    /// [`RedisError::Protocol`].
    pub fn int(&self) -> Result<i64, RedisError> {
        match &self.value {
            RespValue::Integer(value) => Ok(*value),
            RespValue::Error(reason) => Err(ProtocolError::Server(reason.clone()).into()),
            other => Err(ProtocolError::UnexpectedReply {
                expected: "integer",
                got: other.kind(),
            }
            .into()),
        }
    }
}
