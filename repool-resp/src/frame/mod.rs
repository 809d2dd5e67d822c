//! RESP2 frame encoding and decoding.
//!
//! Commands are encoded as arrays of bulk strings; replies are decoded from
//! any transport implementing [`AsyncBufRead`]. Neither direction performs
//! its own buffering — callers are expected to hand in buffered streams.

pub mod frame_errors;
pub mod value;

use bytes::{BufMut, BytesMut};
use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::frame::frame_errors::FrameError;
use crate::frame::value::RespValue;

const CRLF: &[u8] = b"\r\n";

/// One argument of a command, in the shapes the driver sends.
///
/// All variants are serialized as bulk strings; integers are rendered in
/// decimal, which is what the server expects for numeric arguments.
#[derive(Debug, Clone, Copy)]
pub enum CommandArg<'a> {
    /// A textual argument.
    Str(&'a str),
    /// A binary-safe argument.
    Bytes(&'a [u8]),
    /// A signed integer argument.
    Int(i64),
    /// An unsigned integer argument.
    Uint(u64),
}

impl<'a> From<&'a str> for CommandArg<'a> {
    fn from(value: &'a str) -> Self {
        CommandArg::Str(value)
    }
}

impl<'a> From<&'a String> for CommandArg<'a> {
    fn from(value: &'a String) -> Self {
        CommandArg::Str(value)
    }
}

impl<'a> From<&'a [u8]> for CommandArg<'a> {
    fn from(value: &'a [u8]) -> Self {
        CommandArg::Bytes(value)
    }
}

impl From<i64> for CommandArg<'_> {
    fn from(value: i64) -> Self {
        CommandArg::Int(value)
    }
}

impl From<u64> for CommandArg<'_> {
    fn from(value: u64) -> Self {
        CommandArg::Uint(value)
    }
}

/// Encodes one command as a RESP2 array of bulk strings into `out`.
///
/// The buffer is appended to, not cleared, so several commands can be
/// batched back-to-back for pipelined transmission.
pub fn write_command(out: &mut BytesMut, cmd: &str, args: &[CommandArg<'_>]) {
    put_header(out, b'*', (args.len() + 1) as i64);
    put_bulk(out, cmd.as_bytes());
    for arg in args {
        match arg {
            CommandArg::Str(s) => put_bulk(out, s.as_bytes()),
            CommandArg::Bytes(b) => put_bulk(out, b),
            CommandArg::Int(i) => put_bulk(out, i.to_string().as_bytes()),
            CommandArg::Uint(u) => put_bulk(out, u.to_string().as_bytes()),
        }
    }
}

fn put_header(out: &mut BytesMut, marker: u8, len: i64) {
    out.put_u8(marker);
    out.put_slice(len.to_string().as_bytes());
    out.put_slice(CRLF);
}

fn put_bulk(out: &mut BytesMut, data: &[u8]) {
    put_header(out, b'$', data.len() as i64);
    out.put_slice(data);
    out.put_slice(CRLF);
}

/// Reads exactly one reply from the transport.
///
/// Blocks (asynchronously) until a full reply has arrived. Arrays are read
/// recursively; a null bulk (`$-1`) decodes to [`RespValue::Bulk`]`(None)`
/// and a null array decodes to an empty [`RespValue::Array`].
pub async fn read_value<R>(reader: &mut R) -> Result<RespValue, FrameError>
where
    R: AsyncBufRead + Unpin + Send,
{
    read_value_inner(reader).await
}

// Recursion in an async fn requires boxing, hence the hand-written
// future type on the inner function.
fn read_value_inner<'a, R>(
    reader: &'a mut R,
) -> Pin<Box<dyn Future<Output = Result<RespValue, FrameError>> + Send + 'a>>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(async move {
        let mut line = Vec::with_capacity(32);
        read_line(reader, &mut line).await?;
        let Some((&marker, rest)) = line.split_first() else {
            return Err(FrameError::UnexpectedEof);
        };

        match marker {
            b'+' => Ok(RespValue::Simple(decode_utf8(rest)?)),
            b'-' => Ok(RespValue::Error(decode_utf8(rest)?)),
            b':' => Ok(RespValue::Integer(parse_int(rest)?)),
            b'$' => match parse_int(rest)? {
                -1 => Ok(RespValue::Bulk(None)),
                len if len < 0 => Err(FrameError::InvalidLength(len)),
                len => read_bulk_body(reader, len as usize).await,
            },
            b'*' => match parse_int(rest)? {
                len if len <= 0 => Ok(RespValue::Array(Vec::new())),
                len => {
                    let mut items = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        items.push(read_value_inner(reader).await?);
                    }
                    Ok(RespValue::Array(items))
                }
            },
            other => Err(FrameError::InvalidTypeByte(other)),
        }
    })
}

async fn read_bulk_body<R>(reader: &mut R, len: usize) -> Result<RespValue, FrameError>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf).await?;
    if crlf != [b'\r', b'\n'] {
        return Err(FrameError::MissingCrlf);
    }

    Ok(RespValue::Bulk(Some(data)))
}

/// Reads one CRLF-terminated line into `buf`, with the terminator stripped.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<(), FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 {
        return Err(FrameError::UnexpectedEof);
    }
    if buf.len() < 2 || buf[buf.len() - 2..] != *CRLF {
        return Err(FrameError::MissingCrlf);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn decode_utf8(data: &[u8]) -> Result<String, FrameError> {
    String::from_utf8(data.to_vec()).map_err(|_| FrameError::InvalidUtf8)
}

fn parse_int(data: &[u8]) -> Result<i64, FrameError> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(FrameError::MalformedInteger)
}
