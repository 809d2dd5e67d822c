//! A single physical connection to the store, with pipelined command
//! tracking.
//!
//! A [`Connection`] is owned by exactly one caller at a time: `pipe_append`
//! and `pipe_response` take `&mut self`, so concurrent pipelining on one
//! connection is rejected at compile time. The pool enforces the matching
//! rule on checkin — a connection whose pipeline is not idle is closed, not
//! recycled, because its byte stream position would desynchronize the next
//! borrower.

use std::num::NonZeroU32;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::errors::{ConnectError, RedisError};
use crate::network::tls::{server_name_of, TlsContext};
use crate::response::Response;
use repool_resp::frame::value::RespValue;
use repool_resp::frame::{read_value, write_command, CommandArg};

/// Configuration for dialing connections of one pool.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Address of the store, `host:port`.
    pub address: String,
    /// Whether to wrap the TCP stream in TLS (default configuration,
    /// no custom CA).
    pub use_tls: bool,
    /// Password sent via `AUTH` right after the transport is established.
    /// `None` or an empty string disables authentication.
    pub credential: Option<String>,
    /// Deadline for the TCP connect (the TLS handshake and `AUTH`
    /// round-trip are bounded by `read_timeout`, if any).
    pub connect_timeout: Duration,
    /// Deadline for each pipelined read. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    /// Whether to disable Nagle's algorithm.
    pub tcp_nodelay: bool,
    /// If set, configures TCP keepalive probing on the socket.
    pub tcp_keepalive_interval: Option<Duration>,
}

impl ConnectionConfig {
    /// Configuration for a plain, unauthenticated connection to `address`.
    pub fn new(address: impl Into<String>) -> Self {
        ConnectionConfig {
            address: address.into(),
            ..Default::default()
        }
    }

    pub(crate) fn auth_enabled(&self) -> bool {
        self.credential.as_deref().is_some_and(|c| !c.is_empty())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            address: "127.0.0.1:6379".to_string(),
            use_tls: false,
            credential: None,
            connect_timeout: Duration::from_secs(5),
            read_timeout: None,
            tcp_nodelay: true,
            tcp_keepalive_interval: None,
        }
    }
}

/// Pipeline bookkeeping of one connection.
///
/// Modeled as a tagged state rather than a bare counter so that the
/// "never recycle while pipelining" checkin rule is a one-word match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Every appended command has had its reply read back.
    Idle,
    /// This many commands were appended and not yet read back.
    Pipelining(NonZeroU32),
}

impl PipelineState {
    /// True if no replies are outstanding.
    pub fn is_idle(&self) -> bool {
        matches!(self, PipelineState::Idle)
    }

    /// Number of outstanding replies.
    pub fn pending(&self) -> u32 {
        match self {
            PipelineState::Idle => 0,
            PipelineState::Pipelining(n) => n.get(),
        }
    }

    fn append(&mut self) {
        *self = match *self {
            PipelineState::Idle => PipelineState::Pipelining(NonZeroU32::MIN),
            PipelineState::Pipelining(n) => PipelineState::Pipelining(n.saturating_add(1)),
        };
    }

    fn retire(&mut self) -> Result<(), RedisError> {
        match *self {
            PipelineState::Idle => Err(RedisError::Misuse(
                "pipe_response called with no outstanding pipelined command",
            )),
            PipelineState::Pipelining(n) => {
                *self = match NonZeroU32::new(n.get() - 1) {
                    Some(left) => PipelineState::Pipelining(left),
                    None => PipelineState::Idle,
                };
                Ok(())
            }
        }
    }
}

pub(crate) trait Transport: AsyncBufRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncBufRead + AsyncWrite + Unpin + Send> Transport for T {}

/// One physical transport plus its pipeline state.
pub struct Connection {
    transport: Box<dyn Transport>,
    write_buf: BytesMut,
    pipeline: PipelineState,
    read_timeout: Option<Duration>,
    address: String,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Connection {
    fn new(transport: Box<dyn Transport>, config: &ConnectionConfig) -> Self {
        Connection {
            transport,
            write_buf: BytesMut::with_capacity(256),
            pipeline: PipelineState::Idle,
            read_timeout: config.read_timeout,
            address: config.address.clone(),
        }
    }

    /// Current pipeline bookkeeping of this connection.
    pub fn pipeline_state(&self) -> PipelineState {
        self.pipeline
    }

    /// Buffers one command for pipelined transmission.
    ///
    /// No network IO happens here; buffered commands are flushed before the
    /// first subsequent `pipe_response`.
    pub fn pipe_append(&mut self, cmd: &str, args: &[CommandArg<'_>]) {
        write_command(&mut self.write_buf, cmd, args);
        self.pipeline.append();
    }

    /// Reads back the reply to the oldest appended command.
    ///
    /// Calling this with an idle pipeline is a caller bug and yields
    /// [`RedisError::Misuse`]. The pipeline slot is retired before the read,
    /// so a failed read leaves the connection non-recyclable only through
    /// the error path, not through stale bookkeeping.
    pub async fn pipe_response(&mut self) -> Result<Response, RedisError> {
        self.pipeline.retire()?;

        if !self.write_buf.is_empty() {
            self.transport
                .write_all(&self.write_buf)
                .await
                .map_err(|e| RedisError::from(repool_resp::FrameError::Io(e)))?;
            self.transport
                .flush()
                .await
                .map_err(|e| RedisError::from(repool_resp::FrameError::Io(e)))?;
            self.write_buf.clear();
        }

        let value = match self.read_timeout {
            Some(deadline) => tokio::time::timeout(deadline, read_value(&mut self.transport))
                .await
                .map_err(|_| RedisError::Timeout)??,
            None => read_value(&mut self.transport).await?,
        };

        Ok(Response::new(value))
    }
}

/// Dials one connection: TCP connect, optional TLS handshake, optional
/// `AUTH`. Does not retry; a half-authenticated connection is never
/// returned — any failure after the socket opens closes it.
pub(crate) async fn open_connection(
    config: &ConnectionConfig,
    tls: Option<&TlsContext>,
) -> Result<Connection, ConnectError> {
    warn!("connecting to redis on {}", config.address);

    let stream = match tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect(config.address.as_str()),
    )
    .await
    {
        Ok(stream) => stream?,
        Err(_) => return Err(ConnectError::ConnectTimeout),
    };
    stream.set_nodelay(config.tcp_nodelay)?;

    if let Some(interval) = config.tcp_keepalive_interval {
        setup_tcp_keepalive(&stream, interval)?;
    }

    let transport: Box<dyn Transport> = match tls {
        Some(context) => {
            let host = server_name_of(&config.address);
            let tls_stream = context.wrap(host, stream).await?;
            Box::new(BufStream::new(tls_stream))
        }
        None => Box::new(BufStream::new(stream)),
    };
    let mut connection = Connection::new(transport, config);

    if let Some(credential) = config.credential.as_deref().filter(|c| !c.is_empty()) {
        warn!("enabling authentication to redis on {}", config.address);
        authenticate(&mut connection, credential).await?;
    }

    debug!("connection to {} established", config.address);
    Ok(connection)
}

/// Issues `AUTH` and demands an `+OK`. An error return drops the
/// connection, closing the socket.
async fn authenticate(connection: &mut Connection, credential: &str) -> Result<(), ConnectError> {
    let mut buf = BytesMut::new();
    write_command(&mut buf, "AUTH", &[CommandArg::Str(credential)]);
    connection
        .transport
        .write_all(&buf)
        .await
        .map_err(ConnectError::from)?;
    connection.transport.flush().await.map_err(ConnectError::from)?;

    match read_value(&mut connection.transport).await? {
        RespValue::Simple(_) => Ok(()),
        RespValue::Error(reason) => Err(ConnectError::AuthenticationFailed(reason)),
        other => Err(ConnectError::AuthenticationFailed(format!(
            "unexpected {} reply to AUTH",
            other.kind()
        ))),
    }
}

fn setup_tcp_keepalive(stream: &TcpStream, interval: Duration) -> std::io::Result<()> {
    // socket2 calls the idle-until-first-probe duration "time"; we follow
    // the naming convention of other drivers and call it the interval.
    let keepalive = socket2::TcpKeepalive::new().with_time(interval);
    let sock = socket2::SockRef::from(stream);
    sock.set_tcp_keepalive(&keepalive)
}
