//! Pooled, pipelined connections to a Redis-compatible store.
//!
//! This crate owns the lifecycle of physical connections: dialing (with
//! optional TLS and an `AUTH` handshake), checkout/checkin bookkeeping,
//! pipelined command tracking, and the translation of transport and
//! protocol failures into a single [`RedisError`].
//!
//! # Overview
//! All activity revolves around the [`ConnectionPool`]. A pool is created
//! once with fixed configuration and handed a metrics scope in which it
//! tracks active, lifetime-total and locally-closed connection counts:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use repool::{CommandArg, ConnectionConfig, ConnectionPool, InMemoryScope, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), repool::RedisError> {
//!     let pool = ConnectionPool::new(
//!         Arc::new(InMemoryScope::new()),
//!         PoolConfig {
//!             connection_config: ConnectionConfig::new("127.0.0.1:6379"),
//!             ..Default::default()
//!         },
//!     );
//!
//!     let mut conn = pool.get().await?;
//!     conn.pipe_append("INCRBY", &[CommandArg::Str("hits"), CommandArg::Int(1)]);
//!     conn.pipe_append("INCRBY", &[CommandArg::Str("near_limit"), CommandArg::Int(1)]);
//!     let hits = conn.pipe_response().await?.int()?;
//!     let near_limit = conn.pipe_response().await?.int()?;
//!     pool.put(conn);
//!
//!     println!("hits={hits} near_limit={near_limit}");
//!     Ok(())
//! }
//! ```
//!
//! # Pipelining and reuse
//! A checked-out connection batches commands with
//! [`Connection::pipe_append`] and reads replies back in order with
//! [`Connection::pipe_response`]. Exactly as many replies must be read as
//! commands were appended: a connection returned with unread replies is
//! closed instead of recycled, because its stream position would
//! desynchronize the next borrower. Reading *more* replies than were
//! appended is a caller bug and fails with [`RedisError::Misuse`].

pub mod errors;
pub mod network;
pub mod observability;
pub mod response;

pub use errors::{ConnectError, ProtocolError, RedisError};
pub use network::connection::{Connection, ConnectionConfig, PipelineState};
pub use network::connection_pool::{
    ConnectionPool, ExhaustionPolicy, PoolConfig, PoolSize, PooledConnection,
};
pub use network::tls::TlsError;
pub use observability::metrics::{Counter, Gauge, InMemoryScope, StatsScope};
pub use response::Response;

pub use repool_resp::frame::value::{RespValue, ValueKind};
pub use repool_resp::frame::CommandArg;
