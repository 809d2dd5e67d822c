//! Low-level transport handling: dialing, TLS, single connections and the
//! pool that owns them.

pub mod connection;
pub mod connection_pool;
pub mod tls;
