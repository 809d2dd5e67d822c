//! RESP2 protocol primitives for the `repool` driver.
//!
//! This crate contains the wire-level building blocks the driver composes:
//! the decoded reply model ([`frame::value::RespValue`]), the command encoder
//! ([`frame::write_command`]) and the asynchronous reply decoder
//! ([`frame::read_value`]). It knows nothing about pooling, authentication or
//! connection lifecycle — those live in the `repool` crate.

pub mod frame;

pub use frame::frame_errors::FrameError;
pub use frame::value::{RespValue, ValueKind};
pub use frame::{read_value, write_command, CommandArg};
