//! # securechat-core
//!
//! The room session engine behind the SecureChat relay:
//! - Room registry with per-room serialization (join, leave, fan-out)
//! - Password/lock gating, capacity and name-uniqueness checks
//! - Admin election and privileged actions (kick, wipe, lock)
//! - Sliding-window rate limiting per connection
//! - Single-use handshake tokens
//! - Deferred deletion of self-destructing messages
//!
//! This crate has no socket or HTTP code. A connection is a
//! [`connection::Connection`] handle; the relay owns the actual WebSocket.

pub mod connection;
pub mod error;
pub mod handshake;
pub mod limits;
pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod room;
pub mod sanitize;
pub mod scheduler;

pub use connection::{ConnId, Connection, Outbound};
pub use error::{ErrorCode, EventError, JoinError, TransportError, ValidationError};
pub use handshake::TokenIssuer;
pub use limits::RoomLimits;
pub use protocol::{ChatMessage, ClientEvent, ContentKind, ServerEvent};
pub use registry::{RoomRegistry, RoomSnapshot};
