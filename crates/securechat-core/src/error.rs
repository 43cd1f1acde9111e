//! Error types for securechat-core.
//!
//! Every client-facing error maps onto a stable [`ErrorCode`] so the relay
//! can report it over the wire without string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error code carried by `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Sealed,
    BadSecret,
    Full,
    NameTaken,
    InvalidToken,
    RateLimited,
    Forbidden,
    NotFound,
    InvalidInput,
}

/// Why a join attempt was refused. A refused join never mutates the room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("this room is locked")]
    Sealed,

    #[error("wrong password for this room")]
    BadSecret,

    #[error("this room is full ({0} members)")]
    Full(usize),

    #[error("the name '{0}' is already taken in this room")]
    NameTaken(String),
}

impl JoinError {
    pub fn code(&self) -> ErrorCode {
        match self {
            JoinError::Sealed => ErrorCode::Sealed,
            JoinError::BadSecret => ErrorCode::BadSecret,
            JoinError::Full(_) => ErrorCode::Full,
            JoinError::NameTaken(_) => ErrorCode::NameTaken,
        }
    }
}

/// A send on a connection failed. Always handled as an implicit leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("outbound queue full (slow consumer)")]
    Backlogged,
}

/// A rejected inbound event. Non-fatal unless it is [`EventError::NotMember`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("connection is not a member of room '{0}'")]
    NotMember(String),

    #[error("slow down: too many events")]
    RateLimited,

    #[error("only the room admin can {0}")]
    Forbidden(&'static str),

    #[error("'{0}' is not in this room")]
    UnknownMember(String),

    #[error("message '{0}' not found")]
    UnknownMessage(String),

    #[error("invalid event: {0}")]
    Invalid(String),
}

impl EventError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EventError::NotMember(_) | EventError::UnknownMember(_) | EventError::UnknownMessage(_) => {
                ErrorCode::NotFound
            }
            EventError::RateLimited => ErrorCode::RateLimited,
            EventError::Forbidden(_) => ErrorCode::Forbidden,
            EventError::Invalid(_) => ErrorCode::InvalidInput,
        }
    }
}

/// Rejected user input (names, room ids, secrets, reactions).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be {min}-{max} characters")]
    Length {
        field: &'static str,
        min: usize,
        max: usize,
    },

    #[error("{0} can only contain letters, numbers, underscores and dashes")]
    Charset(&'static str),

    #[error("content is empty")]
    Empty,

    #[error("content too long ({len} > {max})")]
    TooLong { len: usize, max: usize },

    #[error("reaction contains forbidden characters")]
    Reaction,
}

impl From<ValidationError> for EventError {
    fn from(e: ValidationError) -> Self {
        EventError::Invalid(e.to_string())
    }
}
