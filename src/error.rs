//! Error types shared by the session, the server loop and the controller.
//!
//! Per-command failures travel back to the controller inside a
//! [`crate::Response`], so the error type is a plain value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SimError {
    #[error("{what} index {index} out of range (0..{len})")]
    OutOfRange {
        what: String,
        index: usize,
        len: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("session closed")]
    SessionClosed,

    #[error("session has not been set up")]
    NotStarted,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl SimError {
    pub fn out_of_range(what: &str, index: usize, len: usize) -> Self {
        Self::OutOfRange {
            what: what.to_string(),
            index,
            len,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
