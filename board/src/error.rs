use thiserror::Error;

use crate::types::SessionId;

/// Failures of the row store. `NotFound` and `Persistence` stay distinct so a
/// caller can tell "this session doesn't exist" from "the write failed".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("no row with id {id} in table {table}")]
    NotFound { table: String, id: String },

    #[error("persistence failure on table {table}: {reason}")]
    Persistence { table: String, reason: String },
}

impl StoreError {
    pub fn not_found(table: impl Into<String>, id: impl ToString) -> Self {
        StoreError::NotFound {
            table: table.into(),
            id: id.to_string(),
        }
    }

    pub fn persistence(table: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::Persistence {
            table: table.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures of the realtime link.
///
/// `Decode` is contained at the topic boundary: a malformed payload is logged
/// and dropped, it never terminates a stream or the channel. `Transport` is
/// terminal for every open stream of the session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RealtimeError {
    #[error("no open channel for session {session_id}")]
    ChannelNotOpen { session_id: SessionId },

    #[error("realtime link failed: {reason}")]
    Transport { reason: String },

    #[error("malformed payload on topic {topic}: {reason}")]
    Decode { topic: String, reason: String },
}

impl RealtimeError {
    pub fn transport(reason: impl ToString) -> Self {
        RealtimeError::Transport {
            reason: reason.to_string(),
        }
    }

    pub fn decode(topic: impl Into<String>, reason: impl ToString) -> Self {
        RealtimeError::Decode {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }
}
