//! Chat and vote domain records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat: an ordered sequence of persisted messages owned by one user.
///
/// Created lazily on the first turn of a new id; ownership is fixed at
/// creation and checked on every mutating access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    /// Derived from the first user turn when not supplied.
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// An up/down vote on one message within a chat.
/// Keyed by (chat_id, message_id); re-voting upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub chat_id: String,
    pub message_id: String,
    pub is_upvoted: bool,
}
