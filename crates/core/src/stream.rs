//! Typed events multiplexed onto the per-turn response stream.
//!
//! Every event produced during a turn — assistant text deltas, document
//! draft lifecycle markers, suggestion payloads — is a `StreamEvent`. The
//! gateway serializes them as `{"type": "...", ...}` frames over SSE, in
//! emission order. Draft events and assistant deltas interleave freely;
//! ordering is only guaranteed within a producer.

use serde::{Deserialize, Serialize};

use crate::document::{DocumentKind, Suggestion};

/// One event on the turn stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// The server-assigned id of the just-persisted user message. Always
    /// the first event of a turn.
    UserMessageId { content: String },

    /// A document draft has been allocated this id.
    Id { content: String },

    /// The draft's title.
    Title { content: String },

    /// The draft's kind.
    Kind { content: DocumentKind },

    /// Reset the client's view of the draft body. Carries the title so the
    /// client can re-label while clearing.
    Clear { content: String },

    /// A fragment of streamed text (assistant prose or a text/search draft).
    TextDelta { content: String },

    /// A whole-snapshot replacement of a code draft's body.
    CodeDelta { content: String },

    /// One completed writing suggestion.
    Suggestion { content: Suggestion },

    /// The active draft is complete.
    Finish,

    /// Post-turn metadata attached to a persisted assistant message.
    MessageAnnotation { content: MessageAnnotation },
}

/// Annotation linking a streamed assistant message to its persisted id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAnnotation {
    pub message_id_from_server: String,
}

impl StreamEvent {
    /// The wire tag for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::UserMessageId { .. } => "user-message-id",
            StreamEvent::Id { .. } => "id",
            StreamEvent::Title { .. } => "title",
            StreamEvent::Kind { .. } => "kind",
            StreamEvent::Clear { .. } => "clear",
            StreamEvent::TextDelta { .. } => "text-delta",
            StreamEvent::CodeDelta { .. } => "code-delta",
            StreamEvent::Suggestion { .. } => "suggestion",
            StreamEvent::Finish => "finish",
            StreamEvent::MessageAnnotation { .. } => "message-annotation",
        }
    }

    pub fn text_delta(content: impl Into<String>) -> Self {
        StreamEvent::TextDelta {
            content: content.into(),
        }
    }

    pub fn code_delta(content: impl Into<String>) -> Self {
        StreamEvent::CodeDelta {
            content: content.into(),
        }
    }
}
