//! Document, suggestion, and authoring-surface domain records.
//!
//! Documents are versioned by (id, created_at): a new save with the same id
//! and a later timestamp is a newer version, and rollback deletes all
//! versions strictly after a given timestamp. Content is full-replace per
//! version; the version history itself is append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of a document, which dictates its generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Free text, streamed and appended fragment by fragment.
    Text,
    /// Code, streamed as whole-snapshot replacements.
    Code,
    /// Text generation seeded by a blocking research sub-flow.
    Search,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Text => "text",
            DocumentKind::Code => "code",
            DocumentKind::Search => "search",
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(DocumentKind::Text),
            "code" => Ok(DocumentKind::Code),
            "search" => Ok(DocumentKind::Search),
            other => Err(format!("unknown document kind: {other}")),
        }
    }
}

/// One version of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub kind: DocumentKind,
    pub content: String,
    pub user_id: String,
}

/// A writing suggestion bound to one document version.
///
/// `document_created_at` pins the version the suggestion was generated
/// against; a suggestion whose timestamp no longer matches the document's
/// current version is stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub document_id: String,
    pub document_created_at: DateTime<Utc>,
    pub original_text: String,
    pub suggested_text: String,
    pub description: String,
    pub is_resolved: bool,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// A user-authored tool definition. `parameters` is untyped structured
/// data; a validator is synthesized from it at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTool {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parameters: serde_json::Value,
    pub user_id: String,
}

/// A user-authored agent definition: a system prompt plus tool ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub prompt: Option<String>,
    pub tool_ids: Vec<String>,
    pub user_id: String,
}

/// Lifecycle status of an agent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Started,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Started => "started",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "started" => Ok(ExecutionStatus::Started),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// One run of a user-authored agent over a single input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub agent_id: String,
    pub input: String,
    pub status: ExecutionStatus,
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
