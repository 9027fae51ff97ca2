//! # Avacyn Core
//!
//! Domain types, traits, and error definitions for the Avacyn assistant
//! runtime. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! Every subsystem boundary is a trait here (model provider, tool), so the
//! orchestrator can be exercised with mocks and implementations can be
//! swapped via configuration.

pub mod chat;
pub mod document;
pub mod error;
pub mod message;
pub mod provider;
pub mod stream;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use chat::{Chat, Vote};
pub use document::{AgentDefinition, Document, DocumentKind, Execution, ExecutionStatus, StoredTool, Suggestion};
pub use error::{Error, ProviderError, Result, SearchError, StorageError, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{ObjectRequest, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use stream::{MessageAnnotation, StreamEvent};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
