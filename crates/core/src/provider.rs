//! Provider trait — the abstraction over model-inference backends.
//!
//! A Provider knows how to send a message history to a language model and
//! get a response back, either complete or as a stream of chunks. It also
//! supports schema-constrained generation: streaming partial snapshots of a
//! single JSON object, or the completed elements of a JSON array, which is
//! what the document draft machine and the suggestion flow consume.

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a provider completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// The message history
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl ProviderRequest {
    /// A request with just a system prompt and one user prompt — the shape
    /// used by the document generation strategies and title synthesis.
    pub fn prompted(model: impl Into<String>, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::system(system), Message::user(prompt)],
            temperature: default_temperature(),
            max_tokens: None,
            tools: Vec::new(),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Completed tool calls (populated on the final chunk)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A request for schema-constrained object or array generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    /// JSON Schema the generated object must conform to. For element
    /// streaming, the schema of one array element.
    pub schema: serde_json::Value,
}

pub type StreamReceiver<T> = tokio::sync::mpsc::Receiver<std::result::Result<T, ProviderError>>;

/// The core Provider trait.
///
/// The orchestrator, the document tools, and the suggestion flow call these
/// methods without knowing which backend is in use.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a
    /// single chunk.
    async fn stream(&self, request: ProviderRequest) -> std::result::Result<StreamReceiver<StreamChunk>, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.message.content),
                tool_calls: response.message.tool_calls,
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    /// Stream progressively larger snapshots of one schema-constrained
    /// object. Each received value replaces the previous snapshot; the last
    /// one is the final object.
    async fn stream_object(&self, request: ObjectRequest) -> std::result::Result<StreamReceiver<serde_json::Value>, ProviderError>;

    /// Stream the completed elements of a schema-constrained array, one
    /// value per element, in order. Finite and not restartable.
    async fn stream_elements(&self, request: ObjectRequest) -> std::result::Result<StreamReceiver<serde_json::Value>, ProviderError>;

    /// Generate one schema-constrained object, waiting for the final
    /// snapshot. Default implementation drains `stream_object`.
    async fn generate_object(&self, request: ObjectRequest) -> std::result::Result<serde_json::Value, ProviderError> {
        let mut rx = self.stream_object(request).await?;
        let mut last = None;
        while let Some(item) = rx.recv().await {
            last = Some(item?);
        }
        last.ok_or_else(|| ProviderError::InvalidObject("empty object stream".into()))
    }
}
