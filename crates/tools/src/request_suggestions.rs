//! Generate writing suggestions for a document.
//!
//! Suggestions stream to the client one by one as the model completes each
//! element, then the whole batch is persisted against the document version
//! it was generated from. At most five are kept.

use async_trait::async_trait;
use avacyn_core::document::Suggestion;
use avacyn_core::error::ToolError;
use avacyn_core::stream::StreamEvent;
use avacyn_core::tool::{Tool, ToolResult};
use avacyn_core::provider::ObjectRequest;
use tracing::info;

use crate::prompts::SUGGESTIONS_PROMPT;
use crate::TurnContext;

const MAX_SUGGESTIONS: usize = 5;

pub struct RequestSuggestionsTool {
    ctx: TurnContext,
}

impl RequestSuggestionsTool {
    pub fn new(ctx: TurnContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for RequestSuggestionsTool {
    fn name(&self) -> &str {
        "requestSuggestions"
    }

    fn description(&self) -> &str {
        "Demander des suggestions pour un document"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "documentId": {
                    "type": "string",
                    "description": "L'ID du document pour lequel des suggestions sont demandées"
                }
            },
            "required": ["documentId"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let document_id = arguments["documentId"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'documentId' argument".into()))?;

        let document = self
            .ctx
            .store
            .get_document(document_id)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "requestSuggestions".into(),
                reason: e.to_string(),
            })?;

        let document = match document {
            Some(d) if d.user_id == self.ctx.user_id && !d.content.is_empty() => d,
            _ => {
                return Ok(ToolResult::new(
                    String::new(),
                    serde_json::json!({"error": "Document non trouvé"}),
                ));
            }
        };

        let mut rx = self
            .ctx
            .provider
            .stream_elements(ObjectRequest {
                model: self.ctx.model.clone(),
                system: SUGGESTIONS_PROMPT.to_string(),
                prompt: document.content.clone(),
                schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "originalSentence": {
                            "type": "string",
                            "description": "La phrase originale"
                        },
                        "suggestedSentence": {
                            "type": "string",
                            "description": "La phrase suggérée"
                        },
                        "description": {
                            "type": "string",
                            "description": "La description de la suggestion"
                        }
                    },
                    "required": ["originalSentence", "suggestedSentence", "description"]
                }),
            })
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "requestSuggestions".into(),
                reason: e.to_string(),
            })?;

        let mut suggestions = Vec::new();
        while let Some(element) = rx.recv().await {
            let element = element.map_err(|e| ToolError::ExecutionFailed {
                tool_name: "requestSuggestions".into(),
                reason: e.to_string(),
            })?;
            let (Some(original), Some(suggested)) = (
                element["originalSentence"].as_str(),
                element["suggestedSentence"].as_str(),
            ) else {
                continue;
            };

            let suggestion = Suggestion {
                id: uuid::Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                document_created_at: document.created_at,
                original_text: original.to_string(),
                suggested_text: suggested.to_string(),
                description: element["description"].as_str().unwrap_or_default().to_string(),
                is_resolved: false,
                user_id: self.ctx.user_id.clone(),
                created_at: chrono::Utc::now(),
            };
            let _ = self
                .ctx
                .events
                .send(StreamEvent::Suggestion {
                    content: suggestion.clone(),
                })
                .await;
            suggestions.push(suggestion);
            if suggestions.len() >= MAX_SUGGESTIONS {
                break;
            }
        }

        info!(document_id = %document.id, count = suggestions.len(), "Saving suggestions");
        self.ctx
            .store
            .save_suggestions(&suggestions)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "requestSuggestions".into(),
                reason: e.to_string(),
            })?;

        Ok(ToolResult::new(
            String::new(),
            serde_json::json!({
                "id": document.id,
                "title": document.title,
                "kind": document.kind,
                "message": "Des suggestions ont été ajoutées au document",
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SearchClient;
    use avacyn_core::document::{Document, DocumentKind};
    use avacyn_providers::MockProvider;
    use avacyn_storage::SqliteStore;
    use std::sync::Arc;

    fn element(n: usize) -> serde_json::Value {
        serde_json::json!({
            "originalSentence": format!("phrase {n}"),
            "suggestedSentence": format!("meilleure phrase {n}"),
            "description": format!("raison {n}"),
        })
    }

    async fn context(
        provider: MockProvider,
    ) -> (TurnContext, tokio::sync::mpsc::Receiver<StreamEvent>) {
        let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
        let (tx, rx) = tokio::sync::mpsc::channel(256);
        (
            TurnContext {
                provider: Arc::new(provider),
                store,
                search: SearchClient::unconfigured(),
                user_id: "u1".into(),
                model: "m".into(),
                events: tx,
            },
            rx,
        )
    }

    async fn seed_document(ctx: &TurnContext) -> Document {
        let document = Document {
            id: "d1".into(),
            created_at: chrono::Utc::now(),
            title: "Essai".into(),
            kind: DocumentKind::Text,
            content: "Il était une fois.".into(),
            user_id: "u1".into(),
        };
        ctx.store.save_document(&document).await.unwrap();
        document
    }

    #[tokio::test]
    async fn streams_and_persists_suggestions() {
        let provider = MockProvider::new();
        provider.push_elements(vec![element(1), element(2)]);
        let (ctx, mut rx) = context(provider).await;
        let document = seed_document(&ctx).await;

        let tool = RequestSuggestionsTool::new(ctx.clone());
        let result = tool
            .execute(serde_json::json!({"documentId": "d1"}))
            .await
            .unwrap();
        assert_eq!(
            result.output["message"],
            "Des suggestions ont été ajoutées au document"
        );

        let saved = ctx.store.get_suggestions_by_document("d1").await.unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].document_created_at, document.created_at);
        assert!(!saved[0].is_resolved);

        let mut streamed = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, StreamEvent::Suggestion { .. }) {
                streamed += 1;
            }
        }
        assert_eq!(streamed, 2);
    }

    #[tokio::test]
    async fn caps_suggestions_at_five() {
        let provider = MockProvider::new();
        provider.push_elements((1..=8).map(element).collect());
        let (ctx, _rx) = context(provider).await;
        seed_document(&ctx).await;

        let tool = RequestSuggestionsTool::new(ctx.clone());
        tool.execute(serde_json::json!({"documentId": "d1"}))
            .await
            .unwrap();

        let saved = ctx.store.get_suggestions_by_document("d1").await.unwrap();
        assert_eq!(saved.len(), 5);
    }

    #[tokio::test]
    async fn missing_document_reports_not_found() {
        let (ctx, _rx) = context(MockProvider::new()).await;
        let tool = RequestSuggestionsTool::new(ctx);
        let result = tool
            .execute(serde_json::json!({"documentId": "nope"}))
            .await
            .unwrap();
        assert_eq!(result.output["error"], "Document non trouvé");
    }
}
