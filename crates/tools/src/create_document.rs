//! Create a document as a side channel of the chat turn.
//!
//! The generated body streams to the client over the turn's event channel;
//! the tool result itself only tells the model the document now exists, so
//! the model does not echo the content back into the conversation.

use async_trait::async_trait;
use avacyn_core::document::{Document, DocumentKind};
use avacyn_core::error::ToolError;
use avacyn_core::tool::{Tool, ToolResult};
use tracing::info;

use crate::draft::{generate_code, generate_text, DocumentDraft};
use crate::prompts::{CODE_PROMPT, SEARCH_WRITER_PROMPT, TEXT_WRITER_PROMPT};
use crate::TurnContext;

pub struct CreateDocumentTool {
    ctx: TurnContext,
}

impl CreateDocumentTool {
    pub fn new(ctx: TurnContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for CreateDocumentTool {
    fn name(&self) -> &str {
        "createDocument"
    }

    fn description(&self) -> &str {
        "Créer un document pour une activité d'écriture."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "kind": {
                    "type": "string",
                    "enum": ["text", "code", "search"]
                }
            },
            "required": ["title", "kind"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let title = arguments["title"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'title' argument".into()))?
            .to_string();
        let kind: DocumentKind = arguments["kind"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'kind' argument".into()))?
            .parse()
            .map_err(|e: String| ToolError::InvalidArguments(e))?;

        let id = uuid::Uuid::new_v4().to_string();
        info!(document_id = %id, %title, kind = %kind.as_str(), "Creating document");

        let mut draft =
            DocumentDraft::open(id.clone(), title.clone(), kind, self.ctx.events.clone()).await;

        let provider = self.ctx.provider.as_ref();
        let model = &self.ctx.model;
        let generation = match kind {
            DocumentKind::Text => {
                generate_text(&mut draft, provider, model, TEXT_WRITER_PROMPT, &title).await
            }
            DocumentKind::Code => {
                generate_code(&mut draft, provider, model, CODE_PROMPT, &title).await
            }
            DocumentKind::Search => {
                let findings = self
                    .ctx
                    .search
                    .complete_search(provider, model, &title)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed {
                        tool_name: "createDocument".into(),
                        reason: e.to_string(),
                    })?;
                generate_text(&mut draft, provider, model, SEARCH_WRITER_PROMPT, &findings).await
            }
        };
        generation.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "createDocument".into(),
            reason: e.to_string(),
        })?;

        draft.finish().await;

        let document = Document {
            id: id.clone(),
            created_at: chrono::Utc::now(),
            title: title.clone(),
            kind,
            content: draft.content().to_string(),
            user_id: self.ctx.user_id.clone(),
        };
        self.ctx
            .store
            .save_document(&document)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "createDocument".into(),
                reason: e.to_string(),
            })?;

        Ok(ToolResult::new(
            String::new(),
            serde_json::json!({
                "id": id,
                "title": title,
                "kind": kind,
                "content": "Un document a été créé et est maintenant visible à l'utilisateur.",
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SearchClient;
    use avacyn_core::stream::StreamEvent;
    use avacyn_providers::MockProvider;
    use avacyn_storage::SqliteStore;
    use std::sync::Arc;

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

    #[tokio::test]
    async fn creates_and_persists_a_text_document() {
        let provider = MockProvider::new();
        provider.push_text("Un essai sur la mer.");
        let (ctx, mut rx) = context(provider).await;

        let tool = CreateDocumentTool::new(ctx.clone());
        let result = tool
            .execute(serde_json::json!({"title": "La mer", "kind": "text"}))
            .await
            .unwrap();

        assert_eq!(
            result.output["content"],
            "Un document a été créé et est maintenant visible à l'utilisateur."
        );
        let id = result.output["id"].as_str().unwrap();
        let saved = ctx.store.get_document(id).await.unwrap().unwrap();
        assert_eq!(saved.title, "La mer");
        assert_eq!(saved.content, "Un essai sur la mer.");
        assert_eq!(saved.user_id, "u1");

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert_eq!(&types[..4], &["id", "title", "kind", "clear"]);
        assert_eq!(*types.last().unwrap(), "finish");
    }

    #[tokio::test]
    async fn creates_a_code_document_from_snapshots() {
        let provider = MockProvider::new();
        provider.push_object_snapshots(vec![
            serde_json::json!({"code": "print("}),
            serde_json::json!({"code": "print('bonjour')"}),
        ]);
        let (ctx, _rx) = context(provider).await;

        let tool = CreateDocumentTool::new(ctx.clone());
        let result = tool
            .execute(serde_json::json!({"title": "Salutation", "kind": "code"}))
            .await
            .unwrap();

        let id = result.output["id"].as_str().unwrap();
        let saved = ctx.store.get_document(id).await.unwrap().unwrap();
        assert_eq!(saved.kind, DocumentKind::Code);
        assert_eq!(saved.content, "print('bonjour')");
    }

    #[tokio::test]
    async fn unknown_kind_rejected() {
        let (ctx, _rx) = context(MockProvider::new()).await;
        let tool = CreateDocumentTool::new(ctx);
        let err = tool
            .execute(serde_json::json!({"title": "x", "kind": "image"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
