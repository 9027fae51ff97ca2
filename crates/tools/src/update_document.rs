//! Revise an existing document from a change description.
//!
//! A revision is a new version keyed by the same id with a later timestamp;
//! the regenerated body fully replaces the previous one. A lookup miss and
//! an ownership mismatch produce the same answer so the tool does not leak
//! which documents exist.

use async_trait::async_trait;
use avacyn_core::document::{Document, DocumentKind};
use avacyn_core::error::ToolError;
use avacyn_core::tool::{Tool, ToolResult};
use tracing::info;

use crate::draft::{generate_code, generate_text, DocumentDraft};
use crate::prompts::update_document_prompt;
use crate::TurnContext;

pub struct UpdateDocumentTool {
    ctx: TurnContext,
}

impl UpdateDocumentTool {
    pub fn new(ctx: TurnContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for UpdateDocumentTool {
    fn name(&self) -> &str {
        "updateDocument"
    }

    fn description(&self) -> &str {
        "Mettre à jour un document avec la description donnée"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": {
                    "type": "string",
                    "description": "L'ID du document à mettre à jour"
                },
                "description": {
                    "type": "string",
                    "description": "La description des modifications à apporter"
                }
            },
            "required": ["id", "description"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let id = arguments["id"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'id' argument".into()))?;
        let description = arguments["description"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'description' argument".into()))?;

        let document = self
            .ctx
            .store
            .get_document(id)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "updateDocument".into(),
                reason: e.to_string(),
            })?;

        let document = match document {
            Some(d) if d.user_id == self.ctx.user_id => d,
            _ => {
                return Ok(ToolResult::new(
                    String::new(),
                    serde_json::json!({"error": "Document non trouvé"}),
                ));
            }
        };

        info!(document_id = %document.id, kind = %document.kind.as_str(), "Updating document");

        let mut draft = DocumentDraft::resume(
            document.id.clone(),
            document.title.clone(),
            document.kind,
            self.ctx.events.clone(),
        )
        .await;

        let provider = self.ctx.provider.as_ref();
        let model = &self.ctx.model;
        let system = update_document_prompt(&document.content);
        let generation = match document.kind {
            DocumentKind::Text | DocumentKind::Search => {
                generate_text(&mut draft, provider, model, &system, description).await
            }
            DocumentKind::Code => {
                generate_code(&mut draft, provider, model, &system, description).await
            }
        };
        generation.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "updateDocument".into(),
            reason: e.to_string(),
        })?;

        draft.finish().await;

        let revision = Document {
            id: document.id.clone(),
            created_at: chrono::Utc::now(),
            title: document.title.clone(),
            kind: document.kind,
            content: draft.content().to_string(),
            user_id: document.user_id.clone(),
        };
        self.ctx
            .store
            .save_document(&revision)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "updateDocument".into(),
                reason: e.to_string(),
            })?;

        Ok(ToolResult::new(
            String::new(),
            serde_json::json!({
                "id": document.id,
                "title": document.title,
                "kind": document.kind,
                "content": "Le document a été mis à jour avec succès.",
            }),
        ))
    }
}
