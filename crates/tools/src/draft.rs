//! Document draft lifecycle.
//!
//! A draft is the in-flight state of one document generation: it owns the
//! accumulated body and mirrors every change onto the turn's event stream.
//! Text and search drafts grow by appended fragments; code drafts are
//! replaced wholesale from each object snapshot.

use avacyn_core::document::DocumentKind;
use avacyn_core::error::ProviderError;
use avacyn_core::provider::{ObjectRequest, Provider, ProviderRequest};
use avacyn_core::stream::StreamEvent;
use tokio::sync::mpsc::Sender;

pub struct DocumentDraft {
    pub id: String,
    pub title: String,
    pub kind: DocumentKind,
    content: String,
    events: Sender<StreamEvent>,
}

impl DocumentDraft {
    /// Open a fresh draft, announcing id, title, kind, and a clear to the
    /// client before any content flows.
    pub async fn open(
        id: String,
        title: String,
        kind: DocumentKind,
        events: Sender<StreamEvent>,
    ) -> Self {
        let _ = events.send(StreamEvent::Id { content: id.clone() }).await;
        let _ = events
            .send(StreamEvent::Title {
                content: title.clone(),
            })
            .await;
        let _ = events.send(StreamEvent::Kind { content: kind }).await;
        let _ = events
            .send(StreamEvent::Clear {
                content: String::new(),
            })
            .await;
        Self {
            id,
            title,
            kind,
            content: String::new(),
            events,
        }
    }

    /// Reopen an existing document for revision. The clear event carries the
    /// title so the client can re-label while wiping its view.
    pub async fn resume(
        id: String,
        title: String,
        kind: DocumentKind,
        events: Sender<StreamEvent>,
    ) -> Self {
        let _ = events
            .send(StreamEvent::Clear {
                content: title.clone(),
            })
            .await;
        Self {
            id,
            title,
            kind,
            content: String::new(),
            events,
        }
    }

    /// Append a streamed text fragment.
    pub async fn append_text(&mut self, delta: &str) {
        self.content.push_str(delta);
        let _ = self.events.send(StreamEvent::text_delta(delta)).await;
    }

    /// Replace the whole body with a new code snapshot.
    pub async fn replace_code(&mut self, code: &str) {
        self.content = code.to_string();
        let _ = self.events.send(StreamEvent::code_delta(code)).await;
    }

    /// Mark the draft complete.
    pub async fn finish(&self) {
        let _ = self.events.send(StreamEvent::Finish).await;
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Stream prose into a draft, fragment by fragment.
pub async fn generate_text(
    draft: &mut DocumentDraft,
    provider: &dyn Provider,
    model: &str,
    system: &str,
    prompt: &str,
) -> Result<(), ProviderError> {
    let mut rx = provider
        .stream(ProviderRequest::prompted(model, system, prompt))
        .await?;
    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        if let Some(delta) = chunk.content {
            if !delta.is_empty() {
                draft.append_text(&delta).await;
            }
        }
    }
    Ok(())
}

/// Stream code into a draft via schema-constrained object snapshots. Each
/// snapshot's `code` field replaces the body; the last one is final.
pub async fn generate_code(
    draft: &mut DocumentDraft,
    provider: &dyn Provider,
    model: &str,
    system: &str,
    prompt: &str,
) -> Result<(), ProviderError> {
    let mut rx = provider
        .stream_object(ObjectRequest {
            model: model.to_string(),
            system: system.to_string(),
            prompt: prompt.to_string(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "code": { "type": "string" }
                },
                "required": ["code"]
            }),
        })
        .await?;
    while let Some(snapshot) = rx.recv().await {
        let snapshot = snapshot?;
        if let Some(code) = snapshot.get("code").and_then(|c| c.as_str()) {
            if !code.is_empty() {
                draft.replace_code(code).await;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avacyn_providers::MockProvider;

    async fn drain(rx: &mut tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn open_announces_draft_before_content() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let draft =
            DocumentDraft::open("d1".into(), "Essai".into(), DocumentKind::Text, tx).await;
        assert_eq!(draft.content(), "");

        let events = drain(&mut rx).await;
        let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["id", "title", "kind", "clear"]);
    }

    #[tokio::test]
    async fn resume_clears_with_title() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        DocumentDraft::resume("d1".into(), "Essai".into(), DocumentKind::Text, tx).await;

        let events = drain(&mut rx).await;
        assert_eq!(events.len(), 1);
        assert!(
            matches!(&events[0], StreamEvent::Clear { content } if content == "Essai")
        );
    }

    #[tokio::test]
    async fn text_generation_appends_fragments() {
        let provider = MockProvider::new();
        provider.push_text("La mer est calme ce soir");

        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let mut draft =
            DocumentDraft::open("d1".into(), "La mer".into(), DocumentKind::Text, tx).await;
        generate_text(&mut draft, &provider, "m", "sys", "La mer")
            .await
            .unwrap();
        draft.finish().await;

        assert_eq!(draft.content(), "La mer est calme ce soir");
        let events = drain(&mut rx).await;
        let deltas = events
            .iter()
            .filter(|e| e.event_type() == "text-delta")
            .count();
        assert!(deltas > 1, "text should stream in multiple fragments");
        assert_eq!(events.last().unwrap().event_type(), "finish");
    }

    #[tokio::test]
    async fn code_generation_replaces_snapshots() {
        let provider = MockProvider::new();
        provider.push_object_snapshots(vec![
            serde_json::json!({"code": "print("}),
            serde_json::json!({"code": "print('bonjour')"}),
        ]);

        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let mut draft =
            DocumentDraft::open("d1".into(), "Salutation".into(), DocumentKind::Code, tx).await;
        generate_code(&mut draft, &provider, "m", "sys", "Salutation")
            .await
            .unwrap();

        // The body is the last snapshot, not a concatenation.
        assert_eq!(draft.content(), "print('bonjour')");
        let events = drain(&mut rx).await;
        let code_deltas: Vec<_> = events
            .iter()
            .filter(|e| e.event_type() == "code-delta")
            .collect();
        assert_eq!(code_deltas.len(), 2);
    }

    #[tokio::test]
    async fn empty_code_snapshot_is_skipped() {
        let provider = MockProvider::new();
        provider.push_object_snapshots(vec![
            serde_json::json!({}),
            serde_json::json!({"code": ""}),
            serde_json::json!({"code": "x = 1"}),
        ]);

        let (tx, _rx) = tokio::sync::mpsc::channel(64);
        let mut draft =
            DocumentDraft::open("d1".into(), "x".into(), DocumentKind::Code, tx).await;
        generate_code(&mut draft, &provider, "m", "sys", "x")
            .await
            .unwrap();
        assert_eq!(draft.content(), "x = 1");
    }
}
