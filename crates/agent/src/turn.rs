//! The chat turn orchestrator.
//!
//! One turn takes the client's message history, runs the model with the
//! built-in tools for up to a fixed number of steps, mirrors everything
//! onto the turn's event stream, and writes the surviving messages back.
//! Once the stream has started, provider and persistence failures are
//! logged and swallowed; the turn still ends with a finish event and
//! whatever completed is written back.

use std::sync::Arc;

use avacyn_core::chat::Chat;
use avacyn_core::message::{Message, Role};
use avacyn_core::provider::{Provider, ProviderRequest};
use avacyn_core::stream::{MessageAnnotation, StreamEvent};
use avacyn_core::tool::{ToolCall, ToolRegistry};
use avacyn_storage::SqliteStore;
use chrono::Utc;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::prompts::{self, TITLE_PROMPT};

/// Find the message the turn responds to.
pub fn most_recent_user_message(messages: &[Message]) -> Option<&Message> {
    messages.iter().rev().find(|m| m.role == Role::User)
}

pub struct TurnRunner {
    provider: Arc<dyn Provider>,
    store: Arc<SqliteStore>,
    tools: ToolRegistry,
    events: Sender<StreamEvent>,
    model: String,
    title_model: String,
    temperature: f32,
    max_steps: u32,
}

impl TurnRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<SqliteStore>,
        tools: ToolRegistry,
        events: Sender<StreamEvent>,
        model: impl Into<String>,
        title_model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            tools,
            events,
            model: model.into(),
            title_model: title_model.into(),
            temperature: 0.7,
            max_steps: 5,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap the number of model calls per turn.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Run one turn over the client's message history. The history must end
    /// in (or at least contain) a user message.
    pub async fn run(
        &self,
        chat_id: &str,
        user_id: &str,
        history: Vec<Message>,
    ) -> Result<(), avacyn_core::Error> {
        let user_message = most_recent_user_message(&history)
            .cloned()
            .ok_or_else(|| avacyn_core::Error::Internal("no user message in request".into()))?;

        info!(chat_id, messages = history.len(), "Running chat turn");

        if self.store.get_chat(chat_id).await?.is_none() {
            let title = self.generate_title(&user_message.content).await;
            self.store
                .save_chat(&Chat {
                    id: chat_id.to_string(),
                    user_id: user_id.to_string(),
                    title,
                    created_at: Utc::now(),
                })
                .await?;
        }

        // The user message gets a server-side id; the client learns it
        // through the first stream event.
        let mut stored_user = user_message;
        stored_user.id = Uuid::new_v4().to_string();
        self.store
            .save_messages(chat_id, std::slice::from_ref(&stored_user))
            .await?;
        let _ = self
            .events
            .send(StreamEvent::UserMessageId {
                content: stored_user.id.clone(),
            })
            .await;

        let definitions = self.tools.definitions();
        let mut conversation = Vec::with_capacity(history.len() + 1);
        conversation.push(Message::system(prompts::system_prompt()));
        conversation.extend(history);

        let mut response_messages: Vec<Message> = Vec::new();

        for step in 1..=self.max_steps {
            debug!(chat_id, step, "Turn step");

            let mut rx = match self
                .provider
                .stream(ProviderRequest {
                    model: self.model.clone(),
                    messages: conversation.clone(),
                    temperature: self.temperature,
                    max_tokens: None,
                    tools: definitions.clone(),
                })
                .await
            {
                Ok(rx) => rx,
                Err(e) => {
                    error!(chat_id, step, error = %e, "Model stream failed");
                    break;
                }
            };

            let mut content = String::new();
            let mut tool_calls = Vec::new();
            let mut interrupted = false;
            while let Some(chunk) = rx.recv().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        error!(chat_id, step, error = %e, "Model stream interrupted");
                        interrupted = true;
                        break;
                    }
                };
                if let Some(delta) = chunk.content {
                    if !delta.is_empty() {
                        content.push_str(&delta);
                        let _ = self.events.send(StreamEvent::text_delta(&delta)).await;
                    }
                }
                tool_calls.extend(chunk.tool_calls);
            }

            let mut assistant = Message::assistant(content);
            assistant.tool_calls = tool_calls.clone();
            conversation.push(assistant.clone());
            response_messages.push(assistant);

            if interrupted || tool_calls.is_empty() {
                break;
            }
            if step == self.max_steps {
                warn!(chat_id, steps = step, "Turn step budget exhausted");
                break;
            }

            for call in &tool_calls {
                let request = ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: serde_json::from_str(&call.arguments).unwrap_or_default(),
                };
                let output = match self.tools.execute(&request).await {
                    Ok(result) => result.output,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool execution failed");
                        serde_json::json!({"error": e.to_string()})
                    }
                };
                let result_message = Message::tool_result(&call.id, output.to_string());
                conversation.push(result_message.clone());
                response_messages.push(result_message);
            }
        }

        let _ = self.events.send(StreamEvent::Finish).await;

        let sanitized = sanitize_response_messages(response_messages);
        if let Err(e) = self.store.save_messages(chat_id, &sanitized).await {
            error!(chat_id, error = %e, "Failed to persist response messages");
        }
        for message in sanitized.iter().filter(|m| m.role == Role::Assistant) {
            let _ = self
                .events
                .send(StreamEvent::MessageAnnotation {
                    content: MessageAnnotation {
                        message_id_from_server: message.id.clone(),
                    },
                })
                .await;
        }

        Ok(())
    }

    async fn generate_title(&self, excerpt: &str) -> String {
        match self
            .provider
            .complete(ProviderRequest::prompted(
                &self.title_model,
                TITLE_PROMPT,
                excerpt,
            ))
            .await
        {
            Ok(response) if !response.message.content.trim().is_empty() => {
                response.message.content.trim().to_string()
            }
            Ok(_) => fallback_title(excerpt),
            Err(e) => {
                warn!(error = %e, "Title generation failed");
                fallback_title(excerpt)
            }
        }
    }
}

/// Drop response messages a client could never resume from: assistant
/// messages whose tool calls were never answered, and assistant messages
/// with neither content nor tool calls.
fn sanitize_response_messages(messages: Vec<Message>) -> Vec<Message> {
    let answered: Vec<String> = messages
        .iter()
        .filter_map(|m| m.tool_call_id.clone())
        .collect();
    messages
        .into_iter()
        .filter(|m| match m.role {
            Role::Assistant => {
                !m.has_dangling_tool_calls(&answered)
                    && (!m.content.is_empty() || !m.tool_calls.is_empty())
            }
            _ => true,
        })
        .collect()
}

fn fallback_title(excerpt: &str) -> String {
    let title: String = excerpt.chars().take(80).collect();
    let title = title.trim();
    if title.is_empty() {
        "Nouvelle discussion".to_string()
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use avacyn_core::error::ToolError;
    use avacyn_core::tool::{Tool, ToolResult};
    use avacyn_providers::MockProvider;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the arguments back"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::new("", arguments))
        }
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry
    }

    async fn runner(
        provider: MockProvider,
        tools: ToolRegistry,
    ) -> (
        TurnRunner,
        Arc<SqliteStore>,
        tokio::sync::mpsc::Receiver<StreamEvent>,
    ) {
        let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
        let (tx, rx) = tokio::sync::mpsc::channel(256);
        let runner = TurnRunner::new(
            Arc::new(provider),
            store.clone(),
            tools,
            tx,
            "gpt-4o",
            "gpt-4o-mini",
        );
        (runner, store, rx)
    }

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn text_only_turn_streams_and_persists() {
        let provider = MockProvider::new();
        provider.push_text("Un haïku sur la pluie"); // title
        provider.push_text("La pluie tombe doucement");

        let (runner, store, mut rx) = runner(provider, echo_registry()).await;
        runner
            .run("c1", "u1", vec![Message::user("Écris un haïku sur la pluie")])
            .await
            .unwrap();

        let chat = store.get_chat("c1").await.unwrap().unwrap();
        assert_eq!(chat.title, "Un haïku sur la pluie");
        assert_eq!(chat.user_id, "u1");

        let messages = store.get_messages_by_chat("c1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "La pluie tombe doucement");

        let events = drain(&mut rx);
        assert_eq!(events[0].event_type(), "user-message-id");
        assert!(events.iter().any(|e| e.event_type() == "text-delta"));
        assert!(events.iter().any(|e| e.event_type() == "finish"));
        assert_eq!(
            events.last().unwrap().event_type(),
            "message-annotation"
        );
    }

    #[tokio::test]
    async fn tool_call_round_trip() {
        let provider = MockProvider::new();
        provider.push_text("Titre"); // title
        provider.push_tool_call("echo", serde_json::json!({"ping": true}));
        provider.push_text("Pong reçu");

        let (runner, store, _rx) = runner(provider, echo_registry()).await;
        runner
            .run("c1", "u1", vec![Message::user("ping")])
            .await
            .unwrap();

        let messages = store.get_messages_by_chat("c1").await.unwrap();
        // user, assistant(tool call), tool result, final assistant
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].tool_calls[0].name, "echo");
        assert_eq!(messages[2].role, Role::Tool);
        assert!(messages[2].content.contains("ping"));
        assert_eq!(messages[3].content, "Pong reçu");
    }

    #[tokio::test]
    async fn tool_failure_is_folded_back_to_the_model() {
        let provider = MockProvider::new();
        provider.push_text("Titre");
        provider.push_tool_call("inconnu", serde_json::json!({}));
        provider.push_text("Désolé, je ne peux pas.");

        let (runner, store, _rx) = runner(provider, echo_registry()).await;
        runner
            .run("c1", "u1", vec![Message::user("fais un truc")])
            .await
            .unwrap();

        let messages = store.get_messages_by_chat("c1").await.unwrap();
        assert_eq!(messages[2].role, Role::Tool);
        assert!(messages[2].content.contains("error"));
        assert_eq!(messages[3].content, "Désolé, je ne peux pas.");
    }

    #[tokio::test]
    async fn step_budget_drops_dangling_tool_calls() {
        let provider = MockProvider::new();
        provider.push_text("Titre");
        provider.push_tool_call("echo", serde_json::json!({"n": 1}));
        provider.push_tool_call("echo", serde_json::json!({"n": 2}));

        let (runner, store, _rx) = runner(provider, echo_registry()).await;
        let runner = runner.with_max_steps(2);
        runner
            .run("c1", "u1", vec![Message::user("boucle")])
            .await
            .unwrap();

        // The second assistant message's tool call was never answered, so
        // it must not be persisted.
        let messages = store.get_messages_by_chat("c1").await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].tool_calls[0].arguments, "{\"n\":1}");
        assert_eq!(messages[2].role, Role::Tool);
    }

    #[tokio::test]
    async fn midstream_failure_still_finishes_the_turn() {
        let provider = MockProvider::new();
        provider.push_text("Titre");
        provider.push_turn(avacyn_providers::ScriptedTurn::Error(
            avacyn_core::error::ProviderError::StreamInterrupted("connection reset".into()),
        ));

        let (runner, store, mut rx) = runner(provider, echo_registry()).await;
        runner
            .run("c1", "u1", vec![Message::user("bonjour")])
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| e.event_type() == "finish"));

        // The empty assistant is dropped; the user message survives.
        let messages = store.get_messages_by_chat("c1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn existing_chat_skips_title_generation() {
        let provider = MockProvider::new();
        provider.push_text("Réponse");

        let (runner, store, _rx) = runner(provider, echo_registry()).await;
        store
            .save_chat(&Chat {
                id: "c1".into(),
                user_id: "u1".into(),
                title: "Déjà là".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        runner
            .run("c1", "u1", vec![Message::user("suite")])
            .await
            .unwrap();

        let chat = store.get_chat("c1").await.unwrap().unwrap();
        assert_eq!(chat.title, "Déjà là");
    }

    #[tokio::test]
    async fn missing_user_message_is_an_error() {
        let provider = MockProvider::new();
        let (runner, _store, _rx) = runner(provider, echo_registry()).await;
        let err = runner
            .run("c1", "u1", vec![Message::system("rien")])
            .await
            .unwrap_err();
        assert!(matches!(err, avacyn_core::Error::Internal(_)));
    }

    #[test]
    fn fallback_title_truncates_long_excerpts() {
        let excerpt = "x".repeat(200);
        assert_eq!(fallback_title(&excerpt).chars().count(), 80);
        assert_eq!(fallback_title("   "), "Nouvelle discussion");
    }
}
