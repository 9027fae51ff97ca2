//! The chat surface: streaming turns over SSE, and chat deletion.

use std::convert::Infallible;
use std::time::Duration;

use avacyn_agent::{most_recent_user_message, TurnRunner};
use avacyn_core::message::{Message, Role};
use avacyn_core::stream::StreamEvent;
use avacyn_tools::{turn_registry, TurnContext};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::auth::current_user;
use crate::{api_error, ApiError, SharedState};

#[derive(Deserialize)]
pub struct ChatRequest {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(rename = "modelId", default)]
    pub model_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

fn to_core_messages(messages: &[ChatMessage]) -> Result<Vec<Message>, ApiError> {
    messages
        .iter()
        .map(|m| {
            let role: Role = m
                .role
                .parse()
                .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;
            Ok(match role {
                Role::User => Message::user(&m.content),
                Role::Assistant => Message::assistant(&m.content),
                Role::System => Message::system(&m.content),
                Role::Tool => Message::tool_result("", &m.content),
            })
        })
        .collect()
}

/// `POST /api/chat` — run one turn, streaming events over SSE.
pub async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(payload): axum::Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    if let Some(model_id) = payload.model_id.as_deref() {
        if !state.config.models.is_known(model_id) {
            return Err(api_error(StatusCode::NOT_FOUND, "Model not found"));
        }
    }

    let history = to_core_messages(&payload.messages)?;
    if most_recent_user_message(&history).is_none() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No user message found"));
    }

    info!(chat_id = %payload.id, messages = history.len(), "Chat turn request");

    let chat_model = state
        .config
        .models
        .resolve_chat(payload.model_id.as_deref())
        .to_string();

    let (tx, rx) = tokio::sync::mpsc::channel(256);
    let ctx = TurnContext {
        provider: state.provider.clone(),
        store: state.store.clone(),
        search: state.search.clone(),
        user_id: user_id.clone(),
        model: state.config.models.artifact.clone(),
        events: tx.clone(),
    };
    let runner = TurnRunner::new(
        state.provider.clone(),
        state.store.clone(),
        turn_registry(&ctx),
        tx.clone(),
        chat_model,
        state.config.models.title.clone(),
    )
    .with_temperature(state.config.default_temperature)
    .with_max_steps(state.config.turn.max_steps);

    let ceiling = Duration::from_secs(state.config.turn.timeout_secs);
    let chat_id = payload.id.clone();
    let finish_tx = tx.clone();
    tokio::spawn(async move {
        match tokio::time::timeout(ceiling, runner.run(&chat_id, &user_id, history)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(chat_id = %chat_id, error = %e, "Chat turn failed");
                let _ = finish_tx.send(StreamEvent::Finish).await;
            }
            Err(_) => {
                warn!(chat_id = %chat_id, "Chat turn timed out");
                let _ = finish_tx.send(StreamEvent::Finish).await;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });
    Ok(Sse::new(stream))
}

/// `GET /api/history` — the caller's chats, newest first.
pub async fn history_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<axum::Json<Vec<avacyn_core::chat::Chat>>, ApiError> {
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;
    let chats = state
        .store
        .list_chats_by_user(&user_id)
        .await
        .map_err(crate::storage_error)?;
    Ok(axum::Json(chats))
}

#[derive(Deserialize)]
pub struct DeleteChatParams {
    #[serde(default)]
    pub id: Option<String>,
}

/// `DELETE /api/chat?id=` — delete an owned chat and everything under it.
pub async fn delete_chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<DeleteChatParams>,
) -> Result<String, ApiError> {
    let Some(id) = params.id else {
        return Err(api_error(StatusCode::NOT_FOUND, "Not Found"));
    };
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    let chat = state
        .store
        .get_chat(&id)
        .await
        .map_err(crate::storage_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Not Found"))?;
    if chat.user_id != user_id {
        return Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }

    state
        .store
        .delete_chat(&id)
        .await
        .map_err(crate::storage_error)?;
    Ok("Chat deleted".to_string())
}
