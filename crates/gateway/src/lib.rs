//! HTTP gateway for Avacyn.
//!
//! Exposes the chat turn as an SSE stream plus the document, suggestion,
//! vote, tool, agent, and execution surfaces. Authentication is a bearer
//! session token resolved against an in-memory session store.
//!
//! Built on Axum.

pub mod auth;
pub mod chat;
pub mod documents;
pub mod records;
pub mod vote;

use std::sync::Arc;

use avacyn_config::AppConfig;
use avacyn_core::provider::Provider;
use avacyn_storage::SqliteStore;
use avacyn_tools::SearchClient;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application state for the gateway.
pub struct AppState {
    pub provider: Arc<dyn Provider>,
    pub store: Arc<SqliteStore>,
    pub search: SearchClient,
    pub config: AppConfig,
    pub sessions: auth::SessionStore,
}

pub type SharedState = Arc<AppState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/session", post(auth::create_session_handler))
        .route(
            "/api/chat",
            post(chat::chat_handler).delete(chat::delete_chat_handler),
        )
        .route("/api/history", get(chat::history_handler))
        .route(
            "/api/document",
            get(documents::get_document_handler)
                .post(documents::save_document_handler)
                .patch(documents::rollback_document_handler),
        )
        .route("/api/suggestions", get(documents::get_suggestions_handler))
        .route(
            "/api/vote",
            get(vote::get_votes_handler).patch(vote::vote_handler),
        )
        .route(
            "/api/tools",
            post(records::create_tool_handler).get(records::list_tools_handler),
        )
        .route(
            "/api/tools/{id}",
            get(records::get_tool_handler)
                .patch(records::update_tool_handler)
                .delete(records::delete_tool_handler),
        )
        .route(
            "/api/agents",
            post(records::create_agent_handler).get(records::list_agents_handler),
        )
        .route(
            "/api/agents/{id}",
            get(records::get_agent_handler)
                .patch(records::update_agent_handler)
                .delete(records::delete_agent_handler),
        )
        .route("/api/execute", post(records::execute_handler))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider: Arc<dyn Provider> = Arc::new(avacyn_providers::from_config(&config));
    let db_path = config.storage.resolved_db_path();
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(SqliteStore::new(&db_path).await?);
    let search = SearchClient::new(
        config.search.api_url.clone(),
        config.search.api_key.clone(),
    );

    let state = Arc::new(AppState {
        provider,
        store,
        search,
        config,
        sessions: auth::SessionStore::new(),
    });
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Shared response plumbing ---

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a storage failure onto the HTTP surface.
pub(crate) fn storage_error(e: avacyn_core::error::StorageError) -> ApiError {
    use avacyn_core::error::StorageError;
    let status = match &e {
        StorageError::NameConflict(_) => StatusCode::CONFLICT,
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use avacyn_providers::MockProvider;

    /// A router plus direct handles to its state, with one seeded session
    /// for user "u1" under the token "tok-u1".
    pub(crate) async fn app_with(provider: MockProvider) -> (Router, SharedState) {
        let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
        let state = Arc::new(AppState {
            provider: Arc::new(provider),
            store,
            search: SearchClient::unconfigured(),
            config: AppConfig::default(),
            sessions: auth::SessionStore::new(),
        });
        state.sessions.insert("tok-u1", "u1").await;
        (build_router(state.clone()), state)
    }

    pub(crate) async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub(crate) async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint() {
        let (app, _state) = testing::app_with(avacyn_providers::MockProvider::new()).await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = testing::body_json(response).await;
        assert_eq!(body["status"], "ok");
    }
}
