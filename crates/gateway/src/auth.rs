//! Bearer session resolution.
//!
//! Sessions are an in-memory token-to-user map. Issuing them is an
//! operator concern: `POST /api/session` seeds one, and tests insert
//! directly. With `gateway.require_auth` off every request acts as the
//! fixed local user.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{api_error, ApiError, AppState, SharedState};

/// The user every request resolves to when auth is disabled.
pub const LOCAL_USER: &str = "local";

#[derive(Default)]
pub struct SessionStore {
    tokens: RwLock<HashMap<String, String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for a user.
    pub async fn issue(&self, user_id: impl Into<String>) -> String {
        let token = Uuid::new_v4().to_string();
        self.insert(token.clone(), user_id).await;
        token
    }

    pub async fn insert(&self, token: impl Into<String>, user_id: impl Into<String>) {
        self.tokens
            .write()
            .await
            .insert(token.into(), user_id.into());
    }

    pub async fn resolve(&self, token: &str) -> Option<String> {
        self.tokens.read().await.get(token).cloned()
    }
}

/// Resolve the authenticated user for a request, if any.
pub async fn current_user(state: &AppState, headers: &HeaderMap) -> Option<String> {
    if !state.config.gateway.require_auth {
        return Some(LOCAL_USER.to_string());
    }
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))?;
    state.sessions.resolve(token).await
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub token: String,
}

/// `POST /api/session` — seed a session for a user.
pub async fn create_session_handler(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    if payload.user_id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "userId is required"));
    }
    let token = state.sessions.issue(payload.user_id).await;
    Ok(Json(CreateSessionResponse { token }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use avacyn_providers::MockProvider;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn session_round_trip() {
        let store = SessionStore::new();
        let token = store.issue("u1").await;
        assert_eq!(store.resolve(&token).await.as_deref(), Some("u1"));
        assert!(store.resolve("bogus").await.is_none());
    }

    #[tokio::test]
    async fn session_endpoint_issues_resolvable_token() {
        let (app, state) = testing::app_with(MockProvider::new()).await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/session")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"userId":"u2"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = testing::body_json(response).await;
        let token = body["token"].as_str().unwrap();
        assert_eq!(state.sessions.resolve(token).await.as_deref(), Some("u2"));
    }
}
