//! Message voting.

use avacyn_core::chat::Vote;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::Deserialize;

use crate::auth::current_user;
use crate::{api_error, storage_error, ApiError, SharedState};

#[derive(Deserialize)]
pub struct VoteParams {
    #[serde(rename = "chatId", default)]
    pub chat_id: Option<String>,
}

/// `GET /api/vote?chatId=` — all votes recorded for a chat.
pub async fn get_votes_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<VoteParams>,
) -> Result<Json<Vec<Vote>>, ApiError> {
    let Some(chat_id) = params.chat_id else {
        return Err(api_error(StatusCode::BAD_REQUEST, "chatId is required"));
    };
    current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    let votes = state
        .store
        .get_votes_by_chat(&chat_id)
        .await
        .map_err(storage_error)?;
    Ok(Json(votes))
}

#[derive(Deserialize)]
pub struct VoteRequest {
    #[serde(rename = "chatId", default)]
    pub chat_id: Option<String>,
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
    #[serde(rename = "type", default)]
    pub vote_type: Option<String>,
}

/// `PATCH /api/vote` — record an up or down vote. Re-voting upserts.
pub async fn vote_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<VoteRequest>,
) -> Result<String, ApiError> {
    let (Some(chat_id), Some(message_id), Some(vote_type)) =
        (payload.chat_id, payload.message_id, payload.vote_type)
    else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "messageId and type are required",
        ));
    };
    current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    let is_upvoted = vote_type == "up";
    state
        .store
        .vote_message(&chat_id, &message_id, is_upvoted)
        .await
        .map_err(storage_error)?;
    Ok("Message voted".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use avacyn_core::chat::Chat;
    use avacyn_providers::MockProvider;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn seed_chat(state: &crate::SharedState, id: &str) {
        state
            .store
            .save_chat(&Chat {
                id: id.into(),
                user_id: "u1".into(),
                title: "discussion".into(),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
    }

    fn authed(method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", "Bearer tok-u1");
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        builder.body(body).unwrap()
    }

    #[tokio::test]
    async fn vote_then_list() {
        let (app, state) = testing::app_with(MockProvider::new()).await;
        seed_chat(&state, "c1").await;

        let response = app
            .clone()
            .oneshot(authed(
                "PATCH",
                "/api/vote",
                Some(r#"{"chatId":"c1","messageId":"m1","type":"up"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(testing::body_text(response).await, "Message voted");

        let response = app
            .oneshot(authed("GET", "/api/vote?chatId=c1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let votes = testing::body_json(response).await;
        let votes = votes.as_array().unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0]["is_upvoted"], true);
    }

    #[tokio::test]
    async fn revote_flips_the_vote() {
        let (app, state) = testing::app_with(MockProvider::new()).await;
        seed_chat(&state, "c1").await;

        for vote_type in ["up", "down"] {
            let body = format!(r#"{{"chatId":"c1","messageId":"m1","type":"{vote_type}"}}"#);
            let response = app
                .clone()
                .oneshot(authed("PATCH", "/api/vote", Some(&body)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let votes = state.store.get_votes_by_chat("c1").await.unwrap();
        assert_eq!(votes.len(), 1);
        assert!(!votes[0].is_upvoted);
    }

    #[tokio::test]
    async fn missing_fields_are_bad_requests() {
        let (app, _state) = testing::app_with(MockProvider::new()).await;

        let response = app
            .clone()
            .oneshot(authed("GET", "/api/vote", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(authed(
                "PATCH",
                "/api/vote",
                Some(r#"{"chatId":"c1","type":"up"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn votes_require_authentication() {
        let (app, _state) = testing::app_with(MockProvider::new()).await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/vote?chatId=c1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
