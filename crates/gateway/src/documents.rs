//! The document surface: version history reads, manual saves, rollback,
//! and suggestion listing.

use avacyn_core::document::{Document, DocumentKind};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::auth::current_user;
use crate::{api_error, storage_error, ApiError, SharedState};

#[derive(Deserialize)]
pub struct DocumentParams {
    #[serde(default)]
    pub id: Option<String>,
}

/// `GET /api/document?id=` — every version of a document, oldest first.
pub async fn get_document_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<DocumentParams>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let Some(id) = params.id else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Missing id"));
    };
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    let versions = state
        .store
        .get_document_versions(&id)
        .await
        .map_err(storage_error)?;
    let Some(first) = versions.first() else {
        return Err(api_error(StatusCode::NOT_FOUND, "Not Found"));
    };
    if first.user_id != user_id {
        return Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }
    Ok(Json(versions))
}

#[derive(Deserialize)]
pub struct SaveDocumentRequest {
    pub content: String,
    pub title: String,
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "text".into()
}

/// `POST /api/document?id=` — save one new version.
pub async fn save_document_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<DocumentParams>,
    Json(payload): Json<SaveDocumentRequest>,
) -> Result<Json<Document>, ApiError> {
    let Some(id) = params.id else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Missing id"));
    };
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;
    let kind: DocumentKind = payload
        .kind
        .parse()
        .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;

    if let Some(existing) = state.store.get_document(&id).await.map_err(storage_error)? {
        if existing.user_id != user_id {
            return Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
        }
    }

    let document = Document {
        id,
        created_at: Utc::now(),
        title: payload.title,
        kind,
        content: payload.content,
        user_id,
    };
    state
        .store
        .save_document(&document)
        .await
        .map_err(storage_error)?;
    Ok(Json(document))
}

#[derive(Deserialize)]
pub struct RollbackRequest {
    pub timestamp: DateTime<Utc>,
}

/// `PATCH /api/document?id=` — delete every version strictly after the
/// timestamp, along with the suggestions bound to them.
pub async fn rollback_document_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<DocumentParams>,
    Json(payload): Json<RollbackRequest>,
) -> Result<String, ApiError> {
    let Some(id) = params.id else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Missing id"));
    };
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    let document = state
        .store
        .get_document(&id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Not Found"))?;
    if document.user_id != user_id {
        return Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }

    let deleted = state
        .store
        .delete_document_versions_after(&id, payload.timestamp)
        .await
        .map_err(storage_error)?;
    info!(document_id = %id, deleted, "Rolled back document");
    Ok("Deleted".to_string())
}

#[derive(Deserialize)]
pub struct SuggestionParams {
    #[serde(rename = "documentId", default)]
    pub document_id: Option<String>,
}

/// `GET /api/suggestions?documentId=` — all suggestions for a document.
/// An unknown document yields an empty list, not a 404.
pub async fn get_suggestions_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<SuggestionParams>,
) -> Result<Json<Vec<avacyn_core::document::Suggestion>>, ApiError> {
    let Some(document_id) = params.document_id else {
        return Err(api_error(StatusCode::NOT_FOUND, "Not Found"));
    };
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    let suggestions = state
        .store
        .get_suggestions_by_document(&document_id)
        .await
        .map_err(storage_error)?;
    if let Some(first) = suggestions.first() {
        if first.user_id != user_id {
            return Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
        }
    }
    Ok(Json(suggestions))
}
