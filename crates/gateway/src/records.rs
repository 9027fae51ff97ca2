//! User-authored tool and agent records, plus agent execution.

use avacyn_agent::ExecutionRunner;
use avacyn_core::document::{AgentDefinition, Execution, ExecutionStatus, StoredTool};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::current_user;
use crate::{api_error, storage_error, ApiError, SharedState};

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(rename = "pageSize", default = "default_page_size")]
    pub page_size: i64,
    #[serde(default)]
    pub search: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
}

// --- Tools ---

#[derive(Deserialize)]
pub struct CreateToolRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

pub async fn create_tool_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CreateToolRequest>,
) -> Result<Json<StoredTool>, ApiError> {
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;
    if payload.name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "name is required"));
    }

    let tool = StoredTool {
        id: Uuid::new_v4().to_string(),
        name: payload.name,
        description: payload.description,
        parameters: payload.parameters,
        user_id,
    };
    state.store.create_tool(&tool).await.map_err(storage_error)?;
    info!(tool_id = %tool.id, name = %tool.name, "Tool created");
    Ok(Json(tool))
}

pub async fn list_tools_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse<StoredTool>>, ApiError> {
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;
    let page = state
        .store
        .list_tools(
            &user_id,
            params.page,
            params.page_size,
            params.search.as_deref(),
        )
        .await
        .map_err(storage_error)?;
    Ok(Json(ListResponse {
        items: page.items,
        total: page.total,
    }))
}

async fn owned_tool(
    state: &SharedState,
    headers: &HeaderMap,
    id: &str,
) -> Result<StoredTool, ApiError> {
    let user_id = current_user(state, headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;
    let tool = state
        .store
        .get_tool(id)
        .await
        .map_err(storage_error)?
        .filter(|t| t.user_id == user_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Not Found"))?;
    Ok(tool)
}

pub async fn get_tool_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StoredTool>, ApiError> {
    Ok(Json(owned_tool(&state, &headers, &id).await?))
}

#[derive(Deserialize)]
pub struct UpdateToolRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

pub async fn update_tool_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateToolRequest>,
) -> Result<Json<StoredTool>, ApiError> {
    let mut tool = owned_tool(&state, &headers, &id).await?;
    if let Some(name) = payload.name {
        tool.name = name;
    }
    if let Some(description) = payload.description {
        tool.description = Some(description);
    }
    if let Some(parameters) = payload.parameters {
        tool.parameters = parameters;
    }
    state.store.update_tool(&tool).await.map_err(storage_error)?;
    Ok(Json(tool))
}

pub async fn delete_tool_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<String, ApiError> {
    owned_tool(&state, &headers, &id).await?;
    state.store.delete_tool(&id).await.map_err(storage_error)?;
    Ok("Tool deleted".to_string())
}

// --- Agents ---

#[derive(Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(rename = "toolIds", default)]
    pub tool_ids: Vec<String>,
}

pub async fn create_agent_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CreateAgentRequest>,
) -> Result<Json<AgentDefinition>, ApiError> {
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;
    if payload.name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "name is required"));
    }

    let agent = AgentDefinition {
        id: Uuid::new_v4().to_string(),
        name: payload.name,
        prompt: payload.prompt,
        tool_ids: payload.tool_ids,
        user_id,
    };
    state
        .store
        .create_agent(&agent)
        .await
        .map_err(storage_error)?;
    info!(agent_id = %agent.id, name = %agent.name, "Agent created");
    Ok(Json(agent))
}

pub async fn list_agents_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse<AgentDefinition>>, ApiError> {
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;
    let page = state
        .store
        .list_agents(
            &user_id,
            params.page,
            params.page_size,
            params.search.as_deref(),
        )
        .await
        .map_err(storage_error)?;
    Ok(Json(ListResponse {
        items: page.items,
        total: page.total,
    }))
}

async fn owned_agent(
    state: &SharedState,
    headers: &HeaderMap,
    id: &str,
) -> Result<AgentDefinition, ApiError> {
    let user_id = current_user(state, headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;
    let agent = state
        .store
        .get_agent(id)
        .await
        .map_err(storage_error)?
        .filter(|a| a.user_id == user_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Not Found"))?;
    Ok(agent)
}

pub async fn get_agent_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AgentDefinition>, ApiError> {
    Ok(Json(owned_agent(&state, &headers, &id).await?))
}

#[derive(Deserialize)]
pub struct UpdateAgentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(rename = "toolIds", default)]
    pub tool_ids: Option<Vec<String>>,
}

pub async fn update_agent_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAgentRequest>,
) -> Result<Json<AgentDefinition>, ApiError> {
    let mut agent = owned_agent(&state, &headers, &id).await?;
    if let Some(name) = payload.name {
        agent.name = name;
    }
    if let Some(prompt) = payload.prompt {
        agent.prompt = Some(prompt);
    }
    if let Some(tool_ids) = payload.tool_ids {
        agent.tool_ids = tool_ids;
    }
    state
        .store
        .update_agent(&agent)
        .await
        .map_err(storage_error)?;
    Ok(Json(agent))
}

pub async fn delete_agent_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<String, ApiError> {
    owned_agent(&state, &headers, &id).await?;
    state.store.delete_agent(&id).await.map_err(storage_error)?;
    Ok("Agent deleted".to_string())
}

// --- Execution ---

#[derive(Deserialize)]
pub struct ExecuteRequest {
    #[serde(rename = "agentId")]
    pub agent_id: String,
    pub input: String,
}

/// `POST /api/execute` — run an agent over one input, synchronously.
/// A failed run is recorded and returned with a 500.
pub async fn execute_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<ExecuteRequest>,
) -> Result<(StatusCode, Json<Execution>), ApiError> {
    let user_id = current_user(&state, &headers)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    let agent = state
        .store
        .get_agent(&payload.agent_id)
        .await
        .map_err(storage_error)?
        .filter(|a| a.user_id == user_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Agent not found"))?;

    let runner = ExecutionRunner::new(
        state.provider.clone(),
        state.store.clone(),
        state.config.models.chat.clone(),
    )
    .with_temperature(state.config.default_temperature)
    .with_max_steps(state.config.turn.max_steps);

    let execution = runner
        .execute(&agent, &payload.input)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let status = if execution.status == ExecutionStatus::Failed {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok((status, Json(execution)))
}
