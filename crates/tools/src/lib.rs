//! Tool implementations for Avacyn.
//!
//! Two families:
//! - Built-in turn tools, wired to one chat turn's context: `getWeather`,
//!   `quickSearch`, `createDocument`, `updateDocument`, `requestSuggestions`.
//! - Dynamic tools synthesized from user-authored definitions, used by the
//!   agent execution flow.

pub mod create_document;
pub mod draft;
pub mod dynamic;
pub mod get_weather;
pub mod prompts;
pub mod quick_search;
pub mod request_suggestions;
pub mod search_engine;
pub mod update_document;

pub use dynamic::DynamicTool;
pub use search_engine::SearchClient;

use avacyn_core::provider::Provider;
use avacyn_core::stream::StreamEvent;
use avacyn_core::tool::ToolRegistry;
use avacyn_storage::SqliteStore;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

/// Everything a turn tool may need: the model backend, the store, the
/// requesting user, and the turn's event stream. Cheap to clone; one is
/// built per turn.
#[derive(Clone)]
pub struct TurnContext {
    pub provider: Arc<dyn Provider>,
    pub store: Arc<SqliteStore>,
    pub search: SearchClient,
    pub user_id: String,
    /// Model used for document generation and suggestions.
    pub model: String,
    pub events: Sender<StreamEvent>,
}

/// The registry of built-in tools active for one chat turn.
pub fn turn_registry(ctx: &TurnContext) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(get_weather::GetWeatherTool::new()));
    registry.register(Box::new(quick_search::QuickSearchTool::new(
        ctx.search.clone(),
    )));
    registry.register(Box::new(create_document::CreateDocumentTool::new(
        ctx.clone(),
    )));
    registry.register(Box::new(update_document::UpdateDocumentTool::new(
        ctx.clone(),
    )));
    registry.register(Box::new(
        request_suggestions::RequestSuggestionsTool::new(ctx.clone()),
    ));
    registry
}
