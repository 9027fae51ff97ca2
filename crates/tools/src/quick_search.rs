//! One-shot web search exposed to the model during a chat turn.

use async_trait::async_trait;
use avacyn_core::error::ToolError;
use avacyn_core::tool::{Tool, ToolResult};

use crate::search_engine::{SearchClient, SearchParams};

pub struct QuickSearchTool {
    search: SearchClient,
}

impl QuickSearchTool {
    pub fn new(search: SearchClient) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for QuickSearchTool {
    fn name(&self) -> &str {
        "quickSearch"
    }

    fn description(&self) -> &str {
        "Rechercher des informations en utilisant l'API Tavily."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "La requête de recherche."
                },
                "search_depth": {
                    "type": "string",
                    "enum": ["basic", "advanced"],
                    "default": "basic",
                    "description": "La profondeur de la recherche."
                },
                "topic": {
                    "type": "string",
                    "enum": ["general", "news"],
                    "default": "general",
                    "description": "Le sujet ou la catégorie de recherche."
                },
                "days": {
                    "type": "number",
                    "description": "Nombre de jours pour les résultats de recherche (uniquement applicable pour \"news\")."
                },
                "max_results": {
                    "type": "number",
                    "default": 5,
                    "description": "Nombre maximum de résultats de recherche à retourner."
                },
                "include_answer": {
                    "type": "boolean",
                    "default": true,
                    "description": "Si une réponse directe doit être incluse dans la réponse."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let mut params = SearchParams::basic(query);
        if let Some(depth) = arguments["search_depth"].as_str() {
            params.search_depth = depth.to_string();
        }
        if let Some(topic) = arguments["topic"].as_str() {
            params.topic = topic.to_string();
        }
        params.days = arguments["days"].as_f64();
        if let Some(max_results) = arguments["max_results"].as_u64() {
            params.max_results = max_results as u32;
        }
        if let Some(include_answer) = arguments["include_answer"].as_bool() {
            params.include_answer = include_answer;
        }

        let data = self
            .search
            .search(&params)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "quickSearch".into(),
                reason: e.to_string(),
            })?;

        let answer = data["answer"].clone();
        let results: Vec<serde_json::Value> = data["results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "title": r["title"],
                            "url": r["url"],
                            "content": r["content"],
                            "answer": answer,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ToolResult::new(String::new(), serde_json::json!(results)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_defaults_match_search_params() {
        let tool = QuickSearchTool::new(SearchClient::unconfigured());
        let schema = tool.parameters_schema();
        assert_eq!(schema["properties"]["search_depth"]["default"], "basic");
        assert_eq!(schema["properties"]["topic"]["default"], "general");
        assert_eq!(schema["properties"]["max_results"]["default"], 5);
        assert_eq!(schema["properties"]["include_answer"]["default"], true);
        assert_eq!(
            schema["required"],
            serde_json::json!(["query"])
        );
    }

    #[tokio::test]
    async fn missing_query_rejected() {
        let tool = QuickSearchTool::new(SearchClient::unconfigured());
        let err = tool
            .execute(serde_json::json!({"topic": "news"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unconfigured_search_surfaces_execution_failure() {
        let tool = QuickSearchTool::new(SearchClient::unconfigured());
        let err = tool
            .execute(serde_json::json!({"query": "rust"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
