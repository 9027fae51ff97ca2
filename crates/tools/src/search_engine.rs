//! Tavily-backed web search, plus the research sub-flow behind
//! search-kind documents.
//!
//! `complete_search` is a blocking pipeline: expand the topic into three
//! queries, run each against the search API, have the model organize each
//! raw result set, and concatenate everything into one findings text that
//! seeds the writing pass.

use avacyn_core::error::{ProviderError, SearchError};
use avacyn_core::provider::{ObjectRequest, Provider};
use serde::Deserialize;
use tracing::{debug, warn};

/// Parameters for one search call. Defaults match the quickSearch tool.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub search_depth: String,
    pub topic: String,
    pub days: Option<f64>,
    pub max_results: u32,
    pub include_answer: bool,
    pub include_raw_content: bool,
}

impl SearchParams {
    pub fn basic(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_depth: "basic".into(),
            topic: "general".into(),
            days: None,
            max_results: 5,
            include_answer: true,
            include_raw_content: false,
        }
    }

    /// The deep variant used by the research sub-flow.
    pub fn advanced(query: impl Into<String>) -> Self {
        Self {
            search_depth: "advanced".into(),
            include_raw_content: true,
            ..Self::basic(query)
        }
    }
}

#[derive(Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl SearchClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// A client with no API key; every search fails with `NotConfigured`.
    pub fn unconfigured() -> Self {
        Self::new("https://api.tavily.com", None)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Run one search. Returns the raw response body.
    pub async fn search(&self, params: &SearchParams) -> Result<serde_json::Value, SearchError> {
        let Some(api_key) = &self.api_key else {
            return Err(SearchError::NotConfigured("no search API key".into()));
        };

        let mut body = serde_json::json!({
            "query": params.query,
            "search_depth": params.search_depth,
            "topic": params.topic,
            "max_results": params.max_results,
            "include_answer": params.include_answer,
            "include_raw_content": params.include_raw_content,
        });
        if let Some(days) = params.days {
            body["days"] = serde_json::json!(days);
        }

        debug!(query = %params.query, depth = %params.search_depth, "Running search");

        let response = self
            .client
            .post(format!("{}/search", self.api_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::RequestFailed(format!(
                "search returned {status}: {text}"
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(format!("invalid response body: {e}")))?;

        let empty = data["results"]
            .as_array()
            .map(|r| r.is_empty())
            .unwrap_or(true);
        if empty {
            return Err(SearchError::NoResults(params.query.clone()));
        }

        Ok(data)
    }

    /// The full research pipeline: query expansion, search, organization.
    pub async fn complete_search(
        &self,
        provider: &dyn Provider,
        model: &str,
        topic: &str,
    ) -> Result<String, SearchError> {
        let queries = self.expand_queries(provider, model, topic).await?;
        let mut findings = format!("Search results for the topic: \"{topic}\"\n\n");

        for query in &queries {
            findings.push_str(&format!("Query: \"{query}\"\n"));

            let raw = self.search(&SearchParams::advanced(query.clone())).await?;
            findings.push_str(&format!(
                "Raw Results:\n{}\n",
                serde_json::to_string_pretty(&raw).unwrap_or_default()
            ));

            match self.organize_results(provider, model, &raw).await {
                Ok(organized) if organized.is_empty() => {
                    warn!(query = %query, "No organized results");
                    findings.push_str(&format!("\nNo organized results found for query: {query}\n"));
                }
                Ok(organized) => {
                    for entry in organized {
                        findings.push_str(&format!(
                            "\nTitre: {}\nSource: {}\nContent: {}\n",
                            entry.titre, entry.source, entry.content
                        ));
                    }
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Failed to organize results");
                    findings.push_str(&format!("\nNo organized results found for query: {query}\n"));
                }
            }

            findings.push('\n');
        }

        Ok(findings)
    }

    /// Ask the model for three diverse queries covering the topic.
    async fn expand_queries(
        &self,
        provider: &dyn Provider,
        model: &str,
        topic: &str,
    ) -> Result<Vec<String>, SearchError> {
        let object = provider
            .generate_object(ObjectRequest {
                model: model.to_string(),
                system: "You generate search queries.".into(),
                prompt: format!("Generate 3 diverses queries for the topic: {topic}"),
                schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "queries": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    },
                    "required": ["queries"]
                }),
            })
            .await
            .map_err(provider_to_search_error)?;

        let queries: Vec<String> = object["queries"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|q| q.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        if queries.is_empty() {
            return Err(SearchError::RequestFailed(
                "model produced no search queries".into(),
            ));
        }
        Ok(queries)
    }

    /// Have the model distill raw results into titled, sourced summaries.
    async fn organize_results(
        &self,
        provider: &dyn Provider,
        model: &str,
        raw: &serde_json::Value,
    ) -> Result<Vec<OrganizedResult>, SearchError> {
        let prompt = format!(
            "Organize the following search results into a structured JSON format.\n\
             Please return a JSON object with a property \"organizedResults\" that is an array of objects.\n\
             Each object should have:\n\
             - \"Titre\" (the title of the search result),\n\
             - \"Source\" (the URL or source reference),\n\
             - \"Content\" (a synthesized summary of the raw content).\n\n\
             Raw search results:\n{raw}"
        );

        let object = provider
            .generate_object(ObjectRequest {
                model: model.to_string(),
                system: "You organize search results.".into(),
                prompt,
                schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "organizedResults": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "Titre": { "type": "string" },
                                    "Source": { "type": "string" },
                                    "Content": { "type": "string" }
                                },
                                "required": ["Titre", "Source", "Content"]
                            }
                        }
                    },
                    "required": ["organizedResults"]
                }),
            })
            .await
            .map_err(provider_to_search_error)?;

        let parsed: OrganizedResults = serde_json::from_value(object)
            .map_err(|e| SearchError::RequestFailed(format!("invalid organized results: {e}")))?;
        Ok(parsed.organized_results)
    }
}

fn provider_to_search_error(e: ProviderError) -> SearchError {
    SearchError::RequestFailed(e.to_string())
}

#[derive(Debug, Deserialize)]
struct OrganizedResults {
    #[serde(rename = "organizedResults", default)]
    organized_results: Vec<OrganizedResult>,
}

#[derive(Debug, Deserialize)]
struct OrganizedResult {
    #[serde(rename = "Titre")]
    titre: String,
    #[serde(rename = "Source")]
    source: String,
    #[serde(rename = "Content")]
    content: String,
}
