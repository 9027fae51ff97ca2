//! Current weather lookup via the Open-Meteo forecast API.

use async_trait::async_trait;
use avacyn_core::error::ToolError;
use avacyn_core::tool::{Tool, ToolResult};

pub struct GetWeatherTool {
    client: reqwest::Client,
    base_url: String,
}

impl GetWeatherTool {
    pub fn new() -> Self {
        Self::with_base_url("https://api.open-meteo.com")
    }

    /// Override the endpoint (tests point this at a local server).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for GetWeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "getWeather"
    }

    fn description(&self) -> &str {
        "Obtenir la météo actuelle à un emplacement"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "latitude": { "type": "number" },
                "longitude": { "type": "number" }
            },
            "required": ["latitude", "longitude"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let latitude = arguments["latitude"]
            .as_f64()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'latitude' argument".into()))?;
        let longitude = arguments["longitude"]
            .as_f64()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'longitude' argument".into()))?;

        let url = format!(
            "{}/v1/forecast?latitude={latitude}&longitude={longitude}&current=temperature_2m&hourly=temperature_2m&daily=sunrise,sunset&timezone=auto",
            self.base_url
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            ToolError::ExecutionFailed {
                tool_name: "getWeather".into(),
                reason: e.to_string(),
            }
        })?;

        let weather: serde_json::Value =
            response.json().await.map_err(|e| ToolError::ExecutionFailed {
                tool_name: "getWeather".into(),
                reason: format!("invalid response body: {e}"),
            })?;

        Ok(ToolResult::new(String::new(), weather))
    }
}
