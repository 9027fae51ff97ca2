//! Tools synthesized from user-authored definitions.
//!
//! A stored definition carries sample parameter values, not a schema. The
//! schema is synthesized from the samples at load time: string, number, and
//! boolean samples become typed properties, anything else becomes an
//! accept-any property. Samples may also arrive as a JSON-encoded string of
//! an object; only an unparsable definition collapses to an empty schema
//! that accepts `{}`.

use async_trait::async_trait;
use avacyn_core::document::StoredTool;
use avacyn_core::error::ToolError;
use avacyn_core::tool::{Tool, ToolResult};
use tracing::info;

pub struct DynamicTool {
    name: String,
    description: String,
    schema: serde_json::Value,
}

impl DynamicTool {
    pub fn from_stored(stored: &StoredTool) -> Self {
        Self {
            name: stored.name.clone(),
            description: stored.description.clone().unwrap_or_default(),
            schema: synthesize_schema(&stored.parameters),
        }
    }
}

/// Derive a parameter schema from sample values. A string is treated as a
/// JSON-encoded object and parsed first.
pub fn synthesize_schema(parameters: &serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::String(encoded) = parameters {
        return match serde_json::from_str::<serde_json::Value>(encoded) {
            Ok(parsed) if !parsed.is_string() => synthesize_schema(&parsed),
            _ => synthesize_schema(&serde_json::Value::Null),
        };
    }

    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    if let Some(samples) = parameters.as_object() {
        for (key, sample) in samples {
            let property = match sample {
                serde_json::Value::String(_) => serde_json::json!({"type": "string"}),
                serde_json::Value::Number(_) => serde_json::json!({"type": "number"}),
                serde_json::Value::Bool(_) => serde_json::json!({"type": "boolean"}),
                _ => serde_json::json!({}),
            };
            properties.insert(key.clone(), property);
            required.push(key.clone());
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[async_trait]
impl Tool for DynamicTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        info!(tool = %self.name, %arguments, "Executing dynamic tool");
        Ok(ToolResult::new(
            String::new(),
            serde_json::json!("Tool execution result"),
        ))
    }
}
