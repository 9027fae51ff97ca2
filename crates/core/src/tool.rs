//! Tool trait and registry — the abstraction over model-invocable
//! capabilities.
//!
//! The orchestrator resolves a model-requested tool name through the
//! registry, which validates the supplied arguments structurally against the
//! tool's declared schema before execution. Mismatches fail with
//! `ToolError::InvalidArguments`; arguments are never coerced.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution: a structured payload folded back into
/// the message history for the model's next step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// The structured output payload
    pub output: serde_json::Value,
}

impl ToolResult {
    pub fn new(call_id: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            output,
        }
    }

    /// The payload rendered as the content of a tool-result message.
    pub fn content(&self) -> String {
        self.output.to_string()
    }
}

/// The core Tool trait.
///
/// Each tool (getWeather, quickSearch, createDocument, updateDocument,
/// requestSuggestions, user-authored dynamic tools) implements this trait
/// and is registered in the ToolRegistry for one turn.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "createDocument").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Structurally validate `args` against a JSON-Schema-shaped `schema`.
///
/// Declared property types `string`, `number`, and `boolean` are checked
/// against the supplied value's JSON type; any other declared type accepts
/// anything. Properties listed under `required` must be present. The
/// argument payload itself must be an object.
pub fn validate_arguments(schema: &serde_json::Value, args: &serde_json::Value) -> std::result::Result<(), ToolError> {
    let Some(args_obj) = args.as_object() else {
        return Err(ToolError::InvalidArguments("arguments must be a JSON object".into()));
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !args_obj.contains_key(field) {
                return Err(ToolError::InvalidArguments(format!("missing required field '{field}'")));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Ok(());
    };

    for (field, rule) in properties {
        let Some(value) = args_obj.get(field) else {
            continue;
        };
        let ok = match rule.get("type").and_then(|t| t.as_str()) {
            Some("string") => value.is_string(),
            Some("number") => value.is_number(),
            Some("boolean") => value.is_boolean(),
            _ => true,
        };
        if !ok {
            return Err(ToolError::InvalidArguments(format!(
                "field '{field}' has wrong type (expected {})",
                rule.get("type").and_then(|t| t.as_str()).unwrap_or("any")
            )));
        }
    }

    Ok(())
}

/// A registry of the tools active for one turn.
///
/// The orchestrator uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Resolve and execute tools when the model requests them
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Resolve a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Resolve, validate, and execute a tool call.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::Unknown(call.name.clone()))?;
        validate_arguments(&tool.parameters_schema(), &call.arguments)?;
        tool.execute(call.arguments.clone()).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            Ok(ToolResult::new("test", serde_json::json!({ "echo": arguments["text"] })))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "hello world"}),
        };
        let result = registry.execute(&call).await.unwrap();
        assert_eq!(result.output["echo"], "hello world");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::Unknown(_)));
    }

    #[tokio::test]
    async fn registry_rejects_wrong_argument_type() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": 42}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn registry_rejects_missing_required_field() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn validate_accepts_extra_and_any_fields() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "depth": { "type": "string", "enum": ["basic", "advanced"] },
                "days": { "type": "number" },
                "raw": {}
            }
        });
        let args = serde_json::json!({"depth": "basic", "raw": [1, 2], "unknown": true});
        assert!(validate_arguments(&schema, &args).is_ok());
    }

    #[test]
    fn validate_rejects_non_object_arguments() {
        let schema = serde_json::json!({"type": "object", "properties": {}});
        assert!(validate_arguments(&schema, &serde_json::json!("nope")).is_err());
    }
}
