//! Non-streaming execution of user-authored agents.
//!
//! An execution runs one input through an agent's prompt and dynamic tools
//! for up to a fixed number of steps and records the outcome. The returned
//! record carries the final status; a model failure is recorded as a failed
//! execution, not bubbled as an error. Running out of steps is not a
//! failure: the execution completes with the last assistant text.

use std::sync::Arc;

use avacyn_core::document::{AgentDefinition, Execution, ExecutionStatus};
use avacyn_core::message::Message;
use avacyn_core::provider::{Provider, ProviderRequest};
use avacyn_core::tool::{ToolCall, ToolRegistry};
use avacyn_storage::SqliteStore;
use avacyn_tools::DynamicTool;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::prompts::DEFAULT_AGENT_PROMPT;

/// Recorded when an execution fails for any reason.
pub const EXECUTION_FAILED_OUTPUT: &str = "An error occurred during execution.";

pub struct ExecutionRunner {
    provider: Arc<dyn Provider>,
    store: Arc<SqliteStore>,
    model: String,
    temperature: f32,
    max_steps: u32,
}

impl ExecutionRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<SqliteStore>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            model: model.into(),
            temperature: 0.7,
            max_steps: 5,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Run `input` through the agent and record the execution.
    pub async fn execute(
        &self,
        agent: &AgentDefinition,
        input: &str,
    ) -> Result<Execution, avacyn_core::Error> {
        let stored_tools = self.store.get_tools_by_ids(&agent.tool_ids).await?;
        let mut tools = ToolRegistry::new();
        for stored in &stored_tools {
            tools.register(Box::new(DynamicTool::from_stored(stored)));
        }

        let mut execution = Execution {
            id: Uuid::new_v4().to_string(),
            agent_id: agent.id.clone(),
            input: input.to_string(),
            status: ExecutionStatus::Started,
            output: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.store.create_execution(&execution).await?;

        info!(
            execution_id = %execution.id,
            agent = %agent.name,
            tools = stored_tools.len(),
            "Starting agent execution"
        );

        let (status, output) = match self.run_loop(agent, &tools, input).await {
            Ok(text) => (ExecutionStatus::Completed, text),
            Err(e) => {
                warn!(execution_id = %execution.id, error = %e, "Agent execution failed");
                (ExecutionStatus::Failed, EXECUTION_FAILED_OUTPUT.to_string())
            }
        };

        self.store
            .complete_execution(&execution.id, status, &output)
            .await?;
        execution.status = status;
        execution.output = Some(output);
        execution.completed_at = Some(Utc::now());
        Ok(execution)
    }

    async fn run_loop(
        &self,
        agent: &AgentDefinition,
        tools: &ToolRegistry,
        input: &str,
    ) -> Result<String, avacyn_core::Error> {
        let system = agent
            .prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_AGENT_PROMPT.to_string());
        let mut conversation = vec![Message::system(system), Message::user(input)];
        let definitions = tools.definitions();
        let mut last_content = String::new();

        for step in 1..=self.max_steps {
            debug!(agent = %agent.name, step, "Execution step");

            let response = self
                .provider
                .complete(ProviderRequest {
                    model: self.model.clone(),
                    messages: conversation.clone(),
                    temperature: self.temperature,
                    max_tokens: None,
                    tools: definitions.clone(),
                })
                .await?;

            let tool_calls = response.message.tool_calls.clone();
            last_content = response.message.content.clone();
            conversation.push(response.message);

            if tool_calls.is_empty() {
                return Ok(last_content);
            }
            if step == self.max_steps {
                warn!(agent = %agent.name, "Step budget exhausted, returning last text");
                break;
            }

            for call in &tool_calls {
                let request = ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: serde_json::from_str(&call.arguments).unwrap_or_default(),
                };
                let output = match tools.execute(&request).await {
                    Ok(result) => result.output,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Dynamic tool failed");
                        serde_json::json!({"error": e.to_string()})
                    }
                };
                conversation.push(Message::tool_result(&call.id, output.to_string()));
            }
        }

        Ok(last_content)
    }
}
