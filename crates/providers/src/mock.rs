//! Scripted provider for tests.
//!
//! Queue up turns, object snapshots, and element streams, then hand the
//! provider to the orchestrator. Each call pops the next script in FIFO
//! order; requests are recorded for assertions.

use async_trait::async_trait;
use avacyn_core::error::ProviderError;
use avacyn_core::message::{Message, MessageToolCall};
use avacyn_core::provider::*;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted model round-trip.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Stream these text fragments, then finish.
    Text(Vec<String>),
    /// Finish immediately with these tool calls (no text).
    ToolCalls(Vec<MessageToolCall>),
    /// Fail the call.
    Error(ProviderError),
}

impl ScriptedTurn {
    pub fn text(content: &str) -> Self {
        // Split into word-sized fragments so tests exercise real chunking.
        ScriptedTurn::Text(
            content
                .split_inclusive(' ')
                .map(|s| s.to_string())
                .collect(),
        )
    }

    pub fn tool_call(name: &str, arguments: serde_json::Value) -> Self {
        ScriptedTurn::ToolCalls(vec![MessageToolCall {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }])
    }
}

#[derive(Default)]
struct Scripts {
    turns: VecDeque<ScriptedTurn>,
    objects: VecDeque<Vec<serde_json::Value>>,
    elements: VecDeque<Vec<serde_json::Value>>,
}

/// A provider that replays scripted responses.
#[derive(Default)]
pub struct MockProvider {
    scripts: Mutex<Scripts>,
    requests: Mutex<Vec<ProviderRequest>>,
    object_requests: Mutex<Vec<ObjectRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.scripts.lock().unwrap().turns.push_back(turn);
    }

    pub fn push_text(&self, content: &str) {
        self.push_turn(ScriptedTurn::text(content));
    }

    pub fn push_tool_call(&self, name: &str, arguments: serde_json::Value) {
        self.push_turn(ScriptedTurn::tool_call(name, arguments));
    }

    /// Queue the snapshots one `stream_object` call will yield.
    pub fn push_object_snapshots(&self, snapshots: Vec<serde_json::Value>) {
        self.scripts.lock().unwrap().objects.push_back(snapshots);
    }

    /// Queue the elements one `stream_elements` call will yield.
    pub fn push_elements(&self, elements: Vec<serde_json::Value>) {
        self.scripts.lock().unwrap().elements.push_back(elements);
    }

    /// All chat requests seen so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// All constrained-generation requests seen so far.
    pub fn object_requests(&self) -> Vec<ObjectRequest> {
        self.object_requests.lock().unwrap().clone()
    }

    fn next_turn(&self) -> ScriptedTurn {
        self.scripts
            .lock()
            .unwrap()
            .turns
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::text("(no scripted turn)"))
    }
}

#[async_trait]
impl avacyn_core::Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.next_turn() {
            ScriptedTurn::Text(fragments) => Ok(ProviderResponse {
                message: Message::assistant(fragments.concat()),
                usage: None,
                model: request.model,
            }),
            ScriptedTurn::ToolCalls(calls) => {
                let mut message = Message::assistant("");
                message.tool_calls = calls;
                Ok(ProviderResponse {
                    message,
                    usage: None,
                    model: request.model,
                })
            }
            ScriptedTurn::Error(e) => Err(e),
        }
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<StreamReceiver<StreamChunk>, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let turn = self.next_turn();
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            match turn {
                ScriptedTurn::Text(fragments) => {
                    for fragment in fragments {
                        let _ = tx
                            .send(Ok(StreamChunk {
                                content: Some(fragment),
                                tool_calls: Vec::new(),
                                done: false,
                                usage: None,
                            }))
                            .await;
                    }
                    let _ = tx
                        .send(Ok(StreamChunk {
                            content: None,
                            tool_calls: Vec::new(),
                            done: true,
                            usage: None,
                        }))
                        .await;
                }
                ScriptedTurn::ToolCalls(calls) => {
                    let _ = tx
                        .send(Ok(StreamChunk {
                            content: None,
                            tool_calls: calls,
                            done: true,
                            usage: None,
                        }))
                        .await;
                }
                ScriptedTurn::Error(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });
        Ok(rx)
    }

    async fn stream_object(
        &self,
        request: ObjectRequest,
    ) -> std::result::Result<StreamReceiver<serde_json::Value>, ProviderError> {
        self.object_requests.lock().unwrap().push(request);
        let snapshots = self
            .scripts
            .lock()
            .unwrap()
            .objects
            .pop_front()
            .unwrap_or_default();
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            for snapshot in snapshots {
                if tx.send(Ok(snapshot)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn stream_elements(
        &self,
        request: ObjectRequest,
    ) -> std::result::Result<StreamReceiver<serde_json::Value>, ProviderError> {
        self.object_requests.lock().unwrap().push(request);
        let elements = self
            .scripts
            .lock()
            .unwrap()
            .elements
            .pop_front()
            .unwrap_or_default();
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            for element in elements {
                if tx.send(Ok(element)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}
