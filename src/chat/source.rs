use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::db::models::{ContentPart, MessageContent, Role};
use crate::llm::models::{ChatOptions, Fragment, Message as LlmMessage, ToolCall};
use crate::llm::LlmProvider;
use crate::tools::ToolRegistry;

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Everything a model stream needs for one turn.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Provider model id.
    pub model: String,
    pub reasoning: bool,
    pub system: String,
    pub messages: Vec<LlmMessage>,
    pub active_tools: Vec<String>,
    pub id_generator: fn() -> String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
}

/// The finalized result of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedTurn {
    pub messages: Vec<ResponseMessage>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    StepStart {
        message_id: String,
    },
    Fragment(Fragment),
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: serde_json::Value,
    },
    StepFinish {
        finish_reason: FinishReason,
        is_continued: bool,
    },
    Finished(FinishedTurn),
    Error(String),
}

/// Produces the events of one turn. Dropping the receiver cancels the turn.
pub trait ModelStreamSource: Send + Sync {
    fn stream(&self, request: StreamRequest) -> mpsc::Receiver<StreamEvent>;
}

/// Drives an `LlmProvider` step by step, executing tool calls between steps.
pub struct ProviderStreamSource {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    max_steps: usize,
}

impl ProviderStreamSource {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, max_steps: usize) -> Self {
        Self {
            provider,
            tools,
            max_steps: max_steps.max(1),
        }
    }
}

impl ModelStreamSource for ProviderStreamSource {
    fn stream(&self, request: StreamRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(100);
        let provider = self.provider.clone();
        let tools = self.tools.clone();
        let max_steps = self.max_steps;

        tokio::spawn(async move {
            if run_turn(provider, tools, max_steps, request, &tx).await.is_none() {
                info!("Client went away, abandoning model stream");
            }
        });
        rx
    }
}

/// Returns `None` when the receiver was dropped mid-turn.
async fn run_turn(
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    max_steps: usize,
    request: StreamRequest,
    tx: &mpsc::Sender<StreamEvent>,
) -> Option<()> {
    let definitions = tools.definitions(&request.active_tools);
    let mut history = request.messages.clone();
    let mut response_messages = Vec::new();
    let mut reasoning = String::new();

    for step in 0..max_steps {
        let message_id = (request.id_generator)();
        tx.send(StreamEvent::StepStart {
            message_id: message_id.clone(),
        })
        .await
        .ok()?;

        let options = ChatOptions {
            model: Some(request.model.clone()),
            system_prompt: Some(request.system.clone()),
            tools: (!definitions.is_empty()).then(|| definitions.clone()),
            reasoning: request.reasoning,
            ..Default::default()
        };

        let (ftx, mut frx) = mpsc::channel::<Fragment>(100);
        let step_provider = provider.clone();
        let step_history = history.clone();
        let handle = tokio::spawn(async move {
            step_provider.chat_streaming(&step_history, options, ftx).await
        });

        let mut text = String::new();
        let mut calls: Vec<ToolCall> = Vec::new();
        while let Some(fragment) = frx.recv().await {
            let fragment = match fragment {
                Fragment::Text(t) => {
                    text.push_str(&t);
                    Fragment::Text(t)
                }
                Fragment::Reasoning(r) => {
                    reasoning.push_str(&r);
                    Fragment::Reasoning(r)
                }
                Fragment::ToolCall(mut call) => {
                    if call.id.is_none() {
                        call.id = Some((request.id_generator)());
                    }
                    calls.push(call.clone());
                    Fragment::ToolCall(call)
                }
            };
            if tx.send(StreamEvent::Fragment(fragment)).await.is_err() {
                handle.abort();
                return None;
            }
        }

        let outcome = match handle.await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(join_error) => Err(join_error.to_string()),
        };
        if let Err(e) = outcome {
            error!("Model stream failed on step {}: {}", step, e);
            tx.send(StreamEvent::Error(e)).await.ok()?;
            return Some(());
        }

        let mut parts = vec![ContentPart::Text { text: text.clone() }];
        parts.extend(calls.iter().map(|call| ContentPart::ToolCall {
            tool_call_id: call.id.clone().unwrap_or_default(),
            tool_name: call.function.name.clone(),
            args: call.arguments_json(),
        }));
        response_messages.push(ResponseMessage {
            id: message_id,
            role: Role::Assistant,
            content: MessageContent::Parts(parts),
        });

        if calls.is_empty() {
            tx.send(StreamEvent::StepFinish {
                finish_reason: FinishReason::Stop,
                is_continued: false,
            })
            .await
            .ok()?;
            break;
        }

        let mut assistant = LlmMessage::new("assistant", text);
        assistant.tool_calls = Some(calls.clone());
        history.push(assistant);

        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            let tool_call_id = call.id.clone().unwrap_or_default();
            let result = tools
                .call_tool(&call.function.name, &request.active_tools, &call.arguments_json())
                .await;

            tx.send(StreamEvent::ToolResult {
                tool_call_id: tool_call_id.clone(),
                tool_name: call.function.name.clone(),
                result: result.clone(),
            })
            .await
            .ok()?;

            let mut tool_message = LlmMessage::new("tool", result.to_string());
            tool_message.tool_call_id = Some(tool_call_id.clone());
            history.push(tool_message);

            results.push(ContentPart::ToolResult {
                tool_call_id,
                tool_name: call.function.name.clone(),
                result,
            });
        }
        response_messages.push(ResponseMessage {
            id: (request.id_generator)(),
            role: Role::Tool,
            content: MessageContent::Parts(results),
        });

        let is_continued = step + 1 < max_steps;
        tx.send(StreamEvent::StepFinish {
            finish_reason: FinishReason::ToolCalls,
            is_continued,
        })
        .await
        .ok()?;
        if !is_continued {
            break;
        }
    }

    tx.send(StreamEvent::Finished(FinishedTurn {
        messages: response_messages,
        reasoning: (!reasoning.is_empty()).then_some(reasoning),
    }))
    .await
    .ok()
}
