use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc::Sender;

use crate::llm::lines::{sse_data, LineBuffer};
use crate::llm::{
    models::{
        ChatOptions, ChatResponse, Fragment, FunctionCall, Message, ToolCall, ToolDefinition,
        Usage,
    },
    LlmError, LlmProvider,
};

const THINKING_BUDGET: u32 = 2048;

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: String, default_model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            default_model,
        }
    }

    fn request_body(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        stream: bool,
    ) -> serde_json::Value {
        let model = options.model.as_deref().unwrap_or(&self.default_model);

        // Anthropic requires the 'system' prompt as a separate field
        let mut system = String::new();
        for m in messages.iter().filter(|m| m.role == "system") {
            system.push_str(&m.content);
            system.push('\n');
        }
        if let Some(opts_system) = &options.system_prompt {
            system.push_str(opts_system);
        }

        let mut body = json!({
            "model": model,
            "messages": to_anthropic_messages(messages),
            "system": system.trim(),
            "stream": stream,
            "max_tokens": options.max_tokens.unwrap_or(4096).max(THINKING_BUDGET + 1),
        });

        if options.reasoning {
            // Extended thinking only runs at the default temperature.
            body["thinking"] = json!({ "type": "enabled", "budget_tokens": THINKING_BUDGET });
        } else {
            body["temperature"] = json!(options.temperature.unwrap_or(0.7));
        }
        if let Some(tools) = options.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = json!(tools.iter().map(to_anthropic_tool).collect::<Vec<_>>());
        }
        body
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited);
            }
            return Err(LlmError::Api(format!("Anthropic Error {}: {}", status, text)));
        }
        Ok(response)
    }
}

fn to_anthropic_tool(tool: &ToolDefinition) -> serde_json::Value {
    json!({
        "name": tool.function.name,
        "description": tool.function.description,
        "input_schema": tool.function.parameters,
    })
}

/// Tool calls become `tool_use` blocks and tool results are sent back as
/// `tool_result` blocks inside a user turn.
pub(crate) fn to_anthropic_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    let mut out: Vec<serde_json::Value> = Vec::new();

    for m in messages.iter().filter(|m| m.role != "system") {
        match m.role.as_str() {
            "tool" => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                    "content": m.content,
                });
                // Consecutive results share one user turn.
                let appended = out
                    .last_mut()
                    .filter(|last| last["role"] == "user" && last["content"].is_array())
                    .and_then(|last| last["content"].as_array_mut())
                    .map(|blocks| blocks.push(block.clone()))
                    .is_some();
                if !appended {
                    out.push(json!({ "role": "user", "content": [block] }));
                }
            }
            "assistant" if m.tool_calls.is_some() => {
                let mut blocks = Vec::new();
                if !m.content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": m.content }));
                }
                for call in m.tool_calls.iter().flatten() {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id.clone().unwrap_or_default(),
                        "name": call.function.name,
                        "input": call.arguments_json(),
                    }));
                }
                out.push(json!({ "role": "assistant", "content": blocks }));
            }
            role => out.push(json!({ "role": role, "content": m.content })),
        }
    }
    out
}

/// In-flight `tool_use` content block.
struct PendingToolUse {
    id: String,
    name: String,
    input: String,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let body = self.request_body(messages, &options, false);
        let response = self.send(&body).await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let blocks = json["content"].as_array().ok_or(LlmError::InvalidRequest)?;
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => content.push_str(block["text"].as_str().unwrap_or_default()),
                Some("tool_use") => tool_calls.push(ToolCall {
                    id: block["id"].as_str().map(str::to_string),
                    r#type: Some("function".to_string()),
                    function: FunctionCall {
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: block["input"].to_string(),
                    },
                }),
                _ => {}
            }
        }

        let usage = json.get("usage").map(|u| Usage {
            input_tokens: u["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["output_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(ChatResponse {
            content,
            model: json["model"].as_str().unwrap_or(&self.default_model).to_string(),
            usage,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        })
    }

    async fn chat_streaming(
        &self,
        messages: &[Message],
        options: ChatOptions,
        tx: Sender<Fragment>,
    ) -> Result<(), LlmError> {
        let body = self.request_body(messages, &options, true);
        let response = self.send(&body).await?;

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut tool_use: Option<PendingToolUse> = None;

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            for line in lines.push(&bytes) {
                let Some(data) = sse_data(line.trim()) else {
                    continue;
                };
                let Ok(json) = serde_json::from_str::<serde_json::Value>(data) else {
                    continue;
                };

                let fragment = match json["type"].as_str() {
                    Some("content_block_start") if json["content_block"]["type"] == "tool_use" => {
                        let block = &json["content_block"];
                        tool_use = Some(PendingToolUse {
                            id: block["id"].as_str().unwrap_or_default().to_string(),
                            name: block["name"].as_str().unwrap_or_default().to_string(),
                            input: String::new(),
                        });
                        None
                    }
                    Some("content_block_delta") => {
                        let delta = &json["delta"];
                        match delta["type"].as_str() {
                            Some("text_delta") => {
                                delta["text"].as_str().map(|t| Fragment::Text(t.to_string()))
                            }
                            Some("thinking_delta") => delta["thinking"]
                                .as_str()
                                .map(|t| Fragment::Reasoning(t.to_string())),
                            Some("input_json_delta") => {
                                if let (Some(pending), Some(partial)) =
                                    (tool_use.as_mut(), delta["partial_json"].as_str())
                                {
                                    pending.input.push_str(partial);
                                }
                                None
                            }
                            _ => None,
                        }
                    }
                    Some("content_block_stop") => tool_use.take().map(|pending| {
                        let arguments = if pending.input.is_empty() {
                            "{}".to_string()
                        } else {
                            pending.input
                        };
                        Fragment::ToolCall(ToolCall {
                            id: Some(pending.id),
                            r#type: Some("function".to_string()),
                            function: FunctionCall {
                                name: pending.name,
                                arguments,
                            },
                        })
                    }),
                    Some("error") => {
                        return Err(LlmError::Api(json["error"]["message"]
                            .as_str()
                            .unwrap_or("stream error")
                            .to_string()));
                    }
                    _ => None,
                };

                if let Some(fragment) = fragment {
                    if tx.send(fragment).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}
