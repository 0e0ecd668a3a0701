use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::json;
use std::collections::BTreeMap;
use tokio::sync::mpsc::Sender;

use crate::llm::lines::{sse_data, LineBuffer};
use crate::llm::{
    models::{ChatOptions, ChatResponse, Fragment, FunctionCall, Message, ToolCall, Usage},
    LlmError, LlmProvider,
};

/// Works against OpenAI and any OpenAI-compatible endpoint (DeepSeek, vLLM, ...).
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiProvider {
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

        let mut final_messages: Vec<Message> = messages.to_vec();
        if let Some(system) = &options.system_prompt {
            final_messages.insert(0, Message::new("system", system.clone()));
        }

        let mut body = json!({
            "model": model,
            "messages": final_messages,
            "stream": stream,
        });

        let max_tokens = options.max_tokens.unwrap_or(4096);
        // Reasoning models reject sampling parameters and `max_tokens`.
        if options.reasoning {
            body["max_completion_tokens"] = json!(max_tokens);
        } else {
            body["max_tokens"] = json!(max_tokens);
            body["temperature"] = json!(options.temperature.unwrap_or(0.7));
        }
        if let Some(tools) = options.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = json!(tools);
        }
        body
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
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
            return Err(LlmError::Api(format!("OpenAI Error {}: {}", status, text)));
        }
        Ok(response)
    }
}

/// Tool call deltas arrive in pieces keyed by `index`.
#[derive(Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

fn apply_tool_call_deltas(deltas: &serde_json::Value, calls: &mut BTreeMap<u64, PartialToolCall>) {
    let Some(deltas) = deltas.as_array() else {
        return;
    };
    for delta in deltas {
        let index = delta["index"].as_u64().unwrap_or(0);
        let entry = calls.entry(index).or_default();
        if let Some(id) = delta["id"].as_str() {
            entry.id = Some(id.to_string());
        }
        if let Some(name) = delta["function"]["name"].as_str() {
            entry.name.push_str(name);
        }
        if let Some(args) = delta["function"]["arguments"].as_str() {
            entry.arguments.push_str(args);
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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

        let message = &json["choices"][0]["message"];
        if message.is_null() {
            return Err(LlmError::InvalidRequest);
        }
        let content = message["content"].as_str().unwrap_or_default().to_string();
        let tool_calls: Option<Vec<ToolCall>> = message
            .get("tool_calls")
            .and_then(|tc| serde_json::from_value(tc.clone()).ok());

        let usage = json.get("usage").map(|u| Usage {
            input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(ChatResponse {
            content,
            model: json["model"].as_str().unwrap_or(&self.default_model).to_string(),
            usage,
            tool_calls,
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
        let mut tool_calls: BTreeMap<u64, PartialToolCall> = BTreeMap::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            for line in lines.push(&bytes) {
                let Some(data) = sse_data(line.trim()) else {
                    continue;
                };
                if data == "[DONE]" {
                    continue;
                }
                let Ok(json) = serde_json::from_str::<serde_json::Value>(data) else {
                    continue;
                };
                let delta = &json["choices"][0]["delta"];

                // DeepSeek uses `reasoning_content`, OpenRouter and vLLM `reasoning`.
                let reasoning = delta["reasoning_content"]
                    .as_str()
                    .or_else(|| delta["reasoning"].as_str());
                if let Some(reasoning) = reasoning.filter(|r| !r.is_empty()) {
                    if tx.send(Fragment::Reasoning(reasoning.to_string())).await.is_err() {
                        return Ok(());
                    }
                }
                if let Some(content) = delta["content"].as_str().filter(|c| !c.is_empty()) {
                    if tx.send(Fragment::Text(content.to_string())).await.is_err() {
                        return Ok(());
                    }
                }
                apply_tool_call_deltas(&delta["tool_calls"], &mut tool_calls);
            }
        }

        for call in tool_calls.into_values() {
            let fragment = Fragment::ToolCall(ToolCall {
                id: call.id,
                r#type: Some("function".to_string()),
                function: FunctionCall {
                    name: call.name,
                    arguments: call.arguments,
                },
            });
            if tx.send(fragment).await.is_err() {
                return Ok(());
            }
        }

        Ok(())
    }
}
