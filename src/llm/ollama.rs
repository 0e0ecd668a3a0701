use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc::Sender;

use crate::llm::lines::LineBuffer;
use crate::llm::{
    models::{ChatOptions, ChatResponse, Fragment, FunctionCall, Message, ToolCall, Usage},
    LlmError, LlmProvider,
};

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaProvider {
    pub fn new(base_url: String, default_model: String) -> Self {
        Self {
            client: Client::new(),
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

        let mut final_messages: Vec<serde_json::Value> = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = &options.system_prompt {
            final_messages.push(json!({ "role": "system", "content": system }));
        }
        final_messages.extend(messages.iter().map(to_ollama_message));

        let mut body = json!({
            "model": model,
            "messages": final_messages,
            "stream": stream,
            "options": {
                "temperature": options.temperature.unwrap_or(0.7),
                "num_predict": options.max_tokens.unwrap_or(4096)
            }
        });

        if options.reasoning {
            body["think"] = json!(true);
        }
        if let Some(tools) = options.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = json!(tools);
        }
        body
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("Ollama Error {}: {}", status, text)));
        }
        Ok(response)
    }
}

/// Ollama takes tool arguments as objects rather than JSON strings.
fn to_ollama_message(m: &Message) -> serde_json::Value {
    let mut message = json!({ "role": m.role, "content": m.content });
    if let Some(calls) = &m.tool_calls {
        message["tool_calls"] = calls
            .iter()
            .map(|c| {
                json!({
                    "function": { "name": c.function.name, "arguments": c.arguments_json() }
                })
            })
            .collect();
    }
    message
}

fn parse_tool_calls(message: &serde_json::Value) -> Vec<ToolCall> {
    message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    let function = &c["function"];
                    let name = function["name"].as_str()?.to_string();
                    let arguments = match &function["arguments"] {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    Some(ToolCall {
                        id: c["id"].as_str().map(str::to_string),
                        r#type: Some("function".to_string()),
                        function: FunctionCall { name, arguments },
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
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

        let message = &json["message"];
        if message.is_null() {
            return Err(LlmError::InvalidRequest);
        }
        let tool_calls = parse_tool_calls(message);

        let usage = json.get("eval_count").map(|eval| Usage {
            input_tokens: json["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
            output_tokens: eval.as_u64().unwrap_or(0) as u32,
        });

        Ok(ChatResponse {
            content: message["content"].as_str().unwrap_or_default().to_string(),
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

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            for line in lines.push(&bytes) {
                if line.trim().is_empty() {
                    continue;
                }
                let Ok(json) = serde_json::from_str::<serde_json::Value>(&line) else {
                    continue;
                };
                if let Some(error) = json["error"].as_str() {
                    return Err(LlmError::Api(error.to_string()));
                }

                let message = &json["message"];
                let mut fragments = Vec::new();
                if let Some(thinking) = message["thinking"].as_str().filter(|t| !t.is_empty()) {
                    fragments.push(Fragment::Reasoning(thinking.to_string()));
                }
                if let Some(content) = message["content"].as_str().filter(|c| !c.is_empty()) {
                    fragments.push(Fragment::Text(content.to_string()));
                }
                fragments.extend(parse_tool_calls(message).into_iter().map(Fragment::ToolCall));

                for fragment in fragments {
                    if tx.send(fragment).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}
