//! Line-oriented data stream understood by the `ai` SDK's `useChat` hook.
//!
//! Every part is written as `<code>:<json>\n`; `0` carries text, `g`
//! reasoning, `9`/`a` tool calls and results, `f`/`e` step boundaries, `d`
//! the end of the message and `3` an error.

use serde::Serialize;
use serde_json::json;

use crate::chat::FinishReason;

pub const STREAM_HEADER: (&str, &str) = ("x-vercel-ai-data-stream", "v1");

#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    Text(String),
    Reasoning(String),
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        result: serde_json::Value,
    },
    StartStep {
        message_id: String,
    },
    FinishStep {
        finish_reason: FinishReason,
        is_continued: bool,
    },
    FinishMessage {
        finish_reason: FinishReason,
    },
    Error(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

const NO_USAGE: Usage = Usage {
    prompt_tokens: 0,
    completion_tokens: 0,
};

impl StreamPart {
    pub fn code(&self) -> char {
        match self {
            StreamPart::Text(_) => '0',
            StreamPart::Reasoning(_) => 'g',
            StreamPart::ToolCall { .. } => '9',
            StreamPart::ToolResult { .. } => 'a',
            StreamPart::StartStep { .. } => 'f',
            StreamPart::FinishStep { .. } => 'e',
            StreamPart::FinishMessage { .. } => 'd',
            StreamPart::Error(_) => '3',
        }
    }

    fn payload(&self) -> serde_json::Value {
        match self {
            StreamPart::Text(text) | StreamPart::Reasoning(text) | StreamPart::Error(text) => {
                json!(text)
            }
            StreamPart::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => json!({ "toolCallId": tool_call_id, "toolName": tool_name, "args": args }),
            StreamPart::ToolResult { tool_call_id, result } => {
                json!({ "toolCallId": tool_call_id, "result": result })
            }
            StreamPart::StartStep { message_id } => json!({ "messageId": message_id }),
            StreamPart::FinishStep {
                finish_reason,
                is_continued,
            } => json!({
                "finishReason": finish_reason,
                "usage": NO_USAGE,
                "isContinued": is_continued,
            }),
            StreamPart::FinishMessage { finish_reason } => {
                json!({ "finishReason": finish_reason, "usage": NO_USAGE })
            }
        }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}\n", self.code(), self.payload())
    }
}
