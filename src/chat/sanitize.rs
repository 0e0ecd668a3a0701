use std::collections::HashSet;

use crate::chat::source::ResponseMessage;
use crate::db::models::{ContentPart, MessageContent, Role};

/// Cleans the finalized messages of a turn before they are stored.
///
/// Assistant messages lose tool calls that never got a result and empty text
/// parts, and gain the turn's reasoning. Messages left with no content are
/// dropped. Plain-text content and non-assistant messages pass unchanged.
pub fn sanitize_response_messages(
    messages: Vec<ResponseMessage>,
    reasoning: Option<&str>,
) -> Vec<ResponseMessage> {
    let answered: HashSet<String> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| match &m.content {
            MessageContent::Parts(parts) => Some(parts),
            MessageContent::Text(_) => None,
        })
        .flatten()
        .filter_map(|part| match part {
            ContentPart::ToolResult { tool_call_id, .. } => Some(tool_call_id.clone()),
            _ => None,
        })
        .collect();

    let reasoning = reasoning.filter(|r| !r.is_empty());

    messages
        .into_iter()
        .map(|message| {
            let MessageContent::Parts(parts) = message.content else {
                return message;
            };
            if message.role != Role::Assistant {
                return ResponseMessage {
                    content: MessageContent::Parts(parts),
                    ..message
                };
            }

            let mut parts: Vec<ContentPart> = parts
                .into_iter()
                .filter(|part| match part {
                    ContentPart::ToolCall { tool_call_id, .. } => answered.contains(tool_call_id),
                    ContentPart::Text { text } => !text.is_empty(),
                    _ => true,
                })
                .collect();
            if let Some(reasoning) = reasoning {
                parts.push(ContentPart::Reasoning {
                    reasoning: reasoning.to_string(),
                });
            }
            ResponseMessage {
                content: MessageContent::Parts(parts),
                ..message
            }
        })
        .filter(|message| !message.content.is_empty())
        .collect()
}
