use crate::chat::message::{ToolInvocationState, UiMessage};
use crate::db::models::Role;
use crate::llm::models::{FunctionCall, Message as LlmMessage, ToolCall};

/// Returns the last user-authored message, if any.
pub fn most_recent_user_message(messages: &[UiMessage]) -> Option<&UiMessage> {
    messages.iter().rev().find(|m| m.role == Role::User)
}

/// Converts client messages into the provider-facing history.
///
/// Resolved tool invocations on an assistant message expand into an
/// assistant turn carrying the calls followed by one `tool` message per
/// result. Invocations that never produced a result are dropped.
pub fn to_model_messages(messages: &[UiMessage]) -> Vec<LlmMessage> {
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        let resolved: Vec<_> = message
            .tool_invocations
            .iter()
            .flatten()
            .filter(|inv| inv.state == ToolInvocationState::Result)
            .collect();

        if message.role != Role::Assistant || resolved.is_empty() {
            if message.content.is_empty() && message.role == Role::Assistant {
                continue;
            }
            out.push(LlmMessage::new(message.role.as_str(), message.content.clone()));
            continue;
        }

        let mut assistant = LlmMessage::new("assistant", message.content.clone());
        assistant.tool_calls = Some(
            resolved
                .iter()
                .map(|inv| ToolCall {
                    id: Some(inv.tool_call_id.clone()),
                    r#type: Some("function".to_string()),
                    function: FunctionCall {
                        name: inv.tool_name.clone(),
                        arguments: inv.args.to_string(),
                    },
                })
                .collect(),
        );
        out.push(assistant);

        for inv in resolved {
            let mut result = LlmMessage::new(
                "tool",
                inv.result.as_ref().map(|r| r.to_string()).unwrap_or_default(),
            );
            result.tool_call_id = Some(inv.tool_call_id.clone());
            out.push(result);
        }
    }
    out
}
