//! Render model for a single chat message.
//!
//! `render_message` is pure; `MessageRenderer` adds the memo guard that skips
//! re-rendering while the visible parts of a message are unchanged.

use serde::Serialize;

use crate::chat::{ToolInvocation, ToolInvocationState, UiMessage};
use crate::db::Role;

/// Tools whose pending invocations render as a loading skeleton.
pub const SKELETON_TOOLS: &[&str] = &["get_weather"];

pub const THINKING_TEXT: &str = "Thinking...";

#[derive(Debug, Clone, PartialEq)]
pub struct RenderProps {
    pub chat_id: String,
    pub message: UiMessage,
    pub is_loading: bool,
    pub is_readonly: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    View,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningView {
    pub text: String,
    pub is_loading: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub markdown: String,
    /// Shows the edit affordance.
    pub editable: bool,
    /// User messages render on a highlighted bubble.
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorView {
    pub message_id: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ToolView {
    #[serde(rename_all = "camelCase")]
    Pending {
        tool_call_id: String,
        tool_name: String,
        skeleton: bool,
    },
    #[serde(rename_all = "camelCase")]
    Resolved {
        tool_call_id: String,
        result: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageActions {
    pub chat_id: String,
    pub message_id: Option<String>,
    pub is_loading: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedMessage {
    pub role: Role,
    pub mode: DisplayMode,
    pub show_avatar: bool,
    pub reasoning: Option<ReasoningView>,
    pub body: Option<MessageBody>,
    pub editor: Option<EditorView>,
    pub tools: Vec<ToolView>,
    pub actions: Option<MessageActions>,
}

fn tool_view(invocation: &ToolInvocation) -> ToolView {
    match invocation.state {
        ToolInvocationState::Result => ToolView::Resolved {
            tool_call_id: invocation.tool_call_id.clone(),
            result: invocation.result.clone().unwrap_or_default(),
        },
        ToolInvocationState::PartialCall | ToolInvocationState::Call => ToolView::Pending {
            tool_call_id: invocation.tool_call_id.clone(),
            tool_name: invocation.tool_name.clone(),
            skeleton: SKELETON_TOOLS.contains(&invocation.tool_name.as_str()),
        },
    }
}

pub fn render_message(props: &RenderProps, mode: DisplayMode) -> RenderedMessage {
    let message = &props.message;
    let is_user = message.role == Role::User;
    let reasoning = message.reasoning.as_deref().filter(|r| !r.is_empty());

    let body = (mode == DisplayMode::View && (!message.content.is_empty() || reasoning.is_some()))
        .then(|| MessageBody {
            markdown: message.content.clone(),
            editable: is_user && !props.is_readonly,
            highlighted: is_user,
        });

    let editor = (mode == DisplayMode::Edit && !message.content.is_empty()).then(|| EditorView {
        message_id: message.id.clone(),
        content: message.content.clone(),
    });

    RenderedMessage {
        role: message.role,
        mode,
        show_avatar: message.role == Role::Assistant,
        reasoning: reasoning.map(|text| ReasoningView {
            text: text.to_string(),
            is_loading: props.is_loading,
        }),
        body,
        editor,
        tools: message
            .tool_invocations
            .iter()
            .flatten()
            .map(tool_view)
            .collect(),
        actions: (!props.is_readonly).then(|| MessageActions {
            chat_id: props.chat_id.clone(),
            message_id: message.id.clone(),
            is_loading: props.is_loading,
        }),
    }
}

/// Whether a re-render can be skipped. Only the loading flag, reasoning,
/// content and tool invocations are compared.
pub fn props_equal(prev: &RenderProps, next: &RenderProps) -> bool {
    prev.is_loading == next.is_loading
        && prev.message.reasoning == next.message.reasoning
        && prev.message.content == next.message.content
        && prev.message.tool_invocations == next.message.tool_invocations
}

/// The assistant placeholder shown until the first fragment arrives.
pub fn thinking_placeholder() -> RenderedMessage {
    RenderedMessage {
        role: Role::Assistant,
        mode: DisplayMode::View,
        show_avatar: true,
        reasoning: None,
        body: Some(MessageBody {
            markdown: THINKING_TEXT.to_string(),
            editable: false,
            highlighted: false,
        }),
        editor: None,
        tools: Vec::new(),
        actions: None,
    }
}

struct Rendered {
    props: RenderProps,
    mode: DisplayMode,
    output: RenderedMessage,
}

/// Memoizing wrapper around `render_message`.
#[derive(Default)]
pub struct MessageRenderer {
    last: Option<Rendered>,
    render_count: usize,
}

impl MessageRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, props: &RenderProps, mode: DisplayMode) -> &RenderedMessage {
        let reuse = matches!(
            &self.last,
            Some(last) if last.mode == mode && props_equal(&last.props, props)
        );

        if !reuse {
            self.render_count += 1;
            self.last = None;
        }

        &self
            .last
            .get_or_insert_with(|| Rendered {
                props: props.clone(),
                mode,
                output: render_message(props, mode),
            })
            .output
    }

    /// How many times the message was actually rendered.
    pub fn render_count(&self) -> usize {
        self.render_count
    }
}
