#[cfg(test)]
mod tests {
    use chatwire::chat::{ToolInvocation, ToolInvocationState, UiMessage};
    use chatwire::db::Role;
    use chatwire::render::{
        props_equal, render_message, thinking_placeholder, DisplayMode, MessageRenderer,
        RenderProps, ToolView,
    };
    use serde_json::json;

    fn props(message: UiMessage) -> RenderProps {
        RenderProps {
            chat_id: "c1".to_string(),
            message,
            is_loading: false,
            is_readonly: false,
        }
    }

    fn assistant(content: &str) -> UiMessage {
        UiMessage {
            id: Some("a1".to_string()),
            role: Role::Assistant,
            ..UiMessage::user(content)
        }
    }

    fn invocation(id: &str, name: &str, state: ToolInvocationState) -> ToolInvocation {
        ToolInvocation {
            state,
            tool_call_id: id.to_string(),
            tool_name: name.to_string(),
            args: json!({}),
            result: (state == ToolInvocationState::Result).then(|| json!({"temperature": 20})),
        }
    }

    #[test]
    fn test_user_message_in_view_mode() {
        let mut message = UiMessage::user("**hi**");
        message.id = Some("u1".to_string());
        let out = render_message(&props(message), DisplayMode::View);

        assert!(!out.show_avatar);
        assert!(out.reasoning.is_none());
        let body = out.body.unwrap();
        assert_eq!(body.markdown, "**hi**");
        assert!(body.editable);
        assert!(body.highlighted);
        assert!(out.editor.is_none());
        let actions = out.actions.unwrap();
        assert_eq!(actions.chat_id, "c1");
        assert_eq!(actions.message_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_readonly_hides_edit_and_actions() {
        let mut p = props(UiMessage::user("hi"));
        p.is_readonly = true;
        let out = render_message(&p, DisplayMode::View);

        assert!(!out.body.unwrap().editable);
        assert!(out.actions.is_none());
    }

    #[test]
    fn test_assistant_with_reasoning() {
        let mut message = assistant("");
        message.reasoning = Some("pondering".to_string());
        let mut p = props(message);
        p.is_loading = true;
        let out = render_message(&p, DisplayMode::View);

        assert!(out.show_avatar);
        let reasoning = out.reasoning.unwrap();
        assert_eq!(reasoning.text, "pondering");
        assert!(reasoning.is_loading);
        let body = out.body.unwrap();
        assert!(!body.editable);
        assert!(!body.highlighted);
    }

    #[test]
    fn test_empty_message_has_no_body() {
        let out = render_message(&props(assistant("")), DisplayMode::View);
        assert!(out.body.is_none());
    }

    #[test]
    fn test_edit_mode_shows_editor() {
        let mut message = UiMessage::user("fix me");
        message.id = Some("u7".to_string());
        let out = render_message(&props(message), DisplayMode::Edit);

        assert!(out.body.is_none());
        let editor = out.editor.unwrap();
        assert_eq!(editor.message_id.as_deref(), Some("u7"));
        assert_eq!(editor.content, "fix me");

        let empty = render_message(&props(UiMessage::user("")), DisplayMode::Edit);
        assert!(empty.editor.is_none());
    }

    #[test]
    fn test_tool_invocations() {
        let mut message = assistant("");
        message.tool_invocations = Some(vec![
            invocation("t1", "get_weather", ToolInvocationState::Call),
            invocation("t2", "other", ToolInvocationState::PartialCall),
            invocation("t3", "get_weather", ToolInvocationState::Result),
        ]);
        let out = render_message(&props(message), DisplayMode::View);

        assert_eq!(
            out.tools,
            vec![
                ToolView::Pending {
                    tool_call_id: "t1".to_string(),
                    tool_name: "get_weather".to_string(),
                    skeleton: true,
                },
                ToolView::Pending {
                    tool_call_id: "t2".to_string(),
                    tool_name: "other".to_string(),
                    skeleton: false,
                },
                ToolView::Resolved {
                    tool_call_id: "t3".to_string(),
                    result: json!({"temperature": 20}),
                },
            ]
        );
    }

    #[test]
    fn test_props_equal_ignores_chat_and_readonly() {
        let a = props(assistant("same"));
        let mut b = a.clone();
        b.chat_id = "other".to_string();
        b.is_readonly = true;
        assert!(props_equal(&a, &b));

        let mut c = a.clone();
        c.is_loading = true;
        assert!(!props_equal(&a, &c));

        let mut d = a.clone();
        d.message.tool_invocations =
            Some(vec![invocation("t1", "get_weather", ToolInvocationState::Call)]);
        assert!(!props_equal(&a, &d));
    }

    #[test]
    fn test_renderer_suppresses_identical_renders() {
        let mut renderer = MessageRenderer::new();
        let p = props(assistant("hello"));

        let first = renderer.render(&p, DisplayMode::View).clone();
        let second = renderer.render(&p.clone(), DisplayMode::View).clone();
        assert_eq!(renderer.render_count(), 1);
        assert_eq!(first, second);

        let mut streamed = p.clone();
        streamed.message.content.push_str(" world");
        let third = renderer.render(&streamed, DisplayMode::View).clone();
        assert_eq!(renderer.render_count(), 2);
        assert_eq!(third.body.unwrap().markdown, "hello world");

        renderer.render(&streamed, DisplayMode::Edit);
        assert_eq!(renderer.render_count(), 3);
    }

    #[test]
    fn test_thinking_placeholder() {
        let out = thinking_placeholder();
        assert_eq!(out.role, Role::Assistant);
        assert!(out.show_avatar);
        assert_eq!(out.body.unwrap().markdown, "Thinking...");
        assert!(out.actions.is_none());
    }
}
