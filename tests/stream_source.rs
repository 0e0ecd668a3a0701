#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chatwire::chat::{
        generate_id, FinishReason, ModelStreamSource, ProviderStreamSource, StreamEvent,
        StreamRequest,
    };
    use chatwire::db::{ContentPart, MessageContent, Role};
    use chatwire::llm::models::{
        ChatOptions, ChatResponse, FunctionCall, FunctionDefinition, Fragment, Message, ToolCall,
        ToolDefinition,
    };
    use chatwire::llm::{LlmError, LlmProvider};
    use chatwire::tools::{Tool, ToolRegistry};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    enum Behaviour {
        Steps(Vec<Vec<Fragment>>),
        AlwaysCallTool,
        Fail,
        Endless,
    }

    struct FakeProvider {
        behaviour: Behaviour,
        seen: Mutex<Vec<(Vec<Message>, ChatOptions)>>,
    }

    impl FakeProvider {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                seen: Mutex::default(),
            })
        }

        fn seen(&self) -> Vec<(Vec<Message>, ChatOptions)> {
            self.seen.lock().unwrap().clone()
        }
    }

    fn echo_call(id: Option<&str>) -> Fragment {
        Fragment::ToolCall(ToolCall {
            id: id.map(str::to_string),
            r#type: Some("function".to_string()),
            function: FunctionCall {
                name: "echo".to_string(),
                arguments: r#"{"x":1}"#.to_string(),
            },
        })
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _options: ChatOptions,
        ) -> Result<ChatResponse, LlmError> {
            Err(LlmError::InvalidRequest)
        }

        async fn chat_streaming(
            &self,
            messages: &[Message],
            options: ChatOptions,
            tx: mpsc::Sender<Fragment>,
        ) -> Result<(), LlmError> {
            let step = {
                let mut seen = self.seen.lock().unwrap();
                seen.push((messages.to_vec(), options));
                seen.len() - 1
            };

            let fragments = match &self.behaviour {
                Behaviour::Steps(steps) => steps.get(step).cloned().unwrap_or_default(),
                Behaviour::AlwaysCallTool => vec![echo_call(None)],
                Behaviour::Fail => return Err(LlmError::Api("upstream 500".to_string())),
                Behaviour::Endless => loop {
                    if tx.send(Fragment::Text("tick ".to_string())).await.is_err() {
                        return Ok(());
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                },
            };

            for fragment in fragments {
                if tx.send(fragment).await.is_err() {
                    return Ok(());
                }
            }
            Ok(())
        }
    }

    struct EchoTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                r#type: "function".to_string(),
                function: FunctionDefinition {
                    name: "echo".to_string(),
                    description: "Echoes its arguments".to_string(),
                    parameters: json!({"type": "object"}),
                },
            }
        }

        async fn call(&self, arguments: &serde_json::Value) -> serde_json::Value {
            self.calls.fetch_add(1, Ordering::SeqCst);
            json!({ "echo": arguments })
        }
    }

    fn source(
        provider: Arc<FakeProvider>,
        max_steps: usize,
    ) -> (ProviderStreamSource, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let tools = ToolRegistry::with_tools(vec![Box::new(EchoTool {
            calls: calls.clone(),
        })]);
        (
            ProviderStreamSource::new(provider, Arc::new(tools), max_steps),
            calls,
        )
    }

    fn request(active_tools: &[&str]) -> StreamRequest {
        StreamRequest {
            model: "fake-model".to_string(),
            reasoning: false,
            system: "be brief".to_string(),
            messages: vec![Message::new("user", "weather?")],
            active_tools: active_tools.iter().map(|t| t.to_string()).collect(),
            id_generator: generate_id,
        }
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_tool_call_runs_a_second_step() {
        let provider = FakeProvider::new(Behaviour::Steps(vec![
            vec![Fragment::Text("Let me check. ".to_string()), echo_call(None)],
            vec![Fragment::Text("Done.".to_string())],
        ]));
        let (source, tool_calls) = source(provider.clone(), 5);

        let events = collect(source.stream(request(&["echo"]))).await;
        assert_eq!(tool_calls.load(Ordering::SeqCst), 1);

        assert!(matches!(events[0], StreamEvent::StepStart { .. }));
        assert_eq!(
            events[1],
            StreamEvent::Fragment(Fragment::Text("Let me check. ".to_string()))
        );
        let call_id = match &events[2] {
            StreamEvent::Fragment(Fragment::ToolCall(call)) => call.id.clone().unwrap(),
            other => panic!("expected a tool call, got {:?}", other),
        };
        assert_eq!(
            events[3],
            StreamEvent::ToolResult {
                tool_call_id: call_id.clone(),
                tool_name: "echo".to_string(),
                result: json!({"echo": {"x": 1}}),
            }
        );
        assert_eq!(
            events[4],
            StreamEvent::StepFinish {
                finish_reason: FinishReason::ToolCalls,
                is_continued: true,
            }
        );
        assert!(matches!(events[5], StreamEvent::StepStart { .. }));
        assert_eq!(
            events[7],
            StreamEvent::StepFinish {
                finish_reason: FinishReason::Stop,
                is_continued: false,
            }
        );

        let turn = match events.last() {
            Some(StreamEvent::Finished(turn)) => turn.clone(),
            other => panic!("expected the turn to finish, got {:?}", other),
        };
        let roles: Vec<Role> = turn.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(
            turn.messages[1].content,
            MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_call_id: call_id.clone(),
                tool_name: "echo".to_string(),
                result: json!({"echo": {"x": 1}}),
            }])
        );
        assert_eq!(turn.messages[2].content.text(), "Done.");
        assert!(turn.reasoning.is_none());

        // The second step sees the call and its result
        let seen = provider.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(seen[0].1.tools.as_ref().map(Vec::len), Some(1));
        let second = &seen[1].0;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, "assistant");
        assert_eq!(second[1].tool_calls.as_ref().unwrap()[0].id.as_deref(), Some(call_id.as_str()));
        assert_eq!(second[2].role, "tool");
        assert_eq!(second[2].tool_call_id.as_deref(), Some(call_id.as_str()));
    }

    #[tokio::test]
    async fn test_reasoning_is_collected_for_the_turn() {
        let provider = FakeProvider::new(Behaviour::Steps(vec![vec![
            Fragment::Reasoning("hmm ".to_string()),
            Fragment::Reasoning("ok".to_string()),
            Fragment::Text("42".to_string()),
        ]]));
        let (source, _) = source(provider, 5);

        let events = collect(source.stream(request(&[]))).await;
        match events.last() {
            Some(StreamEvent::Finished(turn)) => {
                assert_eq!(turn.reasoning.as_deref(), Some("hmm ok"));
                assert_eq!(turn.messages.len(), 1);
            }
            other => panic!("expected the turn to finish, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inactive_tool_is_not_executed() {
        let provider = FakeProvider::new(Behaviour::Steps(vec![
            vec![echo_call(Some("call-1"))],
            vec![Fragment::Text("Sorry.".to_string())],
        ]));
        let (source, tool_calls) = source(provider.clone(), 5);

        let events = collect(source.stream(request(&[]))).await;
        assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
        assert!(provider.seen()[0].1.tools.is_none());

        let result = events
            .iter()
            .find_map(|e| match e {
                StreamEvent::ToolResult { result, .. } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert!(result["error"].as_str().unwrap().contains("echo"));
    }

    #[tokio::test]
    async fn test_step_limit_ends_the_turn() {
        let provider = FakeProvider::new(Behaviour::AlwaysCallTool);
        let (source, tool_calls) = source(provider.clone(), 2);

        let events = collect(source.stream(request(&["echo"]))).await;
        assert_eq!(provider.seen().len(), 2);
        assert_eq!(tool_calls.load(Ordering::SeqCst), 2);

        let finishes: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::StepFinish { is_continued, .. } => Some(*is_continued),
                _ => None,
            })
            .collect();
        assert_eq!(finishes, vec![true, false]);
        assert!(matches!(events.last(), Some(StreamEvent::Finished(_))));
    }

    #[tokio::test]
    async fn test_provider_failure_is_reported() {
        let provider = FakeProvider::new(Behaviour::Fail);
        let (source, _) = source(provider, 5);

        let events = collect(source.stream(request(&["echo"]))).await;
        assert!(matches!(events.last(), Some(StreamEvent::Error(e)) if e.contains("upstream 500")));
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Finished(_))));
    }

    #[tokio::test]
    async fn test_dropping_the_receiver_stops_the_turn() {
        let provider = FakeProvider::new(Behaviour::Endless);
        let (source, tool_calls) = source(provider.clone(), 5);

        let mut rx = source.stream(request(&["echo"]));
        assert!(matches!(rx.recv().await, Some(StreamEvent::StepStart { .. })));
        assert!(matches!(rx.recv().await, Some(StreamEvent::Fragment(_))));
        drop(rx);

        // Only the test and the source keep the provider alive once both
        // spawned tasks have stopped.
        let stopped = tokio::time::timeout(Duration::from_secs(2), async {
            while Arc::strong_count(&provider) > 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(stopped.is_ok());
        assert_eq!(provider.seen().len(), 1);
        assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
    }
}
