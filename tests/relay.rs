#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use chatwire::api::relay::{relay_turn, RelaySettings};
    use chatwire::chat::{FinishReason, FinishedTurn, ResponseMessage, StreamEvent};
    use chatwire::db::{Chat, ChatStore, ContentPart, Message, MessageContent, Role, StoreError};
    use chatwire::llm::models::Fragment;
    use futures_util::StreamExt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    #[derive(Default)]
    struct SavedMessages {
        saved: Mutex<Vec<Message>>,
    }

    impl SavedMessages {
        fn saved(&self) -> Vec<Message> {
            self.saved.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatStore for SavedMessages {
        async fn get_chat(&self, _id: &str) -> Result<Option<Chat>, StoreError> {
            Ok(None)
        }

        async fn save_chat(&self, _chat: &Chat) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_chat(&self, _id: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn save_messages(&self, messages: &[Message]) -> Result<(), StoreError> {
            self.saved.lock().unwrap().extend_from_slice(messages);
            Ok(())
        }

        async fn has_message(&self, id: &str) -> Result<bool, StoreError> {
            Ok(self.saved().iter().any(|m| m.id == id))
        }

        async fn get_messages(&self, _chat_id: &str) -> Result<Vec<Message>, StoreError> {
            Ok(self.saved())
        }

        async fn list_chats(
            &self,
            _owner_id: &str,
            _limit: usize,
            _offset: usize,
        ) -> Result<Vec<Chat>, StoreError> {
            Ok(Vec::new())
        }
    }

    const ERROR_MESSAGE: &str = "Something went wrong";

    fn settings(deadline: Instant) -> RelaySettings {
        RelaySettings {
            deadline,
            chunk_delay: Duration::ZERO,
            error_message: ERROR_MESSAGE.to_string(),
        }
    }

    fn finished(text: &str) -> StreamEvent {
        StreamEvent::Finished(FinishedTurn {
            messages: vec![ResponseMessage {
                id: "msg-1".to_string(),
                role: Role::Assistant,
                content: MessageContent::Parts(vec![ContentPart::Text {
                    text: text.to_string(),
                }]),
            }],
            reasoning: None,
        })
    }

    fn lines(chunks: Vec<Result<Bytes, actix_web::Error>>) -> Vec<String> {
        chunks
            .into_iter()
            .map(|chunk| String::from_utf8(chunk.unwrap().to_vec()).unwrap())
            .flat_map(|chunk| chunk.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_ends_a_silent_stream_with_one_error_part() {
        let store = Arc::new(SavedMessages::default());
        let (tx, rx) = mpsc::channel(100);

        let body = relay_turn(
            rx,
            store.clone(),
            "c1".to_string(),
            settings(Instant::now() + Duration::from_secs(60)),
        );
        let lines = lines(body.collect().await);

        assert_eq!(lines, vec![format!("3:\"{}\"", ERROR_MESSAGE)]);
        assert!(store.saved().is_empty());
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_flushes_pending_text_before_the_error() {
        let store = Arc::new(SavedMessages::default());
        let (tx, rx) = mpsc::channel(100);
        tx.send(StreamEvent::StepStart {
            message_id: "msg-1".to_string(),
        })
        .await
        .unwrap();
        tx.send(StreamEvent::Fragment(Fragment::Text("Hello wor".to_string())))
            .await
            .unwrap();

        let body = relay_turn(
            rx,
            store.clone(),
            "c1".to_string(),
            settings(Instant::now() + Duration::from_secs(60)),
        );
        let lines = lines(body.collect().await);

        assert_eq!(
            lines,
            vec![
                r#"f:{"messageId":"msg-1"}"#.to_string(),
                r#"0:"Hello ""#.to_string(),
                r#"0:"wor""#.to_string(),
                format!("3:\"{}\"", ERROR_MESSAGE),
            ]
        );
        assert!(!lines.iter().any(|l| l.starts_with("d:")));
        assert!(store.saved().is_empty());
        drop(tx);
    }

    #[tokio::test]
    async fn test_finished_turn_is_saved_before_the_finish_part() {
        let store = Arc::new(SavedMessages::default());
        let (tx, rx) = mpsc::channel(100);
        tx.send(StreamEvent::Fragment(Fragment::Text("Hi".to_string())))
            .await
            .unwrap();
        tx.send(StreamEvent::StepFinish {
            finish_reason: FinishReason::Stop,
            is_continued: false,
        })
        .await
        .unwrap();
        tx.send(finished("Hi")).await.unwrap();
        drop(tx);

        let body = relay_turn(
            rx,
            store.clone(),
            "c1".to_string(),
            settings(Instant::now() + Duration::from_secs(60)),
        );
        let lines = lines(body.collect().await);

        assert!(lines.last().unwrap().starts_with("d:{"));
        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, "msg-1");
        assert_eq!(saved[0].chat_id, "c1");
    }

    #[tokio::test]
    async fn test_dropped_body_stops_the_turn_without_saving() {
        let store = Arc::new(SavedMessages::default());
        let (tx, rx) = mpsc::channel(100);
        tx.send(StreamEvent::StepStart {
            message_id: "msg-1".to_string(),
        })
        .await
        .unwrap();
        tx.send(StreamEvent::Fragment(Fragment::Text("partial answ".to_string())))
            .await
            .unwrap();

        let body = relay_turn(
            rx,
            store.clone(),
            "c1".to_string(),
            settings(Instant::now() + Duration::from_secs(60)),
        );
        let mut body = Box::pin(body);
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from("f:{\"messageId\":\"msg-1\"}\n"));

        // The client goes away before the model finishes.
        drop(body);

        assert!(tx.is_closed());
        assert!(tx.send(finished("partial answer")).await.is_err());
        assert!(store.saved().is_empty());
    }
}
