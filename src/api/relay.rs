//! Turns model stream events into data-stream parts and stores the
//! finished turn.

use bytes::Bytes;
use chrono::Utc;
use futures_util::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::api::data_stream::StreamPart;
use crate::chat::sanitize::sanitize_response_messages;
use crate::chat::smooth::WordSmoother;
use crate::chat::{FinishReason, FinishedTurn, StreamEvent};
use crate::db::{ChatStore, Message};
use crate::llm::models::Fragment;

pub struct RelaySettings {
    pub deadline: Instant,
    pub chunk_delay: Duration,
    pub error_message: String,
}

/// Word-smooths text and reasoning, flushing one kind before the other is
/// emitted so interleaved output keeps its order.
#[derive(Default)]
struct PartSmoother {
    text: WordSmoother,
    reasoning: WordSmoother,
}

impl PartSmoother {
    fn text(&mut self, delta: &str) -> Vec<StreamPart> {
        let mut parts: Vec<StreamPart> =
            self.reasoning.flush().map(StreamPart::Reasoning).into_iter().collect();
        parts.extend(self.text.push(delta).into_iter().map(StreamPart::Text));
        parts
    }

    fn reasoning(&mut self, delta: &str) -> Vec<StreamPart> {
        let mut parts: Vec<StreamPart> =
            self.text.flush().map(StreamPart::Text).into_iter().collect();
        parts.extend(self.reasoning.push(delta).into_iter().map(StreamPart::Reasoning));
        parts
    }

    fn flush(&mut self) -> Vec<StreamPart> {
        let reasoning = self.reasoning.flush().map(StreamPart::Reasoning);
        let text = self.text.flush().map(StreamPart::Text);
        reasoning.into_iter().chain(text).collect()
    }
}

enum Step {
    Emit(Vec<StreamPart>),
    Finish(Vec<StreamPart>, FinishedTurn),
    Fail(Vec<StreamPart>),
}

fn on_event(smoother: &mut PartSmoother, event: StreamEvent) -> Step {
    let parts_after_flush = |smoother: &mut PartSmoother, part: StreamPart| {
        let mut parts = smoother.flush();
        parts.push(part);
        parts
    };

    match event {
        StreamEvent::Fragment(Fragment::Text(delta)) => Step::Emit(smoother.text(&delta)),
        StreamEvent::Fragment(Fragment::Reasoning(delta)) => Step::Emit(smoother.reasoning(&delta)),
        StreamEvent::Fragment(Fragment::ToolCall(call)) => {
            let part = StreamPart::ToolCall {
                tool_call_id: call.id.clone().unwrap_or_default(),
                tool_name: call.function.name.clone(),
                args: call.arguments_json(),
            };
            Step::Emit(parts_after_flush(smoother, part))
        }
        StreamEvent::ToolResult {
            tool_call_id,
            result,
            ..
        } => Step::Emit(parts_after_flush(
            smoother,
            StreamPart::ToolResult { tool_call_id, result },
        )),
        StreamEvent::StepStart { message_id } => {
            Step::Emit(parts_after_flush(smoother, StreamPart::StartStep { message_id }))
        }
        StreamEvent::StepFinish {
            finish_reason,
            is_continued,
        } => Step::Emit(parts_after_flush(
            smoother,
            StreamPart::FinishStep {
                finish_reason,
                is_continued,
            },
        )),
        StreamEvent::Finished(turn) => Step::Finish(smoother.flush(), turn),
        StreamEvent::Error(e) => {
            error!("Model stream error: {}", e);
            Step::Fail(smoother.flush())
        }
    }
}

/// Stores the sanitized turn. Failures are logged; the response that was
/// already streamed stays as it is.
pub async fn persist_turn(store: &dyn ChatStore, chat_id: &str, turn: FinishedTurn) {
    let sanitized = sanitize_response_messages(turn.messages, turn.reasoning.as_deref());
    let now = Utc::now();
    let rows: Vec<Message> = sanitized
        .into_iter()
        .map(|m| Message {
            reasoning: m.content.reasoning(),
            id: m.id,
            chat_id: chat_id.to_string(),
            role: m.role,
            content: m.content,
            created_at: now,
        })
        .collect();

    match store.save_messages(&rows).await {
        Ok(()) => info!("Saved {} response messages for chat {}", rows.len(), chat_id),
        Err(e) => error!("Failed to save chat {}: {}", chat_id, e),
    }
}

fn encode(part: &StreamPart) -> Result<Bytes, actix_web::Error> {
    Ok(Bytes::from(part.encode()))
}

/// The response body for one turn. Dropping it (client disconnect) drops
/// `events`, which stops the model stream before anything is persisted.
pub fn relay_turn(
    mut events: mpsc::Receiver<StreamEvent>,
    store: Arc<dyn ChatStore>,
    chat_id: String,
    settings: RelaySettings,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    async_stream::stream! {
        let mut smoother = PartSmoother::default();
        let mut finish_reason = FinishReason::Stop;

        loop {
            let event = match tokio::time::timeout_at(settings.deadline, events.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    warn!("Model stream for chat {} closed before finishing", chat_id);
                    for part in smoother.flush() {
                        yield encode(&part);
                    }
                    yield encode(&StreamPart::Error(settings.error_message.clone()));
                    break;
                }
                Err(_) => {
                    warn!("Chat {} exceeded the maximum request duration", chat_id);
                    for part in smoother.flush() {
                        yield encode(&part);
                    }
                    yield encode(&StreamPart::Error(settings.error_message.clone()));
                    break;
                }
            };

            if let StreamEvent::StepFinish { finish_reason: reason, .. } = &event {
                finish_reason = *reason;
            }

            match on_event(&mut smoother, event) {
                Step::Emit(parts) => {
                    for part in parts {
                        let paced = matches!(part, StreamPart::Text(_) | StreamPart::Reasoning(_));
                        if paced && !settings.chunk_delay.is_zero() {
                            tokio::time::sleep(settings.chunk_delay).await;
                        }
                        yield encode(&part);
                    }
                }
                Step::Finish(parts, turn) => {
                    for part in parts {
                        yield encode(&part);
                    }
                    persist_turn(store.as_ref(), &chat_id, turn).await;
                    yield encode(&StreamPart::FinishMessage { finish_reason });
                    break;
                }
                Step::Fail(parts) => {
                    for part in parts {
                        yield encode(&part);
                    }
                    yield encode(&StreamPart::Error(settings.error_message.clone()));
                    break;
                }
            }
        }
    }
}
