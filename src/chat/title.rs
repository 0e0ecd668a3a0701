use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::chat::message::UiMessage;
use crate::llm::models::{ChatOptions, Message as LlmMessage};
use crate::llm::LlmProvider;

pub const MAX_TITLE_CHARS: usize = 80;

const TITLE_PROMPT: &str = "\
- you will generate a short title based on the first message a user begins a conversation with
- ensure it is not more than 80 characters long
- the title should be a summary of the user's message
- do not use quotes or colons";

#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate(&self, message: &UiMessage) -> String;
}

/// Asks the model for a title, falling back to the message text itself.
pub struct LlmTitleGenerator {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
}

impl LlmTitleGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: Option<String>) -> Self {
        Self { provider, model }
    }
}

#[async_trait]
impl TitleGenerator for LlmTitleGenerator {
    async fn generate(&self, message: &UiMessage) -> String {
        let options = ChatOptions {
            model: self.model.clone(),
            system_prompt: Some(TITLE_PROMPT.to_string()),
            max_tokens: Some(64),
            ..Default::default()
        };
        let request = [LlmMessage::new("user", message.content.clone())];

        match self.provider.chat(&request, options).await {
            Ok(response) => {
                let title = clean_title(&response.content);
                if title.is_empty() {
                    fallback_title(&message.content)
                } else {
                    title
                }
            }
            Err(e) => {
                warn!("Title generation failed, using message text: {}", e);
                fallback_title(&message.content)
            }
        }
    }
}

/// Strips quotes and colons and caps the length.
pub fn clean_title(raw: &str) -> String {
    let cleaned: String = raw
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | ':' | '`'))
        .collect();
    truncate(cleaned.trim())
}

pub fn fallback_title(content: &str) -> String {
    let title = clean_title(content);
    if title.is_empty() {
        "New Chat".to_string()
    } else {
        title
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string()
}
