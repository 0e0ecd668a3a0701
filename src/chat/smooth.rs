use regex::Regex;
use std::sync::LazyLock;

/// A word followed by the whitespace after it.
static WORD_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\S+\s+").ok());

/// Re-chunks streamed text on word boundaries.
///
/// A chunk is released once it holds a whole word followed by whitespace;
/// the trailing partial word waits for the next delta or for `flush`.
#[derive(Debug, Default)]
pub struct WordSmoother {
    buffer: String,
}

impl WordSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);

        let mut chunks = Vec::new();
        while let Some(end) = word_boundary(&self.buffer) {
            let rest = self.buffer.split_off(end);
            chunks.push(std::mem::replace(&mut self.buffer, rest));
        }
        chunks
    }

    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Byte offset just past the first `\S+\s+` run (leading whitespace included).
fn word_boundary(text: &str) -> Option<usize> {
    WORD_PATTERN.as_ref()?.find(text).map(|m| m.end())
}
