pub mod history;
pub mod message;
pub mod sanitize;
pub mod smooth;
pub mod source;
pub mod title;

pub use message::{ToolInvocation, ToolInvocationState, UiMessage};
pub use source::{
    generate_id, FinishReason, FinishedTurn, ModelStreamSource, ProviderStreamSource,
    ResponseMessage, StreamEvent, StreamRequest,
};
pub use title::{LlmTitleGenerator, TitleGenerator};
