//! Retrieval-augmented answering: retrieve, fill the prompt, ask the model.

pub mod anthropic;
pub mod generator;
pub mod prompt;

pub use anthropic::AnthropicClient;
pub use generator::{Answer, AnswerGenerator};
pub use prompt::PromptTemplate;
