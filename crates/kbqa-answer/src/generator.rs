use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use kbqa_core::error::Error;
use kbqa_core::traits::{ChunkRetriever, LanguageModel};
use kbqa_core::types::ScoredChunk;

use crate::prompt::PromptTemplate;

pub const DEFAULT_TOP_K: usize = 5;

/// Generated answer plus the chunks that were put in front of the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}

/// "Stuff" QA chain: every retrieved chunk goes into a single prompt.
pub struct AnswerGenerator {
    retriever: Box<dyn ChunkRetriever>,
    llm: Box<dyn LanguageModel>,
    template: PromptTemplate,
    top_k: usize,
}

impl AnswerGenerator {
    pub fn new(retriever: Box<dyn ChunkRetriever>, llm: Box<dyn LanguageModel>) -> Self {
        Self { retriever, llm, template: PromptTemplate::default(), top_k: DEFAULT_TOP_K }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize { self.top_k }

    /// Prompt that would be sent for `question` given `sources`.
    pub fn build_prompt(&self, question: &str, sources: &[ScoredChunk]) -> String {
        let context = sources.iter().map(|s| s.chunk.content.as_str()).collect::<Vec<_>>().join("\n\n");
        self.template.render(&context, question)
    }

    /// Retrieve, prompt, and return the model's answer. Retrieval and model
    /// errors are returned as-is; nothing is retried.
    pub fn ask(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::Operation("question is empty".to_string()).into());
        }
        let sources = self.retriever.retrieve(question, self.top_k)?;
        debug!(k = self.top_k, retrieved = sources.len(), "retrieved context");
        let prompt = self.build_prompt(question, &sources);
        let text = self.llm.complete(&prompt)?;
        info!(model = self.llm.id(), sources = sources.len(), "answered question");
        Ok(Answer { question: question.to_string(), text: text.trim().to_string(), sources })
    }
}
