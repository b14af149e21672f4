//! Wiring of configured components: the offline index build and the online
//! answer chain.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use kbqa_answer::{AnthropicClient, AnswerGenerator, PromptTemplate};
use kbqa_core::chunker::Chunker;
use kbqa_core::config::{resolve_with_base, AppConfig};
use kbqa_core::loader::DocumentLoader;
use kbqa_core::traits::{Embedder, LanguageModel};
use kbqa_embed::build_embedder;
use kbqa_vector::{IndexStats, Indexer, Retriever};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub documents: usize,
    pub stats: IndexStats,
}

/// The documents directory for an index build: a command-line argument is
/// expanded and resolved against `base_dir` like configured paths; without one
/// the configured directory is used.
pub fn resolve_docs_dir(config: &AppConfig, arg: Option<&str>) -> PathBuf {
    arg.map_or_else(|| config.docs_dir(), |dir| resolve_with_base(&config.base_dir, dir))
}

/// Load, chunk, embed and persist `docs_dir` into the configured index,
/// replacing any previous index.
pub fn build_index(config: &AppConfig, docs_dir: &Path) -> Result<IndexReport> {
    let embedder = build_embedder(&config.embedding)?;
    build_index_with(config, docs_dir, embedder)
}

pub fn build_index_with(config: &AppConfig, docs_dir: &Path, embedder: Box<dyn Embedder>) -> Result<IndexReport> {
    let documents = DocumentLoader::new(docs_dir).load()?;
    let chunks = Chunker::new(&config.chunking)?.split_documents(&documents);
    info!(documents = documents.len(), chunks = chunks.len(), "split documents");

    let stats = Indexer::new(config.index_dir(), &config.data.table, embedder)?
        .with_batch_size(config.embedding.batch_size)
        .build(&chunks)?;
    Ok(IndexReport { documents: documents.len(), stats })
}

/// An answer chain over an opened index.
pub struct Assistant {
    pub generator: AnswerGenerator,
    pub indexed_chunks: usize,
}

/// Open the index and connect the configured model.
pub fn build_generator(config: &AppConfig) -> Result<Assistant> {
    let llm = AnthropicClient::from_env(&config.llm)?;
    build_generator_with(config, build_embedder(&config.embedding)?, Box::new(llm))
}

pub fn build_generator_with(
    config: &AppConfig,
    embedder: Box<dyn Embedder>,
    llm: Box<dyn LanguageModel>,
) -> Result<Assistant> {
    let retriever = Retriever::open(&config.index_dir(), &config.data.table, embedder)?;
    let indexed_chunks = retriever.count();
    info!(chunks = indexed_chunks, "index loaded");
    let template = PromptTemplate::load(&config.prompt_path())?;
    let generator = AnswerGenerator::new(Box::new(retriever), llm)
        .with_template(template)
        .with_top_k(config.retrieval.top_k);
    Ok(Assistant { generator, indexed_chunks })
}
