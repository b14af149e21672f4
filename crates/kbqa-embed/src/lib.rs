//! Embedding providers behind [`kbqa_core::traits::Embedder`].
//!
//! - `local`: BGE-M3 (XLM-RoBERTa) on candle, masked mean pooling + L2 norm.
//! - `openai`: hosted OpenAI-compatible `/embeddings` endpoint.
//! - `hash`: deterministic feature hashing, no model required.
//!
//! `APP_USE_FAKE_EMBEDDINGS=1` forces the hash provider regardless of config,
//! which keeps tests and development runs fast and offline.

use anyhow::Result;
use tracing::info;

use kbqa_core::config::{EmbeddingConfig, EmbeddingProvider};
use kbqa_core::traits::Embedder;

pub mod device;
pub mod hashed;
pub mod local;
pub mod openai;
pub mod pool;
pub mod tokenize;

pub use hashed::HashEmbedder;
pub use local::LocalEmbedder;
pub use openai::OpenAiEmbedder;
pub use pool::masked_mean_l2;

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the embedder the configuration asks for.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() {
        info!(dim = config.dim, "APP_USE_FAKE_EMBEDDINGS set, using hash embedder");
        return Ok(Box::new(HashEmbedder::new(config.dim)));
    }
    let embedder: Box<dyn Embedder> = match config.provider {
        EmbeddingProvider::Hash => Box::new(HashEmbedder::new(config.dim)),
        EmbeddingProvider::OpenAi => Box::new(OpenAiEmbedder::from_env(config)?),
        EmbeddingProvider::Local => Box::new(LocalEmbedder::new(config)?),
    };
    info!(embedder = embedder.id(), dim = embedder.dim(), "embedder ready");
    Ok(embedder)
}
