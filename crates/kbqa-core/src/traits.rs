use crate::types::ScoredChunk;

/// Text -> vector. One provider per deployment: the index records `id()` and
/// `dim()` and refuses queries embedded by anything else.
pub trait Embedder: Send + Sync {
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder '{}' returned no vector for the query", self.id()))
    }
}

/// Top-k lookup over an index. Results are ordered by descending score, len <= k.
pub trait ChunkRetriever: Send + Sync {
    fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<ScoredChunk>>;
}

/// Prompt -> completion. Blocks until the full answer is available.
pub trait LanguageModel: Send + Sync {
    fn id(&self) -> &str;
    fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}
