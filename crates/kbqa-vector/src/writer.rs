use anyhow::{Context, Result};
use arrow_array::types::Float32Type;
use arrow_array::{ArrayRef, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use kbqa_core::error::Error;
use kbqa_core::traits::Embedder;
use kbqa_core::types::Chunk;

use crate::schema::chunk_schema;
use crate::table::{ensure_table, open_db, write_manifest, Manifest};

pub const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub chunks: usize,
    pub dim: usize,
    pub index_dir: PathBuf,
}

/// Embeds chunks and persists them, replacing whatever index was at `index_dir`.
pub struct Indexer {
    index_dir: PathBuf,
    table_name: String,
    embedder: Box<dyn Embedder>,
    batch_size: usize,
    progress: bool,
    rt: Runtime,
}

impl Indexer {
    pub fn new(index_dir: impl Into<PathBuf>, table_name: &str, embedder: Box<dyn Embedder>) -> Result<Self> {
        Ok(Self {
            index_dir: index_dir.into(),
            table_name: table_name.to_string(),
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
            progress: true,
            rt: Runtime::new()?,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn index_dir(&self) -> &Path { &self.index_dir }

    /// Build the index from scratch. Any previous index at the location is
    /// removed first; a failed build leaves no usable index behind.
    pub fn build(&self, chunks: &[Chunk]) -> Result<IndexStats> {
        let dim = self.embedder.dim();
        if self.index_dir.exists() {
            fs::remove_dir_all(&self.index_dir)
                .with_context(|| format!("failed to remove previous index at {}", self.index_dir.display()))?;
        }
        fs::create_dir_all(&self.index_dir)?;
        let uri = self.index_dir.to_string_lossy().to_string();
        let db = self.rt.block_on(open_db(&uri))?;

        if chunks.is_empty() {
            warn!(index_dir = %self.index_dir.display(), "no chunks to index; writing an empty index");
            self.rt.block_on(ensure_table(&db, &self.table_name, chunk_schema(dim)))?;
        } else {
            info!(chunks = chunks.len(), table = %self.table_name, embedder = self.embedder.id(), "indexing");
            let pb = self.progress_bar(chunks.len());
            for batch in chunks.chunks(self.batch_size) {
                let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
                let vectors = self.embedder.embed_batch(&texts)?;
                if vectors.len() != batch.len() || vectors.iter().any(|v| v.len() != dim) {
                    return Err(Error::Provider(format!(
                        "embedder '{}' returned {} vectors for {} chunks (expected width {})",
                        self.embedder.id(),
                        vectors.len(),
                        batch.len(),
                        dim
                    ))
                    .into());
                }
                let record_batch = to_record_batch(batch, vectors, dim)?;
                self.rt.block_on(self.insert_batch(&db, record_batch))?;
                pb.inc(batch.len() as u64);
            }
            pb.finish_with_message("indexed");
        }

        let manifest = Manifest {
            embedder_id: self.embedder.id().to_string(),
            dim,
            chunk_count: chunks.len(),
            created_at: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        };
        self.rt.block_on(write_manifest(&db, &manifest))?;
        info!(chunks = chunks.len(), index_dir = %self.index_dir.display(), "index written");
        Ok(IndexStats { chunks: chunks.len(), dim, index_dir: self.index_dir.clone() })
    }

    async fn insert_batch(&self, db: &Connection, record_batch: RecordBatch) -> Result<()> {
        let schema = record_batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
        if db.table_names().execute().await?.contains(&self.table_name) {
            db.open_table(&self.table_name).execute().await?.add(reader).execute().await?;
        } else {
            db.create_table(&self.table_name, reader).execute().await?;
        }
        Ok(())
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

fn to_record_batch(chunks: &[Chunk], vectors: Vec<Vec<f32>>, dim: usize) -> Result<RecordBatch> {
    let metadata = chunks
        .iter()
        .map(|c| serde_json::to_string(&c.metadata))
        .collect::<Result<Vec<_>, _>>()?;
    let chunk_indices = chunks
        .iter()
        .map(|c| i32::try_from(c.chunk_index()))
        .collect::<Result<Vec<_>, _>>()?;
    let vectors = vectors.into_iter().map(|v| Some(v.into_iter().map(Some).collect::<Vec<_>>()));

    let batch = RecordBatch::try_new(
        chunk_schema(dim),
        vec![
            strings(chunks, |c| format!("{}#{}", c.path(), c.chunk_index())),
            strings(chunks, |c| c.id.clone()),
            strings(chunks, |c| c.source().to_string()),
            strings(chunks, |c| c.path().to_string()),
            strings(chunks, |c| c.category().to_string()),
            strings(chunks, |c| c.content.clone()),
            Arc::new(StringArray::from(metadata)),
            Arc::new(Int32Array::from(chunk_indices)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim as i32)),
        ],
    )?;
    Ok(batch)
}

fn strings(chunks: &[Chunk], f: impl Fn(&Chunk) -> String) -> ArrayRef {
    Arc::new(StringArray::from(chunks.iter().map(f).collect::<Vec<_>>()))
}
