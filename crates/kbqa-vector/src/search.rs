use anyhow::Result;
use arrow_array::{Float32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::debug;

use kbqa_core::error::Error;
use kbqa_core::traits::{ChunkRetriever, Embedder};
use kbqa_core::types::{Chunk, Meta, ScoredChunk};

use crate::schema::{columns, vector_dim, TEXT_COLUMNS};
use crate::table::{column, open_db, read_manifest, table_exists, Manifest};

/// Cosine top-k over a persisted index.
///
/// Opening validates that the index exists, has the expected columns, and was
/// built by the same embedder (id and width) that will embed the queries.
pub struct Retriever {
    table: Table,
    embedder: Box<dyn Embedder>,
    manifest: Manifest,
    rows: usize,
    rt: Runtime,
}

impl Retriever {
    pub fn open(index_dir: &Path, table_name: &str, embedder: Box<dyn Embedder>) -> Result<Self> {
        if !index_dir.is_dir() {
            return Err(Error::IndexNotFound(index_dir.to_path_buf()).into());
        }
        let rt = Runtime::new()?;
        let uri = index_dir.to_string_lossy().to_string();
        let (table, manifest, rows) = rt.block_on(open_validated(&uri, index_dir, table_name))?;

        if manifest.embedder_id != embedder.id() || manifest.dim != embedder.dim() {
            return Err(Error::EmbedderMismatch {
                indexed: format!("{} (dim {})", manifest.embedder_id, manifest.dim),
                configured: format!("{} (dim {})", embedder.id(), embedder.dim()),
            }
            .into());
        }
        debug!(index_dir = %index_dir.display(), rows, embedder = %manifest.embedder_id, "index opened");
        Ok(Self { table, embedder, manifest, rows, rt })
    }

    pub fn manifest(&self) -> &Manifest { &self.manifest }

    /// Number of stored chunks.
    pub fn count(&self) -> usize { self.rows }

    /// Up to `k` chunks by descending cosine similarity to `query`.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.rows == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_query(query)?;
        let mut results = self.rt.block_on(self.nearest(query_vec, k))?;
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        Ok(results)
    }

    async fn nearest(&self, query_vec: Vec<f32>, k: usize) -> Result<Vec<ScoredChunk>> {
        let mut stream = self
            .table
            .vector_search(query_vec)?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            hits.extend(batch_to_hits(&batch)?);
        }
        Ok(hits)
    }
}

impl ChunkRetriever for Retriever {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> { self.search(query, k) }
}

async fn open_validated(uri: &str, index_dir: &Path, table_name: &str) -> Result<(Table, Manifest, usize)> {
    let db: Connection = open_db(uri).await?;
    if !table_exists(&db, table_name).await? {
        return Err(Error::IndexNotFound(PathBuf::from(index_dir)).into());
    }
    let manifest = read_manifest(&db)
        .await
        .map_err(|e| Error::InvalidIndex(format!("unreadable manifest: {e}")))?
        .ok_or_else(|| Error::InvalidIndex(format!("{} has no manifest; rebuild the index", index_dir.display())))?;

    let table = db.open_table(table_name).execute().await?;
    let schema = table.schema().await?;
    if let Some(missing) = TEXT_COLUMNS
        .iter()
        .chain([columns::CHUNK_INDEX].iter())
        .find(|name| schema.field_with_name(name).is_err())
    {
        return Err(Error::InvalidIndex(format!("table '{table_name}' has no '{missing}' column")).into());
    }
    match vector_dim(&schema) {
        Some(dim) if dim == manifest.dim => {}
        Some(dim) => {
            return Err(Error::InvalidIndex(format!("vector width {dim} disagrees with manifest dim {}", manifest.dim)).into())
        }
        None => return Err(Error::InvalidIndex(format!("table '{table_name}' has no float vector column")).into()),
    }
    let rows = table.count_rows(None).await?;
    Ok((table, manifest, rows))
}

fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<ScoredChunk>> {
    let chunk_ids = column::<StringArray>(batch, columns::CHUNK_ID)?;
    let contents = column::<StringArray>(batch, columns::CONTENT)?;
    let metadata = column::<StringArray>(batch, columns::METADATA)?;
    let distances = column::<Float32Array>(batch, "_distance")?;

    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let meta: Meta = serde_json::from_str(metadata.value(i))
            .map_err(|e| Error::InvalidIndex(format!("bad metadata for '{}': {e}", chunk_ids.value(i))))?;
        hits.push(ScoredChunk {
            chunk: Chunk { id: chunk_ids.value(i).to_string(), content: contents.value(i).to_string(), metadata: meta },
            score: 1.0 - distances.value(i),
        });
    }
    Ok(hits)
}
