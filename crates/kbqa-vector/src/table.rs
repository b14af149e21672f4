//! LanceDB connection and housekeeping helpers.
//!
//! Opening the database, creating empty tables, and the single-row manifest
//! that records which embedder produced the stored vectors.

use anyhow::{anyhow, Result};
use arrow_array::{Array, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::Schema;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::sync::Arc;

use crate::schema::{columns, manifest_schema, MANIFEST_TABLE};

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub embedder_id: String,
    pub dim: usize,
    pub chunk_count: usize,
    pub created_at: String,
}

pub async fn write_manifest(conn: &Connection, manifest: &Manifest) -> Result<()> {
    let schema = manifest_schema();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(vec![manifest.embedder_id.clone()])),
            Arc::new(Int32Array::from(vec![i32::try_from(manifest.dim)?])),
            Arc::new(Int64Array::from(vec![i64::try_from(manifest.chunk_count)?])),
            Arc::new(StringArray::from(vec![manifest.created_at.clone()])),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    conn.create_table(MANIFEST_TABLE, reader).execute().await?;
    Ok(())
}

pub async fn read_manifest(conn: &Connection) -> Result<Option<Manifest>> {
    if !table_exists(conn, MANIFEST_TABLE).await? {
        return Ok(None);
    }
    let table = conn.open_table(MANIFEST_TABLE).execute().await?;
    let mut stream = table.query().limit(1).execute().await?;
    while let Some(batch) = stream.try_next().await? {
        if batch.num_rows() == 0 { continue; }
        let dim = column::<Int32Array>(&batch, columns::DIM)?.value(0);
        let count = column::<Int64Array>(&batch, columns::CHUNK_COUNT)?.value(0);
        return Ok(Some(Manifest {
            embedder_id: column::<StringArray>(&batch, columns::EMBEDDER_ID)?.value(0).to_string(),
            dim: usize::try_from(dim)?,
            chunk_count: usize::try_from(count)?,
            created_at: column::<StringArray>(&batch, columns::CREATED_AT)?.value(0).to_string(),
        }));
    }
    Ok(None)
}

/// Typed access to a named column of a result batch.
pub(crate) fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("column '{}' missing or of unexpected type", name))
}
