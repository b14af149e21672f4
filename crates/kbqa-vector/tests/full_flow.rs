use std::fs;
use std::path::Path;
use tempfile::TempDir;

use kbqa_core::chunker::Chunker;
use kbqa_core::config::ChunkingConfig;
use kbqa_core::error::Error;
use kbqa_core::loader::DocumentLoader;
use kbqa_core::traits::{ChunkRetriever, Embedder};
use kbqa_core::types::Chunk;
use kbqa_embed::HashEmbedder;
use kbqa_vector::{Indexer, Retriever};

const TABLE: &str = "documents";

fn embedder() -> Box<dyn Embedder> { Box::new(HashEmbedder::new(256)) }

fn write_corpus(root: &Path) {
    let files = [
        ("HR/vacation.txt", "Employees receive 15 vacation days annually. Unused vacation days carry over up to five days."),
        ("HR/benefits.txt", "Health insurance enrollment opens every November for all full-time staff."),
        ("IT/vpn.txt", "Install the VPN client before connecting to the internal network from home."),
        ("Security/passwords.txt", "Passwords must be rotated every 90 days and never shared with colleagues."),
        ("Finance/expenses.txt", "Submit expense reports within 30 days with receipts attached."),
    ];
    for (rel, text) in files {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }
}

fn build_corpus_index(tmp: &TempDir) -> (std::path::PathBuf, usize) {
    let docs_dir = tmp.path().join("docs");
    write_corpus(&docs_dir);
    let docs = DocumentLoader::new(&docs_dir).load().expect("load");
    let chunks = Chunker::new(&ChunkingConfig::default()).unwrap().split_documents(&docs);
    let index_dir = tmp.path().join("index");
    let stats = Indexer::new(&index_dir, TABLE, embedder()).unwrap().with_progress(false).build(&chunks).expect("build");
    assert_eq!(stats.chunks, chunks.len());
    assert_eq!(stats.dim, 256);
    (index_dir, chunks.len())
}

#[test]
fn vacation_question_retrieves_the_hr_policy() {
    let tmp = TempDir::new().unwrap();
    let (index_dir, n) = build_corpus_index(&tmp);
    let retriever = Retriever::open(&index_dir, TABLE, embedder()).expect("open");
    assert_eq!(retriever.count(), n);
    assert_eq!(retriever.manifest().embedder_id, "hash:xxh64:d256");

    let hits = retriever.retrieve("How many vacation days do employees get?", 3).expect("search");
    assert_eq!(hits.len(), 3);
    let top = &hits[0];
    assert!(top.chunk.content.contains("15 vacation days"), "top hit was {:?}", top.chunk.content);
    assert_eq!(top.chunk.category(), "HR");
    assert_eq!(top.chunk.source(), "vacation.txt");
    assert!(top.chunk.metadata.contains_key("modified"));
    for w in hits.windows(2) {
        assert!(w[0].score >= w[1].score, "results ordered by descending score");
    }
}

#[test]
fn k_larger_than_the_index_returns_everything_and_zero_returns_nothing() {
    let tmp = TempDir::new().unwrap();
    let (index_dir, n) = build_corpus_index(&tmp);
    let retriever = Retriever::open(&index_dir, TABLE, embedder()).expect("open");
    assert_eq!(retriever.search("expense receipts", 50).unwrap().len(), n);
    assert!(retriever.search("expense receipts", 0).unwrap().is_empty());
}

#[test]
fn rebuilding_replaces_the_previous_index() {
    let tmp = TempDir::new().unwrap();
    let (index_dir, _) = build_corpus_index(&tmp);
    let only: Vec<Chunk> = vec![serde_json::from_str(
        r#"{"id":"a.txt_chunk_0","content":"only chunk","metadata":{"source":"a.txt","category":"Misc","path":"/a.txt","chunk_index":0}}"#,
    )
    .unwrap()];
    Indexer::new(&index_dir, TABLE, embedder()).unwrap().with_progress(false).build(&only).unwrap();
    let retriever = Retriever::open(&index_dir, TABLE, embedder()).unwrap();
    assert_eq!(retriever.count(), 1);
    let hits = retriever.search("anything", 5).unwrap();
    assert_eq!(hits[0].chunk.id, "a.txt_chunk_0");
    assert_eq!(hits[0].chunk.category(), "Misc");
}

#[test]
fn missing_index_is_reported() {
    let tmp = TempDir::new().unwrap();
    let err = Retriever::open(&tmp.path().join("nope"), TABLE, embedder()).err().expect("must fail");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::IndexNotFound(_))), "got {err:#}");

    let empty_dir = tmp.path().join("empty");
    fs::create_dir_all(&empty_dir).unwrap();
    let err = Retriever::open(&empty_dir, TABLE, embedder()).err().expect("must fail");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::IndexNotFound(_))), "got {err:#}");
}

#[test]
fn a_different_embedder_is_refused() {
    let tmp = TempDir::new().unwrap();
    let (index_dir, _) = build_corpus_index(&tmp);
    let err = Retriever::open(&index_dir, TABLE, Box::new(HashEmbedder::new(128))).err().expect("must fail");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::EmbedderMismatch { .. })), "got {err:#}");
}

#[test]
fn empty_corpus_builds_an_empty_index() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("index");
    let stats = Indexer::new(&index_dir, TABLE, embedder()).unwrap().with_progress(false).build(&[]).unwrap();
    assert_eq!(stats.chunks, 0);
    let retriever = Retriever::open(&index_dir, TABLE, embedder()).expect("empty index opens");
    assert_eq!(retriever.count(), 0);
    assert!(retriever.search("vacation", 5).unwrap().is_empty());
}

mod damaged_index {
    use super::*;
    use arrow_array::types::Float32Type;
    use arrow_array::{ArrayRef, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
    use arrow_schema::Schema;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::runtime::Runtime;

    use kbqa_vector::schema::{chunk_schema, columns};
    use kbqa_vector::table::{ensure_table, open_db, write_manifest, Manifest};

    const DIM: usize = 256;

    fn manifest(dim: usize) -> Manifest {
        Manifest {
            embedder_id: "hash:xxh64:d256".to_string(),
            dim,
            chunk_count: 1,
            created_at: "2024-01-01T00:00:00".to_string(),
        }
    }

    /// Lay down a chunk table (empty, or holding `rows`) and optionally a manifest.
    fn write_raw(tmp: &TempDir, schema: Arc<Schema>, rows: Option<RecordBatch>, manifest: Option<Manifest>) -> PathBuf {
        let index_dir = tmp.path().join("index");
        fs::create_dir_all(&index_dir).unwrap();
        let uri = index_dir.to_string_lossy().to_string();
        Runtime::new().unwrap().block_on(async {
            let db = open_db(&uri).await.unwrap();
            match rows {
                Some(batch) => {
                    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
                    db.create_table(TABLE, reader).execute().await.unwrap();
                }
                None => ensure_table(&db, TABLE, schema).await.unwrap(),
            }
            if let Some(m) = manifest {
                write_manifest(&db, &m).await.unwrap();
            }
        });
        index_dir
    }

    fn assert_invalid(result: anyhow::Result<Retriever>) {
        let err = result.err().expect("must fail");
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidIndex(_))), "got {err:#}");
    }

    #[test]
    fn table_without_manifest_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let index_dir = write_raw(&tmp, chunk_schema(DIM), None, None);
        assert_invalid(Retriever::open(&index_dir, TABLE, embedder()));
    }

    #[test]
    fn vector_width_must_match_the_manifest() {
        let tmp = TempDir::new().unwrap();
        let index_dir = write_raw(&tmp, chunk_schema(128), None, Some(manifest(DIM)));
        assert_invalid(Retriever::open(&index_dir, TABLE, embedder()));
    }

    #[test]
    fn missing_column_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let full = chunk_schema(DIM);
        let fields: Vec<_> =
            full.fields().iter().filter(|f| f.name() != columns::METADATA).map(|f| f.as_ref().clone()).collect();
        let index_dir = write_raw(&tmp, Arc::new(Schema::new(fields)), None, Some(manifest(DIM)));
        assert_invalid(Retriever::open(&index_dir, TABLE, embedder()));
    }

    #[test]
    fn unparseable_metadata_fails_the_search() {
        let tmp = TempDir::new().unwrap();
        let text = |s: &str| -> ArrayRef { Arc::new(StringArray::from(vec![s.to_string()])) };
        let mut unit = vec![0.0f32; DIM];
        unit[0] = 1.0;
        let vectors = vec![Some(unit.into_iter().map(Some).collect::<Vec<_>>())];
        let batch = RecordBatch::try_new(
            chunk_schema(DIM),
            vec![
                text("/a.txt#0"),
                text("a.txt_chunk_0"),
                text("a.txt"),
                text("/a.txt"),
                text("Misc"),
                text("some content"),
                text("not json"),
                Arc::new(Int32Array::from(vec![0])),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, DIM as i32)),
            ],
        )
        .unwrap();
        let index_dir = write_raw(&tmp, chunk_schema(DIM), Some(batch), Some(manifest(DIM)));

        let retriever = Retriever::open(&index_dir, TABLE, embedder()).expect("schema and manifest are fine");
        let err = retriever.search("some content", 1).err().expect("must fail");
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidIndex(_))), "got {err:#}");
    }
}
