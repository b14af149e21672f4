//! Persisted vector index on LanceDB.
//!
//! [`Indexer`] writes chunks with their embeddings, [`Retriever`] answers
//! cosine top-k queries against what was written. Both own a small tokio
//! runtime and expose a blocking API.

pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use search::Retriever;
pub use table::Manifest;
pub use writer::{IndexStats, Indexer};
