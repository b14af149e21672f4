//! Domain types shared by the loader, chunker, index and answer chain.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

pub type ChunkId = String;
pub type Meta = BTreeMap<String, MetaValue>;

/// Well-known metadata keys.
pub mod keys {
    pub const SOURCE: &str = "source";
    pub const PATH: &str = "path";
    pub const CATEGORY: &str = "category";
    pub const CREATED: &str = "created";
    pub const MODIFIED: &str = "modified";
    pub const CHUNK_ID: &str = "chunk_id";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const START_INDEX: &str = "start_index";
}

/// A metadata value: either free text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Number(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self { Self::Text(value.to_string()) }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self { Self::Text(value) }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self { Self::Number(value) }
}

impl From<usize> for MetaValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: usize) -> Self { Self::Number(value as f64) }
}

fn text_field<'a>(metadata: &'a Meta, key: &str) -> &'a str {
    metadata.get(key).and_then(MetaValue::as_str).unwrap_or("")
}

/// A source document as read from disk. Immutable once constructed.
///
/// Construction validates that the metadata carries a non-empty `category`
/// and a `source`, since every chunk derived from it must surface both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    content: String,
    metadata: Meta,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Meta) -> Result<Self> {
        if text_field(&metadata, keys::CATEGORY).trim().is_empty() {
            return Err(Error::InvalidDocument("metadata is missing a non-empty 'category'".to_string()));
        }
        if text_field(&metadata, keys::SOURCE).is_empty() {
            return Err(Error::InvalidDocument("metadata is missing 'source'".to_string()));
        }
        Ok(Self { content: content.into(), metadata })
    }

    pub fn content(&self) -> &str { &self.content }

    pub fn metadata(&self) -> &Meta { &self.metadata }

    pub fn category(&self) -> &str { text_field(&self.metadata, keys::CATEGORY) }

    pub fn source(&self) -> &str { text_field(&self.metadata, keys::SOURCE) }
}

/// A bounded slice of a document plus the parent's metadata.
///
/// - `id`: chunk identifier (`{source}_chunk_{n}`)
/// - `content`: the text payload of the chunk
/// - `metadata`: parent metadata extended with `chunk_id`, `chunk_index`, `start_index`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub content: String,
    pub metadata: Meta,
}

impl Chunk {
    pub fn category(&self) -> &str { text_field(&self.metadata, keys::CATEGORY) }

    pub fn source(&self) -> &str { text_field(&self.metadata, keys::SOURCE) }

    pub fn path(&self) -> &str { text_field(&self.metadata, keys::PATH) }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn chunk_index(&self) -> usize {
        self.metadata.get(keys::CHUNK_INDEX).and_then(MetaValue::as_f64).map_or(0, |n| n as usize)
    }

    /// Short single-line excerpt of the content, at most `max_chars` characters.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let flat: String = self.content.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= max_chars { return flat; }
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

/// A retrieved chunk with its relevance score. Higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Top-k retrieval output, ordered by descending score.
pub type QueryResult = Vec<ScoredChunk>;
