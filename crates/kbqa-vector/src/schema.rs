//! Arrow schemas of the persisted index.
//!
//! The chunk table stores only strings, integers and floats; chunk metadata
//! travels as a JSON text column.

use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const MANIFEST_TABLE: &str = "manifest";

pub mod columns {
    pub const ID: &str = "id";
    pub const CHUNK_ID: &str = "chunk_id";
    pub const SOURCE: &str = "source";
    pub const PATH: &str = "path";
    pub const CATEGORY: &str = "category";
    pub const CONTENT: &str = "content";
    pub const METADATA: &str = "metadata";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const VECTOR: &str = "vector";

    pub const EMBEDDER_ID: &str = "embedder_id";
    pub const DIM: &str = "dim";
    pub const CHUNK_COUNT: &str = "chunk_count";
    pub const CREATED_AT: &str = "created_at";
}

pub const TEXT_COLUMNS: [&str; 7] = [
    columns::ID,
    columns::CHUNK_ID,
    columns::SOURCE,
    columns::PATH,
    columns::CATEGORY,
    columns::CONTENT,
    columns::METADATA,
];

pub fn chunk_schema(dim: usize) -> Arc<Schema> {
    let mut fields: Vec<Field> = TEXT_COLUMNS.iter().map(|name| Field::new(*name, DataType::Utf8, false)).collect();
    fields.push(Field::new(columns::CHUNK_INDEX, DataType::Int32, false));
    fields.push(Field::new(columns::VECTOR, vector_type(dim), true));
    Arc::new(Schema::new(fields))
}

pub fn vector_type(dim: usize) -> DataType {
    DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32)
}

pub fn manifest_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(columns::EMBEDDER_ID, DataType::Utf8, false),
        Field::new(columns::DIM, DataType::Int32, false),
        Field::new(columns::CHUNK_COUNT, DataType::Int64, false),
        Field::new(columns::CREATED_AT, DataType::Utf8, false),
    ]))
}

/// Width of the vector column, if the schema has one of the expected type.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(columns::VECTOR).ok()?.data_type() {
        DataType::FixedSizeList(item, n) if item.data_type() == &DataType::Float32 => usize::try_from(*n).ok(),
        _ => None,
    }
}
