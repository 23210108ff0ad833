use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const DEFAULT_EMBEDDING_DIM: usize = 1024;

pub const TITLE_VECTOR: &str = "title_vector";
pub const CONTENT_VECTOR: &str = "content_vector";

fn vector_field(name: &str, dim: usize) -> Field {
	Field::new(name, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true)
}

/// One row per corpus item. Vector columns are nullable until the refresh
/// pipeline fills them.
pub fn build_corpus_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("partition", DataType::Utf8, false),
		Field::new("title", DataType::Utf8, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("heading_level", DataType::Int32, false),
		Field::new("parent_document_id", DataType::Utf8, true),
		Field::new("content_hash", DataType::Utf8, false),
		Field::new("vector_hash", DataType::Utf8, true),
		vector_field(TITLE_VECTOR, dim),
		vector_field(CONTENT_VECTOR, dim),
		Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}
