use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID: &str = "id";
pub const DOCUMENT_ID: &str = "document_id";
pub const CHUNK_ID: &str = "chunk_id";
pub const TITLE: &str = "title";
pub const URL: &str = "url";
pub const PAGE: &str = "page";
pub const CONTENT: &str = "content";
pub const VECTOR: &str = "vector";
/// Column LanceDB adds to vector search results.
pub const DISTANCE: &str = "_distance";

/// Chunk table layout for vectors of `dim` dimensions.
pub fn chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID, DataType::Utf8, false),
		Field::new(DOCUMENT_ID, DataType::Utf8, false),
		Field::new(CHUNK_ID, DataType::Utf8, false),
		Field::new(TITLE, DataType::Utf8, true),
		Field::new(URL, DataType::Utf8, true),
		Field::new(PAGE, DataType::Int32, false),
		Field::new(CONTENT, DataType::Utf8, false),
		Field::new(VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Dimension of the `vector` column, if the schema has one.
pub fn vector_dim(schema: &Schema) -> Option<i32> {
	match schema.field_with_name(VECTOR).ok()?.data_type() {
		DataType::FixedSizeList(_, dim) => Some(*dim),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vector_dim_reads_fixed_size_list() {
		assert_eq!(vector_dim(&chunk_schema(384)), Some(384));
		let other = Schema::new(vec![Field::new(VECTOR, DataType::Utf8, true)]);
		assert_eq!(vector_dim(&other), None);
	}
}
