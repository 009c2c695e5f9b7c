//! LanceDB connection and table housekeeping.
use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection, Table};
use std::sync::Arc;
use tracing::info;

use ragdb_core::error::{Component, Error, Result};

use crate::schema::{chunk_schema, vector_dim};

pub async fn open_db(uri: &str) -> Result<Connection> {
	connect(uri).execute().await.map_err(|e| Error::unavailable(Component::VectorStore, e))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
	let names = conn.table_names().execute().await.map_err(Error::storage)?;
	if names.iter().any(|n| n == name) {
		return Ok(());
	}
	// create empty table with 0 rows
	let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
	conn.create_table(name, Box::new(iter)).execute().await.map_err(Error::storage)?;
	info!(table = name, "Created LanceDB table");
	Ok(())
}

/// Open (creating if needed) the chunk table and check its vector width.
pub async fn open_chunk_table(conn: &Connection, name: &str, dim: usize) -> Result<Table> {
	let dim = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("vector dimension {dim} too large")))?;
	ensure_table(conn, name, chunk_schema(dim)).await?;
	let table = conn.open_table(name).execute().await.map_err(Error::storage)?;
	let schema = table.schema().await.map_err(Error::storage)?;
	match vector_dim(&schema) {
		Some(existing) if existing == dim => Ok(table),
		Some(existing) => Err(Error::InvalidConfig(format!(
			"table '{name}' stores {existing}-dimensional vectors, embedder produces {dim}"
		))),
		None => Err(Error::InvalidConfig(format!("table '{name}' has no vector column"))),
	}
}
