use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use tracing::debug;

use ragdb_core::error::{Component, Error, Result};
use ragdb_core::traits::VectorStore;
use ragdb_core::types::{Candidate, ChunkMetadata, Filter, StoreRecord};

use crate::schema::{self, chunk_schema};
use crate::table::{open_chunk_table, open_db};

/// Chunk vectors in a LanceDB table, searched by cosine distance.
pub struct LanceStore {
	table: Table,
	uri: String,
	dim: usize,
}

impl LanceStore {
	pub async fn open(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let conn = open_db(uri).await?;
		let table = open_chunk_table(&conn, table_name, dim).await?;
		debug!(uri, table = table_name, dim, "Opened LanceDB chunk table");
		Ok(Self { table, uri: uri.to_string(), dim })
	}

	fn to_record_batch(&self, records: &[StoreRecord]) -> Result<RecordBatch> {
		let dim = i32::try_from(self.dim).map_err(|_| Error::InvalidConfig(format!("vector dimension {} too large", self.dim)))?;
		let mut ids = Vec::with_capacity(records.len());
		let mut document_ids = Vec::with_capacity(records.len());
		let mut chunk_ids = Vec::with_capacity(records.len());
		let mut titles = Vec::with_capacity(records.len());
		let mut urls = Vec::with_capacity(records.len());
		let mut pages = Vec::with_capacity(records.len());
		let mut contents = Vec::with_capacity(records.len());
		let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
		for r in records {
			if r.embedding.len() != self.dim {
				return Err(Error::InvalidInput(format!(
					"record {} has {} dims, table expects {}",
					r.id,
					r.embedding.len(),
					self.dim
				)));
			}
			ids.push(r.id.as_str());
			document_ids.push(r.metadata.document_id.as_str());
			chunk_ids.push(r.metadata.chunk_id.as_str());
			titles.push(r.metadata.title.as_deref());
			urls.push(r.metadata.url.as_deref());
			pages.push(i32::try_from(r.metadata.page).unwrap_or(i32::MAX));
			contents.push(r.document.as_str());
			vectors.push(Some(r.embedding.iter().map(|&x| Some(x)).collect()));
		}
		RecordBatch::try_new(
			chunk_schema(dim),
			vec![
				Arc::new(StringArray::from(ids)),
				Arc::new(StringArray::from(document_ids)),
				Arc::new(StringArray::from(chunk_ids)),
				Arc::new(StringArray::from(titles)),
				Arc::new(StringArray::from(urls)),
				Arc::new(Int32Array::from(pages)),
				Arc::new(StringArray::from(contents)),
				Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim)),
			],
		)
		.map_err(Error::storage)
	}
}

/// SQL predicate for a store filter, with quotes escaped.
fn predicate(filter: &Filter) -> String {
	match filter {
		Filter::DocumentId(id) => format!("{} = '{}'", schema::DOCUMENT_ID, id.replace('\'', "''")),
	}
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| Error::storage(format!("column '{name}' missing or not utf8")))
}

fn optional_string(col: &StringArray, i: usize) -> Option<String> {
	if col.is_null(i) { None } else { Some(col.value(i).to_string()) }
}

fn batch_to_candidates(batch: &RecordBatch, out: &mut Vec<Candidate>) -> Result<()> {
	let ids = string_col(batch, schema::ID)?;
	let document_ids = string_col(batch, schema::DOCUMENT_ID)?;
	let chunk_ids = string_col(batch, schema::CHUNK_ID)?;
	let titles = string_col(batch, schema::TITLE)?;
	let urls = string_col(batch, schema::URL)?;
	let contents = string_col(batch, schema::CONTENT)?;
	let pages = batch
		.column_by_name(schema::PAGE)
		.and_then(|c| c.as_any().downcast_ref::<Int32Array>())
		.ok_or_else(|| Error::storage("column 'page' missing"))?;
	let distances = batch
		.column_by_name(schema::DISTANCE)
		.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
		.ok_or_else(|| Error::storage("search result has no _distance column"))?;

	for i in 0..batch.num_rows() {
		out.push(Candidate {
			chunk_id: ids.value(i).to_string(),
			metadata: ChunkMetadata {
				document_id: document_ids.value(i).to_string(),
				chunk_id: chunk_ids.value(i).to_string(),
				title: optional_string(titles, i),
				url: optional_string(urls, i),
				page: u32::try_from(pages.value(i)).unwrap_or(1).max(1),
			},
			text: contents.value(i).to_string(),
			distance: distances.value(i),
		});
	}
	Ok(())
}

#[async_trait]
impl VectorStore for LanceStore {
	fn backend(&self) -> &str { "LanceDB" }

	fn location(&self) -> String { self.uri.clone() }

	async fn upsert(&self, records: Vec<StoreRecord>) -> Result<usize> {
		if records.is_empty() {
			return Ok(0);
		}
		let batch = self.to_record_batch(&records)?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		// Upsert behavior via merge_insert: id is unique
		let mut mi = self.table.merge_insert(&[schema::ID]);
		mi.when_matched_update_all(None).when_not_matched_insert_all();
		mi.execute(reader).await.map_err(Error::storage)?;
		Ok(records.len())
	}

	async fn query(&self, vector: &[f32], k: usize, filter: Option<&Filter>) -> Result<Vec<Candidate>> {
		if k == 0 || self.count(filter).await? == 0 {
			return Ok(Vec::new());
		}
		let mut query = self
			.table
			.vector_search(vector.to_vec())
			.map_err(|e| Error::InvalidInput(e.to_string()))?
			.distance_type(DistanceType::Cosine)
			.limit(k);
		if let Some(f) = filter {
			query = query.only_if(predicate(f));
		}
		let mut stream = query.execute().await.map_err(|e| Error::unavailable(Component::VectorStore, e))?;
		let mut out = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
			batch_to_candidates(&batch, &mut out)?;
		}
		out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
		out.truncate(k);
		Ok(out)
	}

	async fn delete(&self, filter: &Filter) -> Result<usize> {
		let before = self.count(Some(filter)).await?;
		if before > 0 {
			self.table.delete(&predicate(filter)).await.map_err(Error::storage)?;
		}
		Ok(before)
	}

	async fn count(&self, filter: Option<&Filter>) -> Result<usize> {
		self.table
			.count_rows(filter.map(predicate))
			.await
			.map_err(|e| Error::unavailable(Component::VectorStore, e))
	}
}
