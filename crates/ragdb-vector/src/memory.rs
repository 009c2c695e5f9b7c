use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use ragdb_core::error::{Error, Result};
use ragdb_core::traits::VectorStore;
use ragdb_core::types::{Candidate, Filter, StoreRecord};

/// Brute-force cosine store kept in process memory. Used in tests and for
/// throwaway development indexes.
pub struct MemoryStore {
	dim: usize,
	records: RwLock<BTreeMap<String, StoreRecord>>,
}

impl MemoryStore {
	pub fn new(dim: usize) -> Self {
		Self { dim, records: RwLock::new(BTreeMap::new()) }
	}
}

/// Cosine distance in `[0, 2]`; a zero vector is at distance 1 from anything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
	if na == 0.0 || nb == 0.0 {
		return 1.0;
	}
	(1.0 - dot / (na * nb)).clamp(0.0, 2.0)
}

#[async_trait]
impl VectorStore for MemoryStore {
	fn backend(&self) -> &str { "memory" }

	fn location(&self) -> String { ":memory:".to_string() }

	async fn upsert(&self, records: Vec<StoreRecord>) -> Result<usize> {
		if let Some(bad) = records.iter().find(|r| r.embedding.len() != self.dim) {
			return Err(Error::InvalidInput(format!(
				"record {} has {} dims, store expects {}",
				bad.id,
				bad.embedding.len(),
				self.dim
			)));
		}
		let n = records.len();
		let mut guard = self.records.write().await;
		for r in records {
			guard.insert(r.id.clone(), r);
		}
		Ok(n)
	}

	async fn query(&self, vector: &[f32], k: usize, filter: Option<&Filter>) -> Result<Vec<Candidate>> {
		if vector.len() != self.dim {
			return Err(Error::InvalidInput(format!("query has {} dims, store expects {}", vector.len(), self.dim)));
		}
		let guard = self.records.read().await;
		let mut hits: Vec<Candidate> = guard
			.values()
			.filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
			.map(|r| Candidate {
				chunk_id: r.id.clone(),
				metadata: r.metadata.clone(),
				text: r.document.clone(),
				distance: cosine_distance(vector, &r.embedding),
			})
			.collect();
		hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
		hits.truncate(k);
		Ok(hits)
	}

	async fn delete(&self, filter: &Filter) -> Result<usize> {
		let mut guard = self.records.write().await;
		let before = guard.len();
		guard.retain(|_, r| !filter.matches(&r.metadata));
		Ok(before - guard.len())
	}

	async fn count(&self, filter: Option<&Filter>) -> Result<usize> {
		let guard = self.records.read().await;
		Ok(match filter {
			Some(f) => guard.values().filter(|r| f.matches(&r.metadata)).count(),
			None => guard.len(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cosine_distance_bounds() {
		assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
		assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
		assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
		assert_eq!(cosine_distance(&[0.0, 0.0], &[0.0, 1.0]), 1.0);
	}
}
