//! Vector persistence behind `ragdb_core::VectorStore`: a LanceDB table for
//! real indexes and an in-memory store for tests and development.
use std::sync::Arc;

use ragdb_core::config::{expand_path, StorageConfig, StoreBackend};
use ragdb_core::error::Result;
use ragdb_core::traits::VectorStore;

pub mod lance;
pub mod memory;
pub mod schema;
pub mod table;

pub use lance::LanceStore;
pub use memory::{cosine_distance, MemoryStore};

/// Open the configured store for vectors of `dim` dimensions.
pub async fn open_store(config: &StorageConfig, dim: usize) -> Result<Arc<dyn VectorStore>> {
	Ok(match config.backend {
		StoreBackend::Memory => Arc::new(MemoryStore::new(dim)),
		StoreBackend::Lance => {
			let path = expand_path(&config.path);
			if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
				std::fs::create_dir_all(parent)?;
			}
			Arc::new(LanceStore::open(&path.to_string_lossy(), &config.table, dim).await?)
		}
	})
}
