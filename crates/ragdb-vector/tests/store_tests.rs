use std::sync::Arc;

use ragdb_core::traits::VectorStore;
use ragdb_core::types::{ChunkMetadata, Filter, StoreRecord};
use ragdb_vector::{LanceStore, MemoryStore};

const DIM: usize = 4;

fn record(document_id: &str, seq: usize, vector: [f32; DIM], text: &str) -> StoreRecord {
    let chunk_id = format!("{document_id}-{seq:04}");
    StoreRecord {
        id: chunk_id.clone(),
        embedding: vector.to_vec(),
        document: text.to_string(),
        metadata: ChunkMetadata {
            document_id: document_id.to_string(),
            chunk_id,
            title: (seq == 1).then(|| "Handbook".to_string()),
            url: None,
            page: seq as u32,
        },
    }
}

async fn exercise(store: Arc<dyn VectorStore>) {
    assert_eq!(store.count(None).await.expect("count"), 0);
    assert!(store.query(&[1.0, 0.0, 0.0, 0.0], 3, None).await.expect("query").is_empty());

    let written = store
        .upsert(vec![
            record("a", 1, [1.0, 0.0, 0.0, 0.0], "appeal deadline"),
            record("a", 2, [0.0, 1.0, 0.0, 0.0], "library hours"),
            record("b", 1, [0.7, 0.7, 0.0, 0.0], "fees and appeals"),
        ])
        .await
        .expect("upsert");
    assert_eq!(written, 3);
    assert_eq!(store.count(None).await.expect("count"), 3);
    assert_eq!(store.count(Some(&Filter::DocumentId("a".into()))).await.expect("count"), 2);

    let hits = store.query(&[1.0, 0.0, 0.0, 0.0], 2, None).await.expect("query");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_id, "a-0001");
    assert!(hits[0].distance.abs() < 1e-4);
    assert_eq!(hits[0].metadata.title.as_deref(), Some("Handbook"));
    assert_eq!(hits[1].chunk_id, "b-0001");
    assert!(hits[0].similarity() >= hits[1].similarity());

    let filtered = store
        .query(&[1.0, 0.0, 0.0, 0.0], 5, Some(&Filter::DocumentId("b".into())))
        .await
        .expect("filtered query");
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].metadata.document_id, "b");

    // Same id replaces the previous row.
    store.upsert(vec![record("a", 2, [0.0, 0.0, 1.0, 0.0], "library hours, revised")]).await.expect("upsert");
    assert_eq!(store.count(None).await.expect("count"), 3);

    assert_eq!(store.delete(&Filter::DocumentId("a".into())).await.expect("delete"), 2);
    assert_eq!(store.count(None).await.expect("count"), 1);
    assert_eq!(store.delete(&Filter::DocumentId("a".into())).await.expect("delete"), 0);
    store.ping().await.expect("ping");
}

#[tokio::test]
async fn memory_store_contract() {
    exercise(Arc::new(MemoryStore::new(DIM))).await;
}

#[tokio::test]
async fn lance_store_contract() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let uri = tmp.path().join("lancedb");
    let store = LanceStore::open(&uri.to_string_lossy(), "chunks", DIM).await.expect("open");
    exercise(Arc::new(store)).await;
}

#[tokio::test]
async fn lance_store_rejects_dimension_change() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let uri = tmp.path().join("lancedb").to_string_lossy().to_string();
    LanceStore::open(&uri, "chunks", DIM).await.expect("open");
    assert!(LanceStore::open(&uri, "chunks", DIM + 1).await.is_err());
}

#[tokio::test]
async fn memory_store_rejects_wrong_width() {
    let store = MemoryStore::new(DIM);
    let mut bad = record("a", 1, [1.0, 0.0, 0.0, 0.0], "x");
    bad.embedding.push(0.5);
    assert!(store.upsert(vec![bad]).await.is_err());
}
