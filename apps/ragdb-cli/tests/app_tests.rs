use std::fs;
use std::path::Path;

use ragdb_cli::{document_id_for, text_files, App};
use ragdb_core::config::{Config, Settings, StoreBackend};
use ragdb_core::types::{HealthStatus, Query, SearchMode};
use ragdb_hybrid::IndexOptions;

fn settings(dir: &Path) -> Settings {
    fs::write(
        dir.join("config.toml"),
        format!(
            r#"
[chunking]
max_tokens = 60
overlap_tokens = 8

[embedding]
backend = "hash"
model = "hash-32"
dim = 32

[storage]
backend = "lance"
path = "{root}/index/lancedb"

[events]
sink = "jsonl"
path = "{root}/events.jsonl"

[indexing]
metadata_log = "{root}/index_metadata.jsonl"
text_metadata = "{root}/text_metadata.jsonl"
text_dir = "{root}/text"
"#,
            root = dir.display()
        ),
    )
    .expect("write config");
    Config::load_from(dir, "test").settings().expect("settings")
}

#[tokio::test]
async fn index_directory_then_search_on_lance_with_hash_backend() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let settings = settings(tmp.path());
    assert_eq!(settings.storage.backend, StoreBackend::Lance);

    let text_dir = tmp.path().join("text");
    fs::create_dir_all(&text_dir).expect("mkdir");
    fs::write(
        text_dir.join("regs.txt"),
        "--- page 1 ---\nAcademic appeals must be lodged before the appeal deadline.\n\n--- page 2 ---\nResits are scheduled in August.",
    )
    .expect("write");
    fs::write(text_dir.join("sport.txt"), "The sports centre opens at seven every weekday.").expect("write");

    let app = App::open(settings).await.expect("open app");
    for path in text_files(&text_dir).expect("walk") {
        let id = document_id_for(&path).expect("id");
        app.indexer.index_file(&id, &path, None, None, IndexOptions::default()).await.expect("index");
    }

    let resp = app
        .engine
        .search(&Query::new("appeal deadline", 2, SearchMode::Hybrid).expect("query"))
        .await
        .expect("search");
    assert_eq!(resp.results[0].document_id, "regs");
    // The hash backend only produces placeholder vectors.
    assert!(resp.degraded);

    let stats = app.indexer.stats().await.expect("stats");
    assert_eq!(stats.documents_indexed, 2);
    assert_eq!(stats.vector_db, "LanceDB");

    let health = app.engine.health().await;
    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(health.embedding.reachable && health.vector_store.reachable);

    let events = fs::read_to_string(tmp.path().join("events.jsonl")).expect("events");
    assert_eq!(events.lines().filter(|l| l.contains("\"ChunksIndexed\"")).count(), 2);
    assert_eq!(events.lines().filter(|l| l.contains("\"RetrievalCompleted\"")).count(), 1);
}
