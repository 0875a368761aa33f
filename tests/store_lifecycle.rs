//! Store Lifecycle Tests
//!
//! - data persists across close and reopen
//! - a corrupted log fails startup explicitly
//! - collections bound to a closed store fail as values
//! - writes racing close fail the same way
//! - compaction leaves visible state unchanged

use std::fs;

use serde_json::json;
use tempfile::TempDir;
use tenantdb::engine::LOG_FILE;
use tenantdb::collection::CLOSED_MESSAGE;
use tenantdb::{AllDocsQuery, Store, StoreConfig, StoreError};

fn config(temp_dir: &TempDir) -> StoreConfig {
    StoreConfig::new(temp_dir.path())
}

#[tokio::test]
async fn test_documents_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();

    let rev = {
        let store = Store::open(config(&temp_dir)).await.unwrap();
        let api = store.collection("notes").unwrap();
        api.put(&json!({"id": "keep", "text": "persisted"})).await.unwrap();
        api.put_attachment("keep", b"blob", "text/plain").await.unwrap();
        let gone = api.put(&json!({"id": "gone"})).await.unwrap();
        assert_eq!(gone.id, "gone");
        api.remove("gone").await.unwrap();
        let rev = api.get("keep").await.unwrap().rev.unwrap();
        store.close().await.unwrap();
        rev
    };

    let store = Store::open(config(&temp_dir)).await.unwrap();
    let api = store.collection("notes").unwrap();

    let doc = api.get("keep").await.unwrap();
    assert_eq!(doc.rev.as_deref(), Some(rev.as_str()));
    assert_eq!(doc.field("text"), Some(&json!("persisted")));
    assert_eq!(api.get_attachment("keep").await.unwrap(), b"blob");
    assert!(api.get("gone").await.is_none());

    // Generation continues from the tombstone
    let recreated = api.put(&json!({"id": "gone"})).await.unwrap();
    assert!(recreated.rev.starts_with("3-"));
}

#[tokio::test]
async fn test_layout_under_db_name() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config(&temp_dir).with_db_name("plugins"))
        .await
        .unwrap();

    assert_eq!(store.engine_path(), temp_dir.path().join("plugins"));
    assert!(temp_dir.path().join("plugins").join(LOG_FILE).exists());
}

#[tokio::test]
async fn test_corrupted_log_fails_start() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = Store::open(config(&temp_dir)).await.unwrap();
        let api = store.collection("notes").unwrap();
        api.put(&json!({"id": "a", "text": "some content to corrupt"}))
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    let log_path = temp_dir.path().join("tenantdb").join(LOG_FILE);
    let mut contents = fs::read(&log_path).unwrap();
    let mid = contents.len() / 2;
    contents[mid] ^= 0xFF;
    fs::write(&log_path, contents).unwrap();

    let store = Store::new(config(&temp_dir)).unwrap();
    assert!(matches!(store.start().await, Err(StoreError::Engine(_))));
    assert!(!store.is_open());
}

#[tokio::test]
async fn test_operations_after_close_fail_as_values() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config(&temp_dir)).await.unwrap();
    let api = store.collection("notes").unwrap();
    api.put(&json!({"id": "a"})).await.unwrap();

    store.close().await.unwrap();

    let err = api.put(&json!({"id": "b"})).await.unwrap_err();
    assert_eq!(err.name(), "exception");
    assert!(api.get("a").await.is_none());
    assert!(api.remove("a").await.unwrap_err().is_exception());
    assert!(api
        .bulk_write(&json!([{"id": "c"}]))
        .await
        .unwrap_err()
        .is_exception());
    assert!(api
        .range_query(&AllDocsQuery::All)
        .await
        .unwrap_err()
        .is_exception());
    assert!(api.put_attachment("a", b"x", "text/plain").await.is_err());
    assert!(api.get_attachment("a").await.is_none());
    assert!(api.remove_attachment("a", "1-x").await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_writes_racing_close_fail_as_closed_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config(&temp_dir)).await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..8 {
        let api = store.collection(&format!("plugin{}", n)).unwrap();
        tasks.push(tokio::spawn(async move {
            let mut failures = Vec::new();
            for i in 0..50 {
                if let Err(e) = api.put(&json!({"id": format!("doc{}", i)})).await {
                    failures.push(e);
                }
            }
            failures
        }));
    }

    tokio::task::yield_now().await;
    store.close().await.unwrap();

    for task in tasks {
        for err in task.await.unwrap() {
            assert!(err.is_exception(), "{}", err);
            assert_eq!(err.message(), CLOSED_MESSAGE);
        }
    }
}

#[tokio::test]
async fn test_collection_before_start_then_start() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::new(config(&temp_dir)).unwrap();
    let api = store.collection("early").unwrap();

    assert!(api.put(&json!({"id": "a"})).await.unwrap_err().is_exception());

    store.start().await.unwrap();
    api.put(&json!({"id": "a"})).await.unwrap();
    assert!(api.get("a").await.is_some());
}

#[tokio::test]
async fn test_compaction_keeps_visible_state() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config(&temp_dir).with_auto_compaction(false))
        .await
        .unwrap();
    let api = store.collection("counters").unwrap();

    let mut rev = api.put(&json!({"id": "n", "v": 0})).await.unwrap().rev;
    for v in 1..20 {
        rev = api
            .put(&json!({"id": "n", "v": v, "rev": rev}))
            .await
            .unwrap()
            .rev;
    }
    api.put(&json!({"id": "other"})).await.unwrap();

    let log_path = store.engine_path().join(LOG_FILE);
    let before = fs::metadata(&log_path).unwrap().len();

    assert_eq!(store.compact().await.unwrap(), 19);
    assert!(fs::metadata(&log_path).unwrap().len() < before);

    let doc = api.get("n").await.unwrap();
    assert_eq!(doc.rev.as_deref(), Some(rev.as_str()));
    assert_eq!(doc.field("v"), Some(&json!(19)));

    let all = api.range_query(&AllDocsQuery::All).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_concurrent_collections_share_engine() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config(&temp_dir)).await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..8 {
        let api = store.collection(&format!("plugin{}", n)).unwrap();
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                api.put(&json!({"id": format!("doc{}", i)})).await.unwrap();
            }
            api.range_query(&AllDocsQuery::All).await.unwrap().len()
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap(), 10);
    }
}

#[tokio::test]
async fn test_load_config_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.json");
    let data_dir = temp_dir.path().join("data");
    fs::write(
        &config_path,
        json!({"data_dir": data_dir, "db_name": "main"}).to_string(),
    )
    .unwrap();

    let config = StoreConfig::load(&config_path).unwrap();
    let store = Store::open(config).await.unwrap();
    assert_eq!(store.engine_path(), data_dir.join("main"));
    assert!(store.is_open());
}
