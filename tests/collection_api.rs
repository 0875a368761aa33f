//! Collection API Tests
//!
//! End-to-end behavior of one collection over a real store:
//! - put / get / remove round trip with logical ids
//! - quota enforcement and explicit bypass
//! - bulk write validation and per-document results
//! - attachment lifecycle

use serde_json::json;
use tempfile::TempDir;
use tenantdb::{AllDocsQuery, CollectionApi, Store, StoreConfig, WriteOptions};

// =============================================================================
// Test Utilities
// =============================================================================

async fn open_store(temp_dir: &TempDir) -> Store {
    Store::open(StoreConfig::new(temp_dir.path()))
        .await
        .expect("Failed to open store")
}

async fn notes(temp_dir: &TempDir) -> (Store, CollectionApi) {
    let store = open_store(temp_dir).await;
    let api = store.collection("notes").unwrap();
    (store, api)
}

fn oversized_doc(id: &str) -> serde_json::Value {
    json!({"id": id, "blob": "x".repeat(2 * 1024 * 1024)})
}

// =============================================================================
// Document Round Trip
// =============================================================================

#[tokio::test]
async fn test_note_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    let put = api.put(&json!({"id": "note1", "text": "hi"})).await.unwrap();
    assert_eq!(put.id, "note1");
    assert!(put.rev.starts_with("1-"));

    let doc = api.get("note1").await.unwrap();
    assert_eq!(doc.id, "note1");
    assert_eq!(doc.field("text"), Some(&json!("hi")));
    assert_eq!(doc.rev.as_deref(), Some(put.rev.as_str()));

    let removed = api.remove("note1").await.unwrap();
    assert_eq!(removed.id, "note1");
    assert!(removed.rev.starts_with("2-"));

    assert!(api.get("note1").await.is_none());
}

#[tokio::test]
async fn test_get_returns_what_was_put() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    let original = json!({
        "id": "cfg",
        "nested": {"a": [1, 2, 3], "b": null},
        "flag": true,
        "unicode": "héllo ✓"
    });
    let stamp = api.put(&original).await.unwrap();

    let mut expected = original.clone();
    expected["rev"] = json!(stamp.rev);
    assert_eq!(api.get("cfg").await.unwrap().to_value(), expected);
}

#[tokio::test]
async fn test_update_needs_current_rev() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    let first = api.put(&json!({"id": "a", "v": 1})).await.unwrap();

    let err = api.put(&json!({"id": "a", "v": 2})).await.unwrap_err();
    assert_eq!(err.name(), "conflict");
    assert_eq!(err.id(), Some("a"));

    let second = api
        .put(&json!({"id": "a", "v": 2, "rev": first.rev}))
        .await
        .unwrap();
    assert!(second.rev.starts_with("2-"));
    assert_eq!(api.get("a").await.unwrap().field("v"), Some(&json!(2)));
}

#[tokio::test]
async fn test_error_values_serialize_flat() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    api.put(&json!({"id": "a"})).await.unwrap();
    let err = api.put(&json!({"id": "a"})).await.unwrap_err();

    assert_eq!(
        serde_json::to_value(&err).unwrap(),
        json!({
            "error": true,
            "name": "conflict",
            "message": "Document update conflict",
            "id": "a"
        })
    );
}

// =============================================================================
// Quotas
// =============================================================================

#[tokio::test]
async fn test_oversized_put_rejected_unless_lenient() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    let err = api.put(&oversized_doc("big")).await.unwrap_err();
    assert_eq!(err.name(), "exception");
    assert_eq!(err.message(), "doc max size 2 M");
    assert!(api.get("big").await.is_none());

    api.put_with(&oversized_doc("big"), WriteOptions { strict: false })
        .await
        .unwrap();
    assert!(api.get("big").await.is_some());
}

#[tokio::test]
async fn test_quota_comes_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig::new(temp_dir.path())
        .with_doc_max_bytes(64)
        .with_attachment_max_bytes(4);
    let store = Store::open(config).await.unwrap();
    let api = store.collection("tight").unwrap();

    assert!(api.put(&json!({"id": "a", "s": "x".repeat(64)})).await.is_err());
    assert!(api.put_attachment("a", b"12345", "text/plain").await.is_err());
    assert!(api.put_attachment("a", b"1234", "text/plain").await.is_ok());
}

// =============================================================================
// Bulk Writes
// =============================================================================

#[tokio::test]
async fn test_bulk_write_duplicate_ids_write_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    let err = api
        .bulk_write(&json!([{"id": "a"}, {"id": "b"}, {"id": "a"}]))
        .await
        .unwrap_err();
    assert_eq!(err.message(), "id value is repeat");

    assert!(api.get("a").await.is_none());
    assert!(api.get("b").await.is_none());
}

#[tokio::test]
async fn test_bulk_write_one_oversized_rejects_batch() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    let docs = json!([{"id": "a"}, oversized_doc("b"), {"id": "c"}]);
    let err = api.bulk_write(&docs).await.unwrap_err();
    assert!(err.is_exception());

    let all = api.range_query(&AllDocsQuery::All).await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_bulk_write_reports_each_document() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    let existing = api.put(&json!({"id": "b", "v": 0})).await.unwrap();

    let docs = json!([
        {"id": "a", "v": 1},
        {"id": "b", "v": 1},
        {"id": "c", "v": 1},
        {"id": "b2", "v": 1, "rev": "1-notarev"}
    ]);
    let results = api.bulk_write(&docs).await.unwrap();
    assert_eq!(results.len(), 4);

    assert_eq!(results[0].as_ref().unwrap().id, "a");
    let err = results[1].as_ref().unwrap_err();
    assert_eq!((err.name(), err.id()), ("conflict", Some("b")));
    assert_eq!(results[2].as_ref().unwrap().id, "c");
    assert_eq!(results[3].as_ref().unwrap_err().id(), Some("b2"));

    // The failed document kept its old content
    let b = api.get("b").await.unwrap();
    assert_eq!(b.rev.as_deref(), Some(existing.rev.as_str()));
    assert_eq!(b.field("v"), Some(&json!(0)));
}

#[tokio::test]
async fn test_bulk_write_shape_errors() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    let err = api.bulk_write(&json!("nope")).await.unwrap_err();
    assert_eq!(err.message(), "docs must be a array");

    let err = api.bulk_write(&json!([{"id": "a"}, 5])).await.unwrap_err();
    assert_eq!(err.message(), "doc not id field");

    assert!(api.bulk_write(&json!([])).await.unwrap().is_empty());
}

// =============================================================================
// Range Queries
// =============================================================================

#[tokio::test]
async fn test_range_query_prefix_and_keys() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    for id in ["2023-12", "2024-01", "2024-02", "other"] {
        api.put(&json!({ "id": id })).await.unwrap();
    }

    let ids = |docs: Vec<tenantdb::Document>| docs.into_iter().map(|d| d.id).collect::<Vec<_>>();

    let docs = api.range_query(&AllDocsQuery::prefix("2024")).await.unwrap();
    assert_eq!(ids(docs), vec!["2024-01", "2024-02"]);

    let docs = api
        .range_query(&AllDocsQuery::keys(["other", "missing", "2023-12"]))
        .await
        .unwrap();
    assert_eq!(ids(docs), vec!["other", "2023-12"]);

    api.remove("other").await.unwrap();
    let docs = api.range_query(&AllDocsQuery::keys(["other"])).await.unwrap();
    assert!(docs.is_empty());
}

// =============================================================================
// Attachments
// =============================================================================

#[tokio::test]
async fn test_attachment_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    let doc = api.put(&json!({"id": "pic", "title": "cat"})).await.unwrap();

    let with_blob = api
        .put_attachment("pic", &[0xDE, 0xAD, 0xBE, 0xEF], "image/png")
        .await
        .unwrap();
    assert_eq!(with_blob.id, "pic");
    assert!(with_blob.rev.starts_with("2-"));
    assert_ne!(with_blob.rev, doc.rev);

    assert_eq!(
        api.get_attachment("pic").await.unwrap(),
        vec![0xDE, 0xAD, 0xBE, 0xEF]
    );

    // The document keeps its fields and gains a stub
    let stored = api.get("pic").await.unwrap();
    assert_eq!(stored.field("title"), Some(&json!("cat")));
    let stub = &stored.attachments[""];
    assert_eq!(stub.length, 4);
    assert_eq!(stub.content_type, "image/png");

    let err = api.remove_attachment("pic", "").await.unwrap_err();
    assert_eq!(err.message(), "params error");

    let err = api.remove_attachment("pic", &doc.rev).await.unwrap_err();
    assert_eq!(err.name(), "conflict");

    let removed = api.remove_attachment("pic", &with_blob.rev).await.unwrap();
    assert!(removed.rev.starts_with("3-"));
    assert!(api.get_attachment("pic").await.is_none());
}

#[tokio::test]
async fn test_put_attachment_creates_document() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    let stamp = api
        .put_attachment("fresh", b"bytes", "application/octet-stream")
        .await
        .unwrap();
    assert!(stamp.rev.starts_with("1-"));

    let doc = api.get("fresh").await.unwrap();
    assert!(doc.fields.is_empty());
    assert_eq!(doc.attachments.len(), 1);
}

#[tokio::test]
async fn test_attachment_survives_document_update() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    api.put_attachment("a", b"payload", "text/plain").await.unwrap();

    // Round-trip the stored document, stubs included
    let mut doc = api.get("a").await.unwrap().to_value();
    doc["note"] = json!("edited");
    api.put(&doc).await.unwrap();

    assert_eq!(api.get_attachment("a").await.unwrap(), b"payload");
}

#[tokio::test]
async fn test_missing_attachment_is_none() {
    let temp_dir = TempDir::new().unwrap();
    let (_store, api) = notes(&temp_dir).await;

    api.put(&json!({"id": "plain"})).await.unwrap();
    assert!(api.get_attachment("plain").await.is_none());
    assert!(api.get_attachment("absent").await.is_none());
}
