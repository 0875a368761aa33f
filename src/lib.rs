//! tenantdb - many isolated document collections over one embedded store
//!
//! Layers, bottom up:
//!
//! - [`storage`]: append-only checksummed record log
//! - [`attachments`]: attachment blob backends
//! - [`engine`]: the document engine (revisions, optimistic concurrency)
//! - [`collection`]: namespaced collection API with quotas and error values
//! - [`store`]: directory bootstrap and the shared engine handle
//!
//! ```no_run
//! use serde_json::json;
//! use tenantdb::{Store, StoreConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open(StoreConfig::new("/var/lib/app/db")).await?;
//! let notes = store.collection("notes")?;
//!
//! let stamp = notes.put(&json!({"id": "note1", "text": "hi"})).await?;
//! assert_eq!(stamp.id, "note1");
//! # Ok(())
//! # }
//! ```

pub mod attachments;
pub mod collection;
pub mod config;
pub mod engine;
pub mod storage;
pub mod store;

pub use collection::{
    AllDocsQuery, CollectionApi, DocRef, ErrorValue, Namespace, OperationResult, QuotaGuard,
    WriteOptions,
};
pub use config::{ConfigError, StoreConfig};
pub use engine::{
    AttachmentStub, Document, DocumentEngine, EngineError, EngineOptions, LogEngine, WriteStamp,
};
pub use store::{StorageHandle, Store, StoreError, StoreResult};
