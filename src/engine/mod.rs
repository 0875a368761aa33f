//! Document engine
//!
//! [`DocumentEngine`] is the key/value-oriented document store that every
//! collection shares. It owns revision stamping and optimistic concurrency:
//! writes name the revision they expect to replace and fail with a
//! `conflict` otherwise. Keys are opaque strings to the engine; namespacing
//! happens above it.
//!
//! [`LogEngine`] is the embedded implementation backed by the record log
//! and a local attachment blob tree.

mod errors;
mod log_engine;
mod revision;
mod types;

pub use errors::{EngineError, EngineResult};
pub use log_engine::{
    EngineOptions, EngineStats, LogEngine, ATTACHMENTS_DIR, COMPACTION_MIN_STALE, LOG_FILE,
};
pub use revision::{generation, next_revision};
pub use types::{AttachmentStub, Document, ScanRow, WriteStamp};

/// Storage primitives the collection layer is built on.
///
/// Implementations must be safe to share across threads; calls may block on
/// I/O.
pub trait DocumentEngine: Send + Sync {
    /// Create or update the document at `key`.
    ///
    /// `doc.rev` must name the current revision of a live document, and must
    /// be absent (or the tombstone's revision) otherwise.
    fn put(&self, key: &str, doc: Document) -> EngineResult<WriteStamp>;

    /// Read the live document at `key`.
    fn get(&self, key: &str) -> EngineResult<Document>;

    /// Tombstone the document at `key`, which must currently be at `rev`.
    fn remove(&self, key: &str, rev: &str) -> EngineResult<WriteStamp>;

    /// Apply each document (keyed by its `id`) with `put` semantics.
    ///
    /// The outer error is reserved for failures of the whole call; per
    /// document outcomes are reported in input order.
    fn bulk_write(&self, docs: Vec<Document>) -> EngineResult<Vec<EngineResult<WriteStamp>>>;

    /// Live documents with `low <= key <= high`, in key order.
    fn range_scan(&self, low: &str, high: &str) -> EngineResult<Vec<ScanRow>>;

    /// One row per requested key, in request order.
    fn fetch_keys(&self, keys: &[String]) -> EngineResult<Vec<ScanRow>>;

    /// Store `data` as attachment `name` of the document at `key`.
    ///
    /// `rev = None` writes against whatever revision is current, creating
    /// the document if needed.
    fn put_attachment(
        &self,
        key: &str,
        name: &str,
        rev: Option<&str>,
        data: &[u8],
        content_type: &str,
    ) -> EngineResult<WriteStamp>;

    /// Raw bytes of attachment `name` on the live document at `key`.
    fn get_attachment(&self, key: &str, name: &str) -> EngineResult<Vec<u8>>;

    /// Drop attachment `name` from the document at `key`, currently at `rev`.
    fn remove_attachment(&self, key: &str, name: &str, rev: &str) -> EngineResult<WriteStamp>;

    /// Reclaim space held by superseded records. Returns how many records
    /// were dropped.
    fn compact(&self) -> EngineResult<usize>;

    /// Flush and release the engine; later calls fail with `closed`.
    fn close(&self) -> EngineResult<()>;
}
