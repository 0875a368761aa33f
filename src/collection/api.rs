//! Namespaced collection API
//!
//! A [`CollectionApi`] is bound to one namespace and shares the store's
//! engine handle. Every operation:
//!
//! 1. validates its input (failures are `exception` errors, no engine call)
//! 2. maps logical ids to physical keys
//! 3. runs the engine call on tokio's blocking pool
//! 4. maps physical keys back and normalizes any failure
//!
//! Reads (`get`, `get_attachment`) are fail-silent: any failure is `None`.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::error::{ErrorValue, OperationResult, CLOSED_MESSAGE};
use super::namespace::{Namespace, HIGH_SENTINEL};
use super::query::AllDocsQuery;
use super::quota::QuotaGuard;
use crate::engine::{Document, DocumentEngine, EngineResult, ScanRow, WriteStamp};
use crate::store::StorageHandle;

/// Attachment slot used by collections; one per document
pub const ATTACHMENT_NAME: &str = "";

/// Options for [`CollectionApi::put_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Enforce the document size quota
    pub strict: bool,
}

impl WriteOptions {
    /// Skip the document size quota
    pub fn lenient() -> Self {
        Self { strict: false }
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// What [`CollectionApi::remove`] accepts: a bare id or a document.
#[derive(Debug, Clone, Copy)]
pub enum DocRef<'a> {
    Id(&'a str),
    Doc(&'a Value),
}

impl<'a> From<&'a str> for DocRef<'a> {
    fn from(id: &'a str) -> Self {
        DocRef::Id(id)
    }
}

impl<'a> From<&'a String> for DocRef<'a> {
    fn from(id: &'a String) -> Self {
        DocRef::Id(id)
    }
}

impl<'a> From<&'a Value> for DocRef<'a> {
    fn from(doc: &'a Value) -> Self {
        match doc {
            Value::String(id) => DocRef::Id(id),
            other => DocRef::Doc(other),
        }
    }
}

/// Collection façade over the shared engine.
#[derive(Clone)]
pub struct CollectionApi {
    namespace: Namespace,
    quota: QuotaGuard,
    handle: Arc<StorageHandle>,
}

impl std::fmt::Debug for CollectionApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionApi")
            .field("namespace", &self.namespace)
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}

impl CollectionApi {
    pub fn new(namespace: Namespace, quota: QuotaGuard, handle: Arc<StorageHandle>) -> Self {
        Self {
            namespace,
            quota,
            handle,
        }
    }

    /// Collection name this API is bound to
    pub fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    /// Create or update a document, enforcing the size quota.
    pub async fn put(&self, doc: &Value) -> OperationResult<WriteStamp> {
        self.put_with(doc, WriteOptions::default()).await
    }

    /// Create or update a document.
    ///
    /// `doc` must be an object with a non-empty string `id`; to update an
    /// existing document it must also carry the current `rev`.
    pub async fn put_with(&self, doc: &Value, options: WriteOptions) -> OperationResult<WriteStamp> {
        if !doc.is_object() {
            return Err(ErrorValue::exception("params \"doc\" not object type"));
        }
        let id = required_id(doc)?.to_string();
        check_id(&id)?;
        if options.strict {
            if let Some(err) = self.quota.check_document_size(doc) {
                return Err(err);
            }
        }

        let mut document = self.to_document(doc, &id)?;
        document.id = self.namespace.encode(&id);
        let key = document.id.clone();

        let stamp = self
            .run(move |engine| engine.put(&key, document))
            .await
            .map_err(|e| e.with_id(&id))?;
        Ok(self.restore_stamp(stamp))
    }

    /// Read a document by logical id; `None` on any failure.
    pub async fn get(&self, id: &str) -> Option<Document> {
        let key = self.namespace.encode(id);
        let result = match self.engine() {
            Ok(engine) => self.blocking(engine, move |engine| engine.get(&key)).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(mut doc) => {
                doc.id = self.namespace.decode(&doc.id).to_string();
                Some(doc)
            }
            Err(e) => {
                debug!(
                    target: "tenantdb::collection",
                    namespace = %self.namespace,
                    id,
                    error = %e,
                    "get returned nothing"
                );
                None
            }
        }
    }

    /// Delete a document, given its id or the document itself.
    ///
    /// The current revision is looked up first, so removal never conflicts
    /// with a write the caller has not seen.
    pub async fn remove<'a>(&self, target: impl Into<DocRef<'a>>) -> OperationResult<WriteStamp> {
        let id = match target.into() {
            DocRef::Id(id) if !id.is_empty() => id.to_string(),
            DocRef::Id(_) => return Err(ErrorValue::exception("\"id\" empty")),
            DocRef::Doc(doc) => required_id(doc)?.to_string(),
        };
        check_id(&id)?;
        let key = self.namespace.encode(&id);

        let stamp = self
            .run(move |engine| {
                let current = engine.get(&key)?;
                let rev = current.rev.unwrap_or_default();
                engine.remove(&key, &rev)
            })
            .await
            .map_err(|e| e.with_id(&id))?;
        Ok(self.restore_stamp(stamp))
    }

    /// Write many documents in one engine call.
    ///
    /// The whole batch is validated first; any validation failure rejects
    /// it without writing anything. After that each document succeeds or
    /// fails on its own and results come back in input order.
    pub async fn bulk_write(&self, docs: &Value) -> OperationResult<Vec<OperationResult<WriteStamp>>> {
        let items = docs
            .as_array()
            .ok_or_else(|| ErrorValue::exception("docs must be a array"))?;

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            match item.get("id") {
                Some(Value::String(id)) if !id.is_empty() => ids.push(id.clone()),
                _ => return Err(ErrorValue::exception("doc not id field")),
            }
        }

        if ids.iter().collect::<HashSet<_>>().len() != ids.len() {
            return Err(ErrorValue::exception("id value is repeat"));
        }

        for (item, id) in items.iter().zip(&ids) {
            check_id(id)?;
            if let Some(err) = self.quota.check_document_size(item) {
                return Err(err.with_id(id));
            }
        }

        // Caller values stay untouched; namespacing happens on copies
        let mut documents = Vec::with_capacity(items.len());
        for (item, id) in items.iter().zip(&ids) {
            let mut document = self.to_document(item, id)?;
            document.id = self.namespace.encode(id);
            documents.push(document);
        }

        let results = self
            .run(move |engine| engine.bulk_write(documents))
            .await?;

        Ok(results
            .into_iter()
            .zip(ids)
            .map(|(result, id)| match result {
                Ok(stamp) => Ok(self.restore_stamp(stamp)),
                Err(e) => Err(ErrorValue::from_engine(&e).with_id(id)),
            })
            .collect())
    }

    /// Documents of this collection matching `query`, ids restored.
    ///
    /// Rows the engine cannot materialize are skipped, and a failed scan
    /// yields an empty list. Only a closed store is reported as an error.
    pub async fn range_query(&self, query: &AllDocsQuery) -> OperationResult<Vec<Document>> {
        let engine = self.engine()?;

        let scan: Box<dyn FnOnce(&dyn DocumentEngine) -> EngineResult<Vec<ScanRow>> + Send> =
            match query {
                AllDocsQuery::All => {
                    let (low, high) = self.namespace.range_bounds(None);
                    Box::new(move |engine| engine.range_scan(&low, &high))
                }
                AllDocsQuery::Prefix(prefix) => {
                    let (low, high) = self.namespace.range_bounds(Some(prefix.as_str()));
                    Box::new(move |engine| engine.range_scan(&low, &high))
                }
                AllDocsQuery::Keys(ids) => {
                    let keys: Vec<String> = ids.iter().map(|id| self.namespace.encode(id)).collect();
                    Box::new(move |engine| engine.fetch_keys(&keys))
                }
            };

        let rows = match self.blocking(engine, scan).await {
            Ok(rows) => rows,
            Err(e) => {
                debug!(
                    target: "tenantdb::collection",
                    namespace = %self.namespace,
                    error = %e,
                    "Range scan failed"
                );
                return Ok(Vec::new());
            }
        };

        let docs = rows
            .into_iter()
            .filter_map(|row| match row {
                ScanRow {
                    doc: Some(mut doc),
                    error: None,
                    ..
                } => {
                    doc.id = self.namespace.decode(&doc.id).to_string();
                    Some(doc)
                }
                ScanRow {
                    key,
                    error: Some(e),
                    ..
                } => {
                    debug!(target: "tenantdb::collection", key = %key, error = %e, "Skipping row");
                    None
                }
                _ => None,
            })
            .collect();
        Ok(docs)
    }

    /// Store `data` as the document's attachment, creating the document if
    /// it does not exist yet.
    pub async fn put_attachment(
        &self,
        id: &str,
        data: &[u8],
        content_type: &str,
    ) -> OperationResult<WriteStamp> {
        if id.is_empty() {
            return Err(ErrorValue::exception("\"id\" empty"));
        }
        check_id(id)?;
        if let Some(err) = self.quota.check_attachment_size(data) {
            return Err(err.with_id(id));
        }

        let key = self.namespace.encode(id);
        let data = data.to_vec();
        let content_type = content_type.to_string();

        let stamp = self
            .run(move |engine| {
                engine.put_attachment(&key, ATTACHMENT_NAME, None, &data, &content_type)
            })
            .await
            .map_err(|e| e.with_id(id))?;
        Ok(self.restore_stamp(stamp))
    }

    /// Raw attachment bytes; `None` on any failure.
    pub async fn get_attachment(&self, id: &str) -> Option<Vec<u8>> {
        let key = self.namespace.encode(id);
        let result = match self.engine() {
            Ok(engine) => {
                self.blocking(engine, move |engine| {
                    engine.get_attachment(&key, ATTACHMENT_NAME)
                })
                .await
            }
            Err(e) => Err(e),
        };

        result
            .map_err(|e| {
                debug!(
                    target: "tenantdb::collection",
                    namespace = %self.namespace,
                    id,
                    error = %e,
                    "get_attachment returned nothing"
                );
            })
            .ok()
    }

    /// Drop the document's attachment. Both `id` and `rev` are required.
    pub async fn remove_attachment(&self, id: &str, rev: &str) -> OperationResult<WriteStamp> {
        if id.is_empty() || rev.is_empty() {
            return Err(ErrorValue::exception("params error"));
        }
        check_id(id)?;

        let key = self.namespace.encode(id);
        let rev = rev.to_string();

        let stamp = self
            .run(move |engine| engine.remove_attachment(&key, ATTACHMENT_NAME, &rev))
            .await
            .map_err(|e| e.with_id(id))?;
        Ok(self.restore_stamp(stamp))
    }

    fn engine(&self) -> OperationResult<Arc<dyn DocumentEngine>> {
        self.handle
            .engine()
            .ok_or_else(|| ErrorValue::exception(CLOSED_MESSAGE))
    }

    /// Run `f` against `engine` on the blocking pool.
    async fn blocking<T, F>(&self, engine: Arc<dyn DocumentEngine>, f: F) -> OperationResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DocumentEngine) -> EngineResult<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || f(engine.as_ref()))
            .await
            .map_err(|e| ErrorValue::exception(format!("engine task failed: {}", e)))?
            .map_err(ErrorValue::from)
    }

    async fn run<T, F>(&self, f: F) -> OperationResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DocumentEngine) -> EngineResult<T> + Send + 'static,
    {
        let engine = self.engine()?;
        self.blocking(engine, f).await
    }

    fn to_document(&self, doc: &Value, id: &str) -> OperationResult<Document> {
        Document::from_value(doc.clone())
            .map_err(|e| ErrorValue::exception(format!("invalid document: {}", e)).with_id(id))
    }

    fn restore_stamp(&self, mut stamp: WriteStamp) -> WriteStamp {
        stamp.id = self.namespace.decode(&stamp.id).to_string();
        stamp
    }
}

/// Non-empty string `id` of a document-shaped value
fn required_id(doc: &Value) -> OperationResult<&str> {
    match doc.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id),
        _ => Err(ErrorValue::exception("\"id\" empty")),
    }
}

/// Ids may not carry the range sentinel, or prefix scans would miss them.
fn check_id(id: &str) -> OperationResult<()> {
    if id.contains(HIGH_SENTINEL) {
        return Err(ErrorValue::exception("\"id\" contains a reserved character").with_id(id));
    }
    Ok(())
}
