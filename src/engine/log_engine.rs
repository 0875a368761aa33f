//! Log-backed document engine
//!
//! Layout under the engine directory:
//!
//! ```text
//! <dir>/documents.log      record log, latest record per key wins
//! <dir>/attachments/xx/..  attachment blobs, addressed by key/name/digest
//! ```
//!
//! The key index (key -> latest revision, tombstone flag, log offset) is
//! rebuilt by scanning the log on open and kept in memory. Document bodies
//! are read back from the log on demand. All state sits behind one mutex;
//! the engine never holds it across calls.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::errors::{EngineError, EngineResult};
use super::revision::next_revision;
use super::types::{AttachmentStub, Document, ScanRow, WriteStamp};
use super::DocumentEngine;
use crate::attachments::{AttachmentBackend, LocalBackend};
use crate::storage::{LogReader, LogRecord, LogWriter, StorageError};

/// Record log file name inside the engine directory
pub const LOG_FILE: &str = "documents.log";

/// Attachment blob directory inside the engine directory
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Superseded records tolerated before auto-compaction kicks in
pub const COMPACTION_MIN_STALE: usize = 64;

/// Tuning knobs for [`LogEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Rewrite the log once superseded records outnumber live keys
    pub auto_compaction: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            auto_compaction: true,
        }
    }
}

/// Point-in-time counters, mostly for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Keys with any record, tombstones included
    pub keys: usize,
    /// Keys whose latest record is live
    pub live_documents: usize,
    /// Records in the log that a later record supersedes
    pub stale_records: usize,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    rev: String,
    deleted: bool,
    offset: u64,
}

/// What a live record's body holds: everything but the key and revision.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredBody {
    #[serde(
        rename = "_attachments",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    attachments: BTreeMap<String, AttachmentStub>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl StoredBody {
    fn encode(&self) -> EngineResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| EngineError::BadRequest(format!("Unserializable document: {}", e)))
    }

    fn decode(key: &str, bytes: &[u8]) -> EngineResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            StorageError::BadBody {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn into_document(self, key: &str, rev: &str) -> Document {
        Document {
            id: key.to_string(),
            rev: Some(rev.to_string()),
            attachments: self.attachments,
            fields: self.fields,
        }
    }
}

type DroppedBlobs = Vec<(String, AttachmentStub)>;

struct EngineState {
    writer: LogWriter,
    index: BTreeMap<String, IndexEntry>,
    stale_records: usize,
}

impl EngineState {
    fn live_entry(&self, key: &str) -> EngineResult<&IndexEntry> {
        match self.index.get(key) {
            None => Err(EngineError::missing()),
            Some(entry) if entry.deleted => Err(EngineError::deleted()),
            Some(entry) => Ok(entry),
        }
    }

    fn reader(&self) -> EngineResult<LogReader> {
        Ok(LogReader::open(self.writer.path())?)
    }

    fn read_body(&self, key: &str, entry: &IndexEntry) -> EngineResult<StoredBody> {
        read_stored(&mut self.reader()?, key, entry)
    }

    fn record(&mut self, record: LogRecord, sync: bool) -> EngineResult<()> {
        let offset = if sync {
            self.writer.append(&record)?
        } else {
            self.writer.append_unsynced(&record)?
        };
        let entry = IndexEntry {
            rev: record.rev,
            deleted: record.is_tombstone,
            offset,
        };
        if self.index.insert(record.key, entry).is_some() {
            self.stale_records += 1;
        }
        Ok(())
    }

    fn compact(&mut self) -> EngineResult<usize> {
        let log_path = self.writer.path().to_path_buf();
        let tmp_path = log_path.with_extension(format!("compact-{}", Uuid::new_v4()));

        // Everything fallible happens before the rename; after it the old
        // writer and offsets are swapped out without further I/O
        let (writer, offsets) = match self.write_compacted(&tmp_path) {
            Ok(compacted) => compacted,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&tmp_path, &log_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StorageError::io("Failed to swap in compacted log", e).into());
        }
        if let Some(dir) = log_path.parent().and_then(|p| fs::File::open(p).ok()) {
            // Persist the rename itself
            let _ = dir.sync_all();
        }
        self.writer = writer.moved_to(&log_path);

        for (key, offset) in offsets {
            if let Some(entry) = self.index.get_mut(&key) {
                entry.offset = offset;
            }
        }

        let reclaimed = std::mem::take(&mut self.stale_records);
        info!(
            target: "tenantdb::engine",
            path = %log_path.display(),
            keys = self.index.len(),
            reclaimed,
            "Compacted document log"
        );
        Ok(reclaimed)
    }

    /// Copies the latest record of every key into `tmp_path`, synced and
    /// ready to take over as the log.
    fn write_compacted(&self, tmp_path: &Path) -> EngineResult<(LogWriter, Vec<(String, u64)>)> {
        let mut reader = self.reader()?;
        let mut writer = LogWriter::create(tmp_path)?;
        let mut offsets = Vec::with_capacity(self.index.len());

        for (key, entry) in &self.index {
            let record = read_keyed(&mut reader, key, entry)?;
            offsets.push((key.clone(), writer.append_unsynced(&record)?));
        }
        writer.sync()?;

        Ok((writer, offsets))
    }
}

/// Embedded [`DocumentEngine`] over the record log.
pub struct LogEngine {
    dir: PathBuf,
    options: EngineOptions,
    blobs: Box<dyn AttachmentBackend>,
    state: Mutex<Option<EngineState>>,
}

impl std::fmt::Debug for LogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEngine")
            .field("dir", &self.dir)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl LogEngine {
    /// Opens (or creates) the engine rooted at `dir`, with attachment blobs
    /// on the local filesystem under `dir/attachments`.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created or the existing log does not
    /// scan cleanly (checksum failure, truncated tail).
    pub fn open(dir: &Path, options: EngineOptions) -> EngineResult<Self> {
        let blobs = LocalBackend::new(dir.join(ATTACHMENTS_DIR));
        Self::open_with_backend(dir, options, Box::new(blobs))
    }

    /// Opens the engine with a caller-provided attachment backend.
    pub fn open_with_backend(
        dir: &Path,
        options: EngineOptions,
        blobs: Box<dyn AttachmentBackend>,
    ) -> EngineResult<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            StorageError::io(
                format!("Failed to create engine directory: {}", dir.display()),
                e,
            )
        })?;

        let log_path = dir.join(LOG_FILE);
        let (index, total_records) = if log_path.exists() {
            scan_log(&log_path)?
        } else {
            (BTreeMap::new(), 0)
        };
        let writer = LogWriter::open(&log_path)?;
        let stale_records = total_records - index.len();

        info!(
            target: "tenantdb::engine",
            path = %log_path.display(),
            keys = index.len(),
            stale_records,
            "Opened document log"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            options,
            blobs,
            state: Mutex::new(Some(EngineState {
                writer,
                index,
                stale_records,
            })),
        })
    }

    /// Directory the engine is rooted at
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Current index counters
    pub fn stats(&self) -> EngineResult<EngineStats> {
        self.with_state(|state| {
            Ok(EngineStats {
                keys: state.index.len(),
                live_documents: state.index.values().filter(|e| !e.deleted).count(),
                stale_records: state.stale_records,
            })
        })
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, Option<EngineState>>> {
        self.state
            .lock()
            .map_err(|_| EngineError::Internal("engine state lock poisoned".to_string()))
    }

    /// Runs `f` against the open state.
    ///
    /// A writer left torn by `f` means the log holds records the index does
    /// not; the engine shuts itself so nothing is acknowledged on top.
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut EngineState) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut guard = self.lock()?;
        let state = guard.as_mut().ok_or(EngineError::Closed)?;
        let result = f(state);
        if state.writer.is_torn() {
            error!(
                target: "tenantdb::engine",
                path = %self.dir.display(),
                "Document log could not be rolled back; engine closed"
            );
            *guard = None;
        }
        result
    }

    fn put_locked(
        &self,
        state: &mut EngineState,
        key: &str,
        doc: Document,
        sync: bool,
    ) -> EngineResult<(WriteStamp, DroppedBlobs)> {
        let current = state.index.get(key).cloned();
        check_revision(current.as_ref(), doc.rev.as_deref())?;

        let mut attachments = match &current {
            Some(entry) if !entry.deleted => state.read_body(key, entry)?.attachments,
            _ => BTreeMap::new(),
        };
        if let Some(name) = doc
            .attachments
            .keys()
            .find(|name| !attachments.contains_key(*name))
        {
            return Err(EngineError::BadRequest(format!(
                "Unknown attachment stub: {:?}",
                name
            )));
        }

        // Stubs the caller left out are dropped along with their blobs
        let dropped: DroppedBlobs = attachments
            .iter()
            .filter(|(name, _)| !doc.attachments.contains_key(*name))
            .map(|(name, stub)| (name.clone(), stub.clone()))
            .collect();
        attachments.retain(|name, _| doc.attachments.contains_key(name));

        let body = StoredBody {
            attachments,
            fields: doc.fields,
        }
        .encode()?;
        let rev = next_revision(current.as_ref().map(|e| e.rev.as_str()), false, &body);
        state.record(LogRecord::live(key, rev.clone(), body), sync)?;

        Ok((WriteStamp::new(key, rev), dropped))
    }

    fn drop_blobs(&self, key: &str, stubs: &[(String, AttachmentStub)]) {
        for (name, stub) in stubs {
            match self.blobs.delete(&blob_path(key, name, &stub.digest)) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(
                    target: "tenantdb::engine",
                    key,
                    attachment = %name,
                    error = %e,
                    "Failed to delete attachment blob"
                ),
            }
        }
    }

    fn maybe_compact(&self, state: &mut EngineState) {
        let due = state.stale_records >= COMPACTION_MIN_STALE
            && state.stale_records > state.index.len();
        if !self.options.auto_compaction || !due {
            return;
        }
        if let Err(e) = state.compact() {
            warn!(target: "tenantdb::engine", error = %e, "Auto-compaction failed");
        }
    }
}

impl DocumentEngine for LogEngine {
    fn put(&self, key: &str, doc: Document) -> EngineResult<WriteStamp> {
        self.with_state(|state| {
            let (stamp, dropped) = self.put_locked(state, key, doc, true)?;
            self.drop_blobs(key, &dropped);
            self.maybe_compact(state);
            Ok(stamp)
        })
    }

    fn get(&self, key: &str) -> EngineResult<Document> {
        self.with_state(|state| {
            let entry = state.live_entry(key)?;
            let body = state.read_body(key, entry)?;
            Ok(body.into_document(key, &entry.rev))
        })
    }

    fn remove(&self, key: &str, rev: &str) -> EngineResult<WriteStamp> {
        self.with_state(|state| {
            let entry = state.live_entry(key)?.clone();
            if entry.rev != rev {
                return Err(EngineError::Conflict);
            }
            let body = state.read_body(key, &entry)?;

            let next = next_revision(Some(entry.rev.as_str()), true, &[]);
            state.record(LogRecord::tombstone(key, next.clone()), true)?;

            let dropped: DroppedBlobs = body.attachments.into_iter().collect();
            self.drop_blobs(key, &dropped);
            self.maybe_compact(state);
            Ok(WriteStamp::new(key, next))
        })
    }

    fn bulk_write(&self, docs: Vec<Document>) -> EngineResult<Vec<EngineResult<WriteStamp>>> {
        self.with_state(|state| {
            let mut results = Vec::with_capacity(docs.len());
            let mut dropped = Vec::new();
            let mut undo = Vec::new();
            let start = state.writer.current_offset();
            let stale_before = state.stale_records;

            for doc in docs {
                let key = doc.id.clone();
                let previous = state.index.get(&key).cloned();
                match self.put_locked(state, &key, doc, false) {
                    Ok((stamp, stubs)) => {
                        undo.push((key.clone(), previous));
                        dropped.push((key, stubs));
                        results.push(Ok(stamp));
                    }
                    Err(e) => results.push(Err(e)),
                }
            }

            if !dropped.is_empty() {
                if let Err(e) = state.writer.sync() {
                    // Nothing in the batch may be acknowledged or stay visible
                    let message = e.to_string();
                    warn!(target: "tenantdb::engine", error = %message, "Bulk write fsync failed");

                    for (key, previous) in undo.into_iter().rev() {
                        match previous {
                            Some(entry) => state.index.insert(key, entry),
                            None => state.index.remove(&key),
                        };
                    }
                    state.stale_records = stale_before;
                    let _ = state.writer.truncate_to(start);

                    for result in results.iter_mut().filter(|r| r.is_ok()) {
                        *result = Err(StorageError::io(
                            "Bulk write not durable",
                            std::io::Error::new(std::io::ErrorKind::Other, message.clone()),
                        )
                        .into());
                    }
                    return Ok(results);
                }
            }

            for (key, stubs) in &dropped {
                self.drop_blobs(key, stubs);
            }
            self.maybe_compact(state);
            Ok(results)
        })
    }

    fn range_scan(&self, low: &str, high: &str) -> EngineResult<Vec<ScanRow>> {
        self.with_state(|state| {
            if low > high {
                return Ok(Vec::new());
            }
            let mut reader = state.reader()?;
            let rows = state
                .index
                .range::<str, _>((Bound::Included(low), Bound::Included(high)))
                .filter(|(_, entry)| !entry.deleted)
                .map(|(key, entry)| match read_document(&mut reader, key, entry) {
                    Ok(doc) => ScanRow::found(key.as_str(), doc),
                    Err(e) => ScanRow::failed(key.as_str(), e),
                })
                .collect();
            Ok(rows)
        })
    }

    fn fetch_keys(&self, keys: &[String]) -> EngineResult<Vec<ScanRow>> {
        self.with_state(|state| {
            let mut reader = state.reader()?;
            let rows = keys
                .iter()
                .map(|key| match state.index.get(key) {
                    None => ScanRow::failed(key.as_str(), EngineError::missing()),
                    Some(entry) if entry.deleted => ScanRow::deleted(key.as_str()),
                    Some(entry) => match read_document(&mut reader, key, entry) {
                        Ok(doc) => ScanRow::found(key.as_str(), doc),
                        Err(e) => ScanRow::failed(key.as_str(), e),
                    },
                })
                .collect();
            Ok(rows)
        })
    }

    fn put_attachment(
        &self,
        key: &str,
        name: &str,
        rev: Option<&str>,
        data: &[u8],
        content_type: &str,
    ) -> EngineResult<WriteStamp> {
        self.with_state(|state| {
            let current = state.index.get(key).cloned();
            if let Some(rev) = rev {
                if current.as_ref().map(|e| e.rev.as_str()) != Some(rev) {
                    return Err(EngineError::Conflict);
                }
            }

            let mut body = match &current {
                Some(entry) if !entry.deleted => state.read_body(key, entry)?,
                _ => StoredBody::default(),
            };

            let stub = AttachmentStub {
                content_type: content_type.to_string(),
                length: data.len() as u64,
                digest: digest_of(data),
            };
            let path = blob_path(key, name, &stub.digest);
            self.blobs.write(&path, data)?;

            let replaced = body.attachments.insert(name.to_string(), stub.clone());
            let encoded = body.encode()?;
            let next = next_revision(current.as_ref().map(|e| e.rev.as_str()), false, &encoded);

            if let Err(e) = state.record(LogRecord::live(key, next.clone(), encoded), true) {
                if replaced.as_ref().map(|old| &old.digest) != Some(&stub.digest) {
                    let _ = self.blobs.delete(&path);
                }
                return Err(e);
            }

            if let Some(old) = replaced.filter(|old| old.digest != stub.digest) {
                self.drop_blobs(key, &[(name.to_string(), old)]);
            }
            debug!(
                target: "tenantdb::engine",
                key,
                attachment = %name,
                length = stub.length,
                "Stored attachment"
            );
            self.maybe_compact(state);
            Ok(WriteStamp::new(key, next))
        })
    }

    fn get_attachment(&self, key: &str, name: &str) -> EngineResult<Vec<u8>> {
        self.with_state(|state| {
            let entry = state.live_entry(key)?;
            let body = state.read_body(key, entry)?;
            let stub = body
                .attachments
                .get(name)
                .ok_or_else(EngineError::missing)?;
            Ok(self.blobs.read(&blob_path(key, name, &stub.digest))?)
        })
    }

    fn remove_attachment(&self, key: &str, name: &str, rev: &str) -> EngineResult<WriteStamp> {
        self.with_state(|state| {
            let entry = state.live_entry(key)?.clone();
            if entry.rev != rev {
                return Err(EngineError::Conflict);
            }

            let mut body = state.read_body(key, &entry)?;
            let stub = body
                .attachments
                .remove(name)
                .ok_or_else(EngineError::missing)?;

            let encoded = body.encode()?;
            let next = next_revision(Some(entry.rev.as_str()), false, &encoded);
            state.record(LogRecord::live(key, next.clone(), encoded), true)?;

            self.drop_blobs(key, &[(name.to_string(), stub)]);
            self.maybe_compact(state);
            Ok(WriteStamp::new(key, next))
        })
    }

    fn compact(&self) -> EngineResult<usize> {
        self.with_state(|state| state.compact())
    }

    fn close(&self) -> EngineResult<()> {
        let mut guard = self.lock()?;
        let Some(mut state) = guard.take() else {
            return Ok(());
        };

        if self.options.auto_compaction && state.stale_records > 0 {
            if let Err(e) = state.compact() {
                warn!(target: "tenantdb::engine", error = %e, "Compaction on close failed");
            }
        }
        state.writer.sync()?;

        info!(target: "tenantdb::engine", path = %self.dir.display(), "Closed document log");
        Ok(())
    }
}

/// Revision precondition for `put`.
fn check_revision(current: Option<&IndexEntry>, provided: Option<&str>) -> EngineResult<()> {
    match (current, provided) {
        (Some(entry), Some(rev)) if entry.rev == rev => Ok(()),
        (Some(entry), None) if entry.deleted => Ok(()),
        (None, None) => Ok(()),
        _ => Err(EngineError::Conflict),
    }
}

/// Reads the record `entry` points at, refusing one written for another key.
fn read_keyed(reader: &mut LogReader, key: &str, entry: &IndexEntry) -> EngineResult<LogRecord> {
    let record = reader.read_at(entry.offset)?;
    if record.key != key {
        return Err(StorageError::KeyMismatch {
            offset: entry.offset,
            expected: key.to_string(),
            found: record.key,
        }
        .into());
    }
    Ok(record)
}

fn read_stored(reader: &mut LogReader, key: &str, entry: &IndexEntry) -> EngineResult<StoredBody> {
    let record = read_keyed(reader, key, entry)?;
    StoredBody::decode(key, &record.body)
}

fn read_document(reader: &mut LogReader, key: &str, entry: &IndexEntry) -> EngineResult<Document> {
    Ok(read_stored(reader, key, entry)?.into_document(key, &entry.rev))
}

fn scan_log(log_path: &Path) -> EngineResult<(BTreeMap<String, IndexEntry>, usize)> {
    let mut index = BTreeMap::new();
    let mut total = 0;

    for item in LogReader::open(log_path)? {
        let (offset, record) = item?;
        total += 1;
        index.insert(
            record.key,
            IndexEntry {
                rev: record.rev,
                deleted: record.is_tombstone,
                offset,
            },
        );
    }

    Ok((index, total))
}

fn digest_of(data: &[u8]) -> String {
    format!("sha256-{}", STANDARD.encode(Sha256::digest(data)))
}

/// Blob location for one attachment version, fanned out on the first byte.
fn blob_path(key: &str, name: &str, digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update([0u8]);
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(digest.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    format!("{}/{}", &hex[..2], &hex[2..])
}
