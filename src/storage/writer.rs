//! Record log writer
//!
//! The log is append-only: records are never rewritten in place. Every
//! append is followed by an fsync before the offset is handed back, so an
//! acknowledged write survives a crash.
//!
//! A write or fsync that fails is rolled back by truncating the file to the
//! offset it started at. If that truncation fails too the writer is torn:
//! the file holds bytes nobody acknowledged and every later append is
//! refused.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::errors::{StorageError, StorageResult};
use super::record::LogRecord;

/// Append-only writer over the record log file.
pub struct LogWriter {
    /// Path to the log file
    log_path: PathBuf,
    /// Underlying file handle
    file: File,
    /// Offset at which the next record lands
    current_offset: u64,
    /// A rollback failed; the tail past `current_offset` is unknown
    torn: bool,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl LogWriter {
    /// Opens or creates the log file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the file cannot be created or opened.
    pub fn open(log_path: &Path) -> StorageResult<Self> {
        Self::open_with(log_path, false)
    }

    /// Creates a fresh, empty log file at `log_path`, truncating any
    /// existing content. Used to build compacted logs.
    pub fn create(log_path: &Path) -> StorageResult<Self> {
        Self::open_with(log_path, true)
    }

    fn open_with(log_path: &Path, truncate: bool) -> StorageResult<Self> {
        if let Some(parent) = log_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StorageError::io(
                        format!("Failed to create log directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let mut options = OpenOptions::new();
        options.create(true).read(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }

        let file = options.open(log_path).map_err(|e| {
            StorageError::io(format!("Failed to open log file: {}", log_path.display()), e)
        })?;

        let current_offset = file
            .metadata()
            .map_err(|e| StorageError::io("Failed to read file metadata", e))?
            .len();

        Ok(Self {
            log_path: log_path.to_path_buf(),
            file,
            current_offset,
            torn: false,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Re-labels the writer after its file was renamed to `log_path`.
    ///
    /// The open handle follows the file, so appends continue where they
    /// left off.
    pub fn moved_to(mut self, log_path: &Path) -> Self {
        self.log_path = log_path.to_path_buf();
        self
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Returns the offset at which the next record will be written.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Whether a failed rollback left unacknowledged bytes in the file
    pub fn is_torn(&self) -> bool {
        self.torn
    }

    /// Appends one record and fsyncs.
    ///
    /// Returns the byte offset where the record was written. On failure the
    /// record is truncated away again.
    pub fn append(&mut self, record: &LogRecord) -> StorageResult<u64> {
        let offset = self.append_unsynced(record)?;
        if let Err(e) = self.sync() {
            // A torn writer reports through is_torn(); the fsync error is the cause
            let _ = self.truncate_to(offset);
            return Err(e);
        }
        Ok(offset)
    }

    /// Flushes written records to disk.
    pub fn sync(&mut self) -> StorageResult<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(StorageError::io(
                format!("fsync failed on log: {}", self.log_path.display()),
                io::Error::new(io::ErrorKind::Other, "injected fsync failure"),
            ));
        }

        self.file.sync_all().map_err(|e| {
            StorageError::io(
                format!("fsync failed on log: {}", self.log_path.display()),
                e,
            )
        })
    }

    /// Appends one record without fsync; call [`LogWriter::sync`] before
    /// acknowledging it.
    pub fn append_unsynced(&mut self, record: &LogRecord) -> StorageResult<u64> {
        if self.torn {
            return Err(StorageError::io(
                format!("Log has an unrecovered partial write: {}", self.log_path.display()),
                io::Error::new(io::ErrorKind::Other, "torn log writer"),
            ));
        }

        let serialized = record.serialize()?;
        let offset = self.current_offset;

        if let Err(e) = self.file.write_all(&serialized) {
            let _ = self.truncate_to(offset);
            return Err(StorageError::io(
                format!("Failed to write record: {}", record.key),
                e,
            ));
        }

        self.current_offset += serialized.len() as u64;
        Ok(offset)
    }

    /// Drops everything past `offset`, undoing appends that were never
    /// acknowledged.
    pub fn truncate_to(&mut self, offset: u64) -> StorageResult<()> {
        let result = self
            .file
            .set_len(offset)
            .and_then(|()| self.file.seek(SeekFrom::Start(offset)));

        match result {
            Ok(_) => {
                self.current_offset = offset;
                self.torn = false;
                Ok(())
            }
            Err(e) => {
                self.torn = true;
                Err(StorageError::io(
                    format!("Failed to roll log back to byte {}", offset),
                    e,
                ))
            }
        }
    }

    /// Makes the next [`LogWriter::sync`] fail.
    #[cfg(test)]
    pub(crate) fn fail_next_sync(&mut self) {
        self.fail_next_sync = true;
    }
}
