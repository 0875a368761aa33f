//! Record log reader
//!
//! Used for the startup scan that rebuilds the key index and for point reads
//! at known offsets. Every read validates the record checksum.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::errors::{StorageError, StorageResult};
use super::record::{LogRecord, MIN_RECORD_SIZE};

/// Sequential and offset-addressed reader over the record log.
pub struct LogReader {
    /// Path to the log file
    log_path: PathBuf,
    /// Buffered reader
    reader: BufReader<File>,
    /// Current byte offset
    current_offset: u64,
    /// File size captured at open
    file_size: u64,
}

impl LogReader {
    /// Opens the log file for reading.
    pub fn open(log_path: &Path) -> StorageResult<Self> {
        let file = File::open(log_path).map_err(|e| {
            StorageError::io(format!("Failed to open log file: {}", log_path.display()), e)
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| StorageError::io("Failed to read file metadata", e))?
            .len();

        Ok(Self {
            log_path: log_path.to_path_buf(),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
        })
    }

    /// Returns the log file path.
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Returns the current read offset.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` at end of file. A truncated tail or checksum
    /// failure is reported as corruption.
    pub fn read_next(&mut self) -> StorageResult<Option<LogRecord>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        let min_size = MIN_RECORD_SIZE as u64;

        if remaining < min_size {
            return Err(StorageError::TornRecord {
                offset: self.current_offset,
                reason: format!(
                    "{} bytes remaining, minimum record size is {}",
                    remaining, min_size
                ),
            });
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            StorageError::io(
                format!("Failed to read record length at byte {}", self.current_offset),
                e,
            )
        })?;
        let record_length = u32::from_le_bytes(len_buf) as u64;

        if record_length < min_size {
            return Err(StorageError::Malformed {
                offset: self.current_offset,
                reason: format!("invalid record length {}", record_length),
            });
        }

        if record_length > remaining {
            return Err(StorageError::TornRecord {
                offset: self.current_offset,
                reason: format!(
                    "record length {} exceeds remaining file size {}",
                    record_length, remaining
                ),
            });
        }

        let mut record_buf = vec![0u8; record_length as usize];
        record_buf[0..4].copy_from_slice(&len_buf);

        self.reader.read_exact(&mut record_buf[4..]).map_err(|e| {
            StorageError::io(
                format!("Failed to read record at byte {}", self.current_offset),
                e,
            )
        })?;

        let (record, consumed) = LogRecord::deserialize(&record_buf, self.current_offset)?;

        self.current_offset += consumed as u64;

        Ok(Some(record))
    }

    /// Seeks to a specific offset in the file.
    pub fn seek_to(&mut self, offset: u64) -> StorageResult<()> {
        self.reader.seek(SeekFrom::Start(offset)).map_err(|e| {
            StorageError::io(format!("Failed to seek to offset {}", offset), e)
        })?;
        self.current_offset = offset;
        Ok(())
    }

    /// Reads a single record at the specified offset.
    pub fn read_at(&mut self, offset: u64) -> StorageResult<LogRecord> {
        self.seek_to(offset)?;
        match self.read_next()? {
            Some(record) => Ok(record),
            None => Err(StorageError::TornRecord {
                offset,
                reason: "no record at offset".to_string(),
            }),
        }
    }
}

impl Iterator for LogReader {
    type Item = StorageResult<(u64, LogRecord)>;

    /// Yields `(offset, record)` pairs; stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.current_offset;
        match self.read_next() {
            Ok(Some(record)) => Some(Ok((offset, record))),
            Ok(None) => None,
            Err(e) => {
                self.current_offset = self.file_size;
                Some(Err(e))
            }
        }
    }
}
