//! Log record format
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE)
//! +------------------+
//! | Key              | (length-prefixed string)
//! +------------------+
//! | Revision         | (length-prefixed string)
//! +------------------+
//! | Tombstone Flag   | (u8: 0 = live, 1 = deleted)
//! +------------------+
//! | Body             | (length-prefixed bytes)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Checksum covers all bytes except the checksum itself.

use std::io::{self, Read};

use super::checksum::compute_checksum;
use super::errors::{StorageError, StorageResult};

/// Smallest possible record: length + key len + rev len + flag + body len + checksum.
pub const MIN_RECORD_SIZE: usize = 4 + 4 + 4 + 1 + 4 + 4;

/// One entry in the record log.
///
/// Multiple records for the same key may exist; the latest one in file
/// order is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Physical (namespaced) key
    pub key: String,
    /// Revision token stamped by the engine
    pub rev: String,
    /// Whether this record deletes the key
    pub is_tombstone: bool,
    /// Serialized document body (empty for tombstones)
    pub body: Vec<u8>,
}

impl LogRecord {
    /// Create a record for a live document
    pub fn live(key: impl Into<String>, rev: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            rev: rev.into(),
            is_tombstone: false,
            body,
        }
    }

    /// Create a tombstone record
    pub fn tombstone(key: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            rev: rev.into(),
            is_tombstone: true,
            body: Vec::new(),
        }
    }

    fn serialize_body(&self) -> StorageResult<Vec<u8>> {
        let mut buf =
            Vec::with_capacity(4 + self.key.len() + 4 + self.rev.len() + 1 + 4 + self.body.len());

        buf.extend_from_slice(&self.len_prefix(self.key.len())?);
        buf.extend_from_slice(self.key.as_bytes());

        buf.extend_from_slice(&self.len_prefix(self.rev.len())?);
        buf.extend_from_slice(self.rev.as_bytes());

        buf.push(if self.is_tombstone { 1 } else { 0 });

        buf.extend_from_slice(&self.len_prefix(self.body.len())?);
        buf.extend_from_slice(&self.body);

        Ok(buf)
    }

    fn len_prefix(&self, len: usize) -> StorageResult<[u8; 4]> {
        u32::try_from(len)
            .map(u32::to_le_bytes)
            .map_err(|_| StorageError::RecordTooLarge {
                key: self.key.clone(),
                len,
            })
    }

    /// Serialize the complete record to bytes.
    ///
    /// Fails with `RecordTooLarge` when any field, or the whole record,
    /// does not fit a u32 length.
    pub fn serialize(&self) -> StorageResult<Vec<u8>> {
        let body = self.serialize_body()?;
        let length_prefix = self.len_prefix(4 + body.len() + 4)?;

        let mut record = Vec::with_capacity(4 + body.len() + 4);
        record.extend_from_slice(&length_prefix);
        record.extend_from_slice(&body);

        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());

        Ok(record)
    }

    /// Deserialize a record from bytes, verifying checksum.
    ///
    /// `offset` is where `data` starts in the log and only feeds error
    /// reports. Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8], offset: u64) -> StorageResult<(Self, usize)> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(StorageError::TornRecord {
                offset,
                reason: format!("{} bytes, minimum record size is {}", data.len(), MIN_RECORD_SIZE),
            });
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if record_length < MIN_RECORD_SIZE {
            return Err(StorageError::Malformed {
                offset,
                reason: format!("invalid record length {}", record_length),
            });
        }

        if data.len() < record_length {
            return Err(StorageError::TornRecord {
                offset,
                reason: format!("expected {} bytes, got {}", record_length, data.len()),
            });
        }

        let checksum_offset = record_length - 4;
        let stored = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed = compute_checksum(&data[0..checksum_offset]);

        if computed != stored {
            return Err(StorageError::ChecksumMismatch {
                offset,
                computed,
                stored,
            });
        }

        let malformed = |e: io::Error| StorageError::Malformed {
            offset,
            reason: e.to_string(),
        };
        let mut cursor = io::Cursor::new(&data[4..checksum_offset]);

        let key = read_string(&mut cursor).map_err(malformed)?;
        let rev = read_string(&mut cursor).map_err(malformed)?;

        let mut tombstone_buf = [0u8; 1];
        cursor.read_exact(&mut tombstone_buf).map_err(malformed)?;
        let is_tombstone = tombstone_buf[0] != 0;

        let body = read_bytes(&mut cursor).map_err(malformed)?;

        Ok((
            Self {
                key,
                rev,
                is_tombstone,
                body,
            },
            record_length,
        ))
    }
}

fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let buf = read_bytes(reader)?;
    String::from_utf8(buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> LogRecord {
        LogRecord::live("notes/note1", "1-abc", br#"{"text":"hi"}"#.to_vec())
    }

    #[test]
    fn test_record_roundtrip() {
        let record = sample_record();
        let serialized = record.serialize().unwrap();
        let (deserialized, consumed) = LogRecord::deserialize(&serialized, 0).unwrap();

        assert_eq!(record, deserialized);
        assert_eq!(consumed, serialized.len());
    }

    #[test]
    fn test_tombstone_has_empty_body() {
        let record = LogRecord::tombstone("notes/note1", "2-def");
        let (deserialized, _) = LogRecord::deserialize(&record.serialize().unwrap(), 0).unwrap();

        assert!(deserialized.is_tombstone);
        assert!(deserialized.body.is_empty());
        assert_eq!(deserialized.rev, "2-def");
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut serialized = sample_record().serialize().unwrap();
        let mid = serialized.len() / 2;
        serialized[mid] ^= 0xFF;

        let err = LogRecord::deserialize(&serialized, 64).unwrap_err();
        assert!(matches!(err, StorageError::ChecksumMismatch { offset: 64, .. }));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_truncated_record_rejected() {
        let serialized = sample_record().serialize().unwrap();
        let result = LogRecord::deserialize(&serialized[..serialized.len() - 3], 0);
        assert!(matches!(result, Err(StorageError::TornRecord { .. })));
    }

    #[test]
    fn test_non_ascii_key_survives() {
        let record = LogRecord::live("plugins/日本語", "1-x", b"{}".to_vec());
        let (deserialized, _) = LogRecord::deserialize(&record.serialize().unwrap(), 0).unwrap();
        assert_eq!(deserialized.key, "plugins/日本語");
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_oversized_length_is_rejected() {
        let record = sample_record();
        let too_long = u32::MAX as usize + 1;

        let err = record.len_prefix(too_long).unwrap_err();
        assert!(matches!(
            err,
            StorageError::RecordTooLarge { ref key, len } if key == "notes/note1" && len == too_long
        ));
        assert!(!err.is_corruption());
        assert_eq!(record.len_prefix(u32::MAX as usize).unwrap(), [0xFF; 4]);
    }
}
