//! Record log for the embedded engine
//!
//! The log holds the canonical persistent state of every document in the
//! store, across all collections.
//!
//! - Append-only (no in-place updates)
//! - Checksum-verified on every read
//! - Latest record wins for the same key
//! - Tombstones are kept until compaction rewrites the file

mod checksum;
mod errors;
mod reader;
mod record;
mod writer;

pub use checksum::compute_checksum;
pub use errors::{StorageError, StorageResult};
pub use reader::LogReader;
pub use record::{LogRecord, MIN_RECORD_SIZE};
pub use writer::LogWriter;
