//! # Attachment Blob Storage
//!
//! Raw attachment bytes live outside the record log; documents only carry
//! a stub (content type, length, digest) pointing at them.

pub mod backend;
pub mod errors;
pub mod local;

pub use backend::AttachmentBackend;
pub use errors::{AttachmentError, AttachmentResult};
pub use local::LocalBackend;
