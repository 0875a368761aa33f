//! # Attachment Backend Trait

use super::errors::AttachmentResult;

/// Blob store holding raw attachment bytes.
///
/// Paths are relative, `/`-separated and chosen by the engine.
pub trait AttachmentBackend: Send + Sync + std::fmt::Debug {
    /// Write data to path, replacing any previous content
    fn write(&self, path: &str, data: &[u8]) -> AttachmentResult<()>;

    /// Read data from path
    fn read(&self, path: &str) -> AttachmentResult<Vec<u8>>;

    /// Delete blob at path
    fn delete(&self, path: &str) -> AttachmentResult<()>;
}
