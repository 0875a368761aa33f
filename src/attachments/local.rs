//! # Local Filesystem Backend

use std::fs;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use super::backend::AttachmentBackend;
use super::errors::{AttachmentError, AttachmentResult};

/// Attachment backend storing each blob as a file under `root`.
#[derive(Debug)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local backend
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn full_path(&self, path: &str) -> AttachmentResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(AttachmentError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(e: std::io::Error) -> AttachmentError {
    AttachmentError::IoError(e.to_string())
}

impl AttachmentBackend for LocalBackend {
    fn write(&self, path: &str, data: &[u8]) -> AttachmentResult<()> {
        let full_path = self.full_path(path)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        // Readers never observe a half-written blob
        let tmp_path = full_path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        fs::write(&tmp_path, data).map_err(io_error)?;
        fs::rename(&tmp_path, &full_path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_error(e)
        })
    }

    fn read(&self, path: &str) -> AttachmentResult<Vec<u8>> {
        let full_path = self.full_path(path)?;

        fs::read(&full_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AttachmentError::ObjectNotFound(path.to_string())
            } else {
                io_error(e)
            }
        })
    }

    fn delete(&self, path: &str) -> AttachmentResult<()> {
        let full_path = self.full_path(path)?;

        fs::remove_file(&full_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AttachmentError::ObjectNotFound(path.to_string())
            } else {
                io_error(e)
            }
        })
    }
}
