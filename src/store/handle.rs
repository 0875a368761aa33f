//! Shared engine handle

use std::sync::{Arc, RwLock};

use crate::engine::DocumentEngine;

/// The one engine reference every collection of a store goes through.
///
/// Empty before `start` and after `close`; collections see that as a closed
/// store.
#[derive(Default)]
pub struct StorageHandle {
    engine: RwLock<Option<Arc<dyn DocumentEngine>>>,
}

impl StorageHandle {
    /// An empty (closed) handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Current engine, if the store is open
    pub fn engine(&self) -> Option<Arc<dyn DocumentEngine>> {
        match self.engine.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.engine().is_some()
    }

    /// Install `engine` unless one is already installed; returns whichever
    /// engine the handle ends up holding.
    pub(crate) fn install(&self, engine: Arc<dyn DocumentEngine>) -> Arc<dyn DocumentEngine> {
        let mut guard = match self.engine.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get_or_insert(engine).clone()
    }

    /// Detach the engine; later `engine()` calls return `None`.
    pub(crate) fn take(&self) -> Option<Arc<dyn DocumentEngine>> {
        let mut guard = match self.engine.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take()
    }
}

impl std::fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandle")
            .field("open", &self.is_open())
            .finish()
    }
}
