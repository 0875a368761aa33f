//! Store lifecycle
//!
//! A [`Store`] owns the configuration and the shared [`StorageHandle`].
//! Startup sequence:
//!
//! 1. Validate configuration
//! 2. Create `<data_dir>/<db_name>` if absent
//! 3. Open the engine (scans the record log and rebuilds the key index)
//! 4. Install it in the handle; collections can now reach it
//!
//! `close` detaches the engine from the handle first, so collections start
//! failing with a closed-store error before the engine is flushed.

mod errors;
mod handle;

pub use errors::{StoreError, StoreResult};
pub use handle::StorageHandle;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::collection::{CollectionApi, Namespace, QuotaGuard};
use crate::config::StoreConfig;
use crate::engine::{DocumentEngine, EngineOptions, LogEngine};

/// One physical store shared by any number of collections.
#[derive(Debug)]
pub struct Store {
    config: StoreConfig,
    handle: Arc<StorageHandle>,
    /// Serializes start/close
    lifecycle: Mutex<()>,
}

impl Store {
    /// Validate `config`; the engine is not opened until [`Store::start`].
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            handle: Arc::new(StorageHandle::new()),
            lifecycle: Mutex::new(()),
        })
    }

    /// Construct and start in one step.
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        let store = Self::new(config)?;
        store.start().await?;
        Ok(store)
    }

    /// Create the store directory and open the engine.
    ///
    /// Starting an open store is a no-op that keeps the existing engine.
    pub async fn start(&self) -> StoreResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.handle.is_open() {
            return Ok(());
        }

        let path = self.engine_path();
        let options = EngineOptions {
            auto_compaction: self.config.auto_compaction,
        };

        let engine = tokio::task::spawn_blocking(move || -> StoreResult<LogEngine> {
            fs::create_dir_all(&path).map_err(|source| StoreError::CreateDir {
                path: path.clone(),
                source,
            })?;
            Ok(LogEngine::open(&path, options)?)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        self.handle.install(Arc::new(engine));
        info!(
            target: "tenantdb::store",
            path = %self.engine_path().display(),
            "Store started"
        );
        Ok(())
    }

    /// Detach and close the engine. Closing a closed store is a no-op.
    pub async fn close(&self) -> StoreResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(engine) = self.handle.take() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || engine.close())
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        info!(
            target: "tenantdb::store",
            path = %self.engine_path().display(),
            "Store closed"
        );
        Ok(())
    }

    /// Bind a collection API to `name`.
    ///
    /// Works on a closed store too; its operations then fail as closed.
    pub fn collection(&self, name: &str) -> StoreResult<CollectionApi> {
        let namespace =
            Namespace::new(name).map_err(|e| StoreError::InvalidNamespace(e.message().to_string()))?;
        Ok(CollectionApi::new(
            namespace,
            QuotaGuard::from_config(&self.config),
            self.handle.clone(),
        ))
    }

    /// Rewrite the record log, dropping superseded records.
    pub async fn compact(&self) -> StoreResult<usize> {
        let engine = self
            .handle
            .engine()
            .ok_or(StoreError::Engine(crate::engine::EngineError::Closed))?;

        let reclaimed = tokio::task::spawn_blocking(move || engine.compact())
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        Ok(reclaimed)
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// `<data_dir>/<db_name>`
    pub fn engine_path(&self) -> PathBuf {
        self.config.engine_path()
    }

    /// The engine currently installed, if open
    pub fn engine(&self) -> Option<Arc<dyn DocumentEngine>> {
        self.handle.engine()
    }
}
