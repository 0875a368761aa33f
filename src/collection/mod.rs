//! Namespaced collections over the shared document engine
//!
//! - [`namespace`]: logical id <-> physical key mapping and scan bounds
//! - [`quota`]: document and attachment size limits
//! - [`error`]: the uniform error value every operation fails with
//! - [`api`]: the per-namespace operations

pub mod api;
pub mod error;
pub mod namespace;
pub mod query;
pub mod quota;

pub use api::{CollectionApi, DocRef, WriteOptions, ATTACHMENT_NAME};
pub use error::{ErrorValue, OperationResult, CLOSED_MESSAGE, EXCEPTION};
pub use namespace::{Namespace, DELIMITER, HIGH_SENTINEL};
pub use query::AllDocsQuery;
pub use quota::QuotaGuard;
