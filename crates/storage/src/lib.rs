//! Blob storage abstraction and backends for SheetVault.
//!
//! This crate provides:
//! - An object store trait with atomic writes
//! - A local filesystem backend
//! - Content-addressed blob storage keyed by SHA-256

pub mod backends;
pub mod content;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use content::{BLOCKING_HASH_THRESHOLD, ContentStore, StoredBlob};
pub use error::{StorageError, StorageResult};
pub use traits::{ObjectMeta, ObjectStore};

use sheetvault_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
