//! Metadata store abstraction and implementations for SheetVault.
//!
//! This crate provides the relational side of the data model:
//! - Logical files and their version head pointer
//! - Immutable version records
//! - Per-version cell changes
//! - Exclusive write leases

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use repos::CommitOutcome;
pub use store::{MetadataStore, SqliteStore};

use sheetvault_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    config.validate().map_err(MetadataError::Config)?;

    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
