// src/store/mod.rs
//! Durable catalog state.

pub mod schema;
pub mod sqlite;

use crate::error::StorageError;
use crate::model::Entity;

/// The ability to persist decoded records.
///
/// Both operations are transactional: a batch commits completely or not at
/// all. Writing a record whose id already exists replaces it.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    /// Returns the number of records written.
    async fn upsert_batch(&self, entities: Vec<Entity>) -> Result<usize, StorageError>;

    async fn upsert(&self, entity: Entity) -> Result<(), StorageError> {
        self.upsert_batch(vec![entity]).await.map(|_| ())
    }
}

pub use sqlite::{CatalogExport, SqliteCatalogStore, StoreStats};
