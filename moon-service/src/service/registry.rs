//! # Schema Registry
//!
//! The in-process source of truth for collection shape: a map from
//! collection name to ordered column list, backed by `moon_collections`.
//!
//! ## Consistency Rules
//!
//! - Readers take a read lock, writers a write lock.
//! - Every mutation is **persisted before** the in-memory map changes; a
//!   crash between the two leaves the table authoritative and the map is
//!   reconstructed from it at boot.
//! - DDL ordering ("create table, then commit registry entry") is owned by
//!   the collection service; the registry itself is storage-agnostic.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use shared::errors::ApiResult;

use crate::domain::schema::Collection;
use crate::repository::RegistryRepository;

/// Process-wide registry singleton. Shared via `Arc`.
#[derive(Debug)]
pub struct SchemaRegistry {
    repo: RegistryRepository,
    map: RwLock<HashMap<String, Collection>>,
}

impl SchemaRegistry {
    pub fn new(repo: RegistryRepository) -> Self {
        Self {
            repo,
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Reconstructs the in-memory map from the backing table. Called once
    /// at boot, before the consistency check.
    pub async fn load(&self) -> ApiResult<()> {
        let collections = self.repo.load_all().await?;
        let mut map = self.map.write().await;
        map.clear();
        for collection in collections {
            map.insert(collection.name.clone(), collection);
        }
        info!(collections = map.len(), "Schema registry loaded");
        Ok(())
    }

    /// Returns a snapshot of a collection's definition.
    pub async fn get(&self, name: &str) -> Option<Collection> {
        self.map.read().await.get(name).cloned()
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.map.read().await.contains_key(name)
    }

    /// Creates or replaces a collection entry (persist, then memory).
    pub async fn set(&self, collection: Collection) -> ApiResult<()> {
        let mut map = self.map.write().await;
        self.repo.upsert(&collection).await?;
        map.insert(collection.name.clone(), collection);
        Ok(())
    }

    /// Removes a collection entry (persist, then memory).
    pub async fn remove(&self, name: &str) -> ApiResult<()> {
        let mut map = self.map.write().await;
        self.repo.delete(name).await?;
        map.remove(name);
        Ok(())
    }

    /// Registered collection names, sorted for stable output.
    pub async fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every registered collection, sorted by name.
    pub async fn list(&self) -> Vec<Collection> {
        let mut collections: Vec<Collection> = self.map.read().await.values().cloned().collect();
        collections.sort_by(|a, b| a.name.cmp(&b.name));
        collections
    }
}
