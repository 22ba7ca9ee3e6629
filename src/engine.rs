use crate::collection::Collection;
use crate::errors::DbError;
use crate::types::CollectionName;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Process-wide registry of collections, shared by every handler through
/// one `Arc`. All consistency guarantees beyond the per-collection lock come
/// from idempotent full-recompute writes, not client-side locking.
#[derive(Default)]
pub struct Engine {
    collections: RwLock<HashMap<CollectionName, Arc<Collection>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("collections", &self.list_collection_names())
            .finish()
    }
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collection if missing and returns a handle to it.
    pub fn create_collection(&self, name: impl Into<String>) -> Arc<Collection> {
        let name = name.into();
        let mut cols = self.collections.write();
        cols.entry(name.clone())
            .or_insert_with(|| Arc::new(Collection::new(name)))
            .clone()
    }

    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// # Errors
    /// Returns `NoSuchCollection` when `name` is unknown.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>, DbError> {
        self.get_collection(name).ok_or_else(|| DbError::NoSuchCollection(name.to_string()))
    }

    pub fn delete_collection(&self, name: &str) -> bool {
        self.collections.write().remove(name).is_some()
    }

    #[must_use]
    pub fn list_collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}
