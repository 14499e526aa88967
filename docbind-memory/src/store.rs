//! In-memory storage implementation.
//!
//! This module provides a simple backend that keeps raw documents in nested
//! HashMaps behind a read-write lock. It implements the full
//! [`StoreBackend`] contract, including identifier generation on insert.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use bson::{Bson, Document, oid::ObjectId};

use docbind_core::{
    backend::StoreBackend,
    error::{BindError, BindResult},
    types::KEY_ID,
};

type CollectionMap = HashMap<String, Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// `MemoryBackend` is cloneable and uses an `Arc`-wrapped internal map, so
/// clones share the same underlying data. Lookups never scan; documents
/// are indexed by their identifier's canonical key.
///
/// Intended for development and testing; nothing is persisted.
///
/// # Example
///
/// ```ignore
/// use docbind_memory::MemoryBackend;
/// use docbind_core::backend::StoreBackend;
/// use bson::doc;
///
/// let backend = MemoryBackend::new();
/// let stored = backend.insert("users", doc! { "name": "Alice" })?;
/// assert!(stored.get("_id").is_some());
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryBackend {
    store: Arc<RwLock<StoreMap>>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing a `MemoryBackend`.
    pub fn builder() -> MemoryBackendBuilder {
        MemoryBackendBuilder::default()
    }

    /// Lists the names of all collections currently holding documents.
    pub fn collection_names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Returns the number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.read().get(collection).map_or(0, CollectionMap::len)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreMap> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreMap> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Canonical map key for a document identifier.
fn id_key(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        other => format!("{other:?}"),
    }
}

/// Returns the document's identifier, assigning a fresh one when absent.
fn ensure_id(document: &mut Document) -> Bson {
    match document.get(KEY_ID) {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            document.insert(KEY_ID, id.clone());
            id
        }
    }
}

impl StoreBackend for MemoryBackend {
    fn insert(&self, collection: &str, mut document: Document) -> BindResult<Document> {
        let mut store = self.write();
        let collection_map = store.entry(collection.to_string()).or_default();

        let key = id_key(&ensure_id(&mut document));
        if collection_map.contains_key(&key) {
            return Err(BindError::Storage(format!(
                "document {key} already exists in collection {collection}"
            )));
        }

        collection_map.insert(key, document.clone());
        Ok(document)
    }

    fn save(&self, collection: &str, mut document: Document) -> BindResult<Document> {
        let mut store = self.write();
        let collection_map = store.entry(collection.to_string()).or_default();

        let key = id_key(&ensure_id(&mut document));
        collection_map.insert(key, document.clone());
        Ok(document)
    }

    fn find_by_id(&self, collection: &str, id: &Bson) -> BindResult<Option<Document>> {
        Ok(self
            .read()
            .get(collection)
            .and_then(|collection_map| collection_map.get(&id_key(id)))
            .cloned())
    }

    fn remove_by_id(&self, collection: &str, id: &Bson) -> BindResult<bool> {
        let mut store = self.write();
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(false);
        };

        Ok(collection_map.remove(&id_key(id)).is_some())
    }
}

/// Builder for [`MemoryBackend`] instances.
///
/// Currently carries no options; it exists so backends share a uniform
/// construction surface.
#[derive(Default)]
pub struct MemoryBackendBuilder;

impl MemoryBackendBuilder {
    /// Builds and returns a new [`MemoryBackend`].
    pub fn build(self) -> MemoryBackend {
        MemoryBackend::new()
    }
}
