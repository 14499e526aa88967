//! Entity-level collection access.
//!
//! [`Connection`] ties a converter to a backend; [`Collection`] decorates
//! one named backend collection so callers work with entities instead of
//! raw documents. Every operation converts on the way in and out, and a
//! successful insert or save writes the generated identifier back onto the
//! entity.

use std::sync::Arc;

use bson::Bson;
use log::debug;

use crate::{
    backend::StoreBackend,
    converter::DocumentConverter,
    entity::Entity,
    error::{BindError, BindResult},
    types::KEY_ID,
    value::Value,
};

/// A connection between the conversion engine and a storage backend.
///
/// Constructing one connects the converter's reference resolver, so
/// references decoded afterwards can be resolved.
#[derive(Debug, Clone)]
pub struct Connection {
    backend: Arc<dyn StoreBackend>,
    converter: DocumentConverter,
}

impl Connection {
    /// Creates a connection and links the converter to the backend.
    pub fn new(backend: Arc<dyn StoreBackend>, converter: DocumentConverter) -> Self {
        converter.connect(backend.clone());
        Self { backend, converter }
    }

    /// Returns an entity-level view of one collection.
    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            name: name.to_string(),
            backend: self.backend.clone(),
            converter: self.converter.clone(),
        }
    }

    /// The converter this connection operates with.
    pub fn converter(&self) -> &DocumentConverter {
        &self.converter
    }
}

/// A named collection that stores and loads entities.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    backend: Arc<dyn StoreBackend>,
    converter: DocumentConverter,
}

impl Collection {
    /// The collection's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts an entity. On success the stored identifier is assigned
    /// back to the entity's `_id` field.
    ///
    /// # Errors
    ///
    /// Fails with [`BindError::InvalidEntity`] when the entity's model is
    /// bound to a different collection; conversion and storage errors
    /// propagate unchanged.
    pub fn insert(&self, entity: &mut dyn Entity) -> BindResult<()> {
        self.put(entity, false)
    }

    /// Inserts or replaces an entity (upsert), assigning the stored
    /// identifier back on success.
    pub fn save(&self, entity: &mut dyn Entity) -> BindResult<()> {
        self.put(entity, true)
    }

    fn put(&self, entity: &mut dyn Entity, upsert: bool) -> BindResult<()> {
        let model = self.converter.models().by_instance(entity)?;
        if model.collection() != Some(self.name.as_str()) {
            return Err(BindError::InvalidEntity(format!(
                "entity of \"{}\" can not be saved in \"{}\"",
                model.class(),
                self.name
            )));
        }

        let raw = self.converter.entity_to_document(entity)?;
        let stored = if upsert {
            self.backend.save(&self.name, raw)?
        } else {
            self.backend.insert(&self.name, raw)?
        };

        if let Some(id) = stored.get(KEY_ID) {
            if !entity.set(KEY_ID, Value::from_bson(id, None)) {
                debug!(
                    "entity \"{}\" did not accept the stored identifier",
                    entity.class_name()
                );
            }
        }

        Ok(())
    }

    /// Loads the entity with the given identifier, or [`Value::Null`] when
    /// no such document exists.
    pub fn find_by_id(&self, id: &Bson) -> BindResult<Value> {
        match self.backend.find_by_id(&self.name, id)? {
            None => Ok(Value::Null),
            Some(document) => self.converter.to_entity(document),
        }
    }

    /// Removes the document with the given identifier. Returns `true` when
    /// one was removed.
    pub fn remove_by_id(&self, id: &Bson) -> BindResult<bool> {
        self.backend.remove_by_id(&self.name, id)
    }
}
