//! Cross-collection reference resolution.
//!
//! A reference field never inlines the target entity's data. On write it
//! collapses into a two-key token naming the target collection and the
//! target identifier; on read it becomes a lazy proxy that loads the target
//! through the connected backend on first access.
//!
//! Hop-by-hop laziness is what lets circular graphs round-trip: the second
//! traversal of an already-seen entity is satisfied by an unresolved proxy
//! instead of another recursive conversion.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use bson::Bson;
use log::{debug, trace};

use crate::{
    backend::StoreBackend,
    converter::ConverterState,
    entity::Entity,
    error::{BindError, BindResult},
    model::ModelRegistry,
    proxy::Proxy,
    types::KEY_ID,
    value::Value,
};

/// Reference token key naming the target collection.
pub const REF_COLLECTION: &str = "$ref";
/// Reference token key carrying the target identifier.
pub const REF_ID: &str = "$id";

/// Converts entities to reference tokens and tokens back to lazy entities.
///
/// Storing references needs nothing but the model registry; resolving them
/// additionally needs a live backend, late-bound through [`connect`].
///
/// [`connect`]: ReferenceResolver::connect
pub struct ReferenceResolver {
    models: Arc<ModelRegistry>,
    backend: RwLock<Option<Arc<dyn StoreBackend>>>,
    converter: Weak<ConverterState>,
}

impl ReferenceResolver {
    pub(crate) fn new(models: Arc<ModelRegistry>, converter: Weak<ConverterState>) -> Self {
        Self {
            models,
            backend: RwLock::new(None),
            converter,
        }
    }

    /// Late-binds the backend used to load referenced documents. Must be
    /// called before any [`resolve`](ReferenceResolver::resolve); storing
    /// references never requires it.
    pub fn connect(&self, backend: Arc<dyn StoreBackend>) {
        *self
            .backend
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(backend);
    }

    /// Returns `true` once a backend has been connected.
    pub fn is_connected(&self) -> bool {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Converts an entity value into its durable reference token.
    ///
    /// Null yields null; proxies are materialized first. The token carries
    /// the collection the entity's model is bound to and the entity's
    /// identifier, read through direct field access.
    ///
    /// # Errors
    ///
    /// Fails with [`BindError::InvalidEntity`] when the value is not an
    /// entity, when the entity has no identifier field or an empty
    /// identifier, or when its model is not bound to a collection.
    pub fn store(&self, value: &Value) -> BindResult<Bson> {
        match value {
            Value::Null => Ok(Bson::Null),
            Value::Proxy(proxy) => {
                let inner = proxy.value()?;
                self.store(&inner)
            }
            Value::Entity(entity) => self.from_entity(entity.as_ref()),
            other => Err(BindError::InvalidEntity(format!(
                "cannot reference a value of kind \"{}\"",
                other.kind()
            ))),
        }
    }

    fn from_entity(&self, entity: &dyn Entity) -> BindResult<Bson> {
        if !entity.field_names().contains(&KEY_ID) {
            return Err(BindError::InvalidEntity(format!(
                "entity \"{}\" does not have an \"{KEY_ID}\" field",
                entity.class_name()
            )));
        }

        let id = match entity.get(KEY_ID) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(id) => Some(id),
        }
        .ok_or_else(|| BindError::InvalidEntity("entity identifier is empty".to_string()))?;

        let model = self.models.by_instance(entity)?;
        let collection = model.collection().ok_or_else(|| {
            BindError::InvalidEntity(format!(
                "model for \"{}\" is not bound to a collection",
                model.class()
            ))
        })?;

        trace!("storing reference to {collection}");

        let mut token = bson::Document::new();
        token.insert(REF_COLLECTION, collection);
        token.insert(REF_ID, id.to_bson()?);
        Ok(Bson::Document(token))
    }

    /// Reconstructs a lazily loaded entity from a reference token.
    ///
    /// Null yields null. Otherwise the result is a proxy whose first access
    /// fetches the referenced document by identifier and materializes it
    /// (or resolves to null when the document is gone).
    ///
    /// # Errors
    ///
    /// Fails with [`BindError::InvalidReference`] when the token lacks
    /// either key or when no backend has been connected.
    pub fn resolve(&self, token: &Bson) -> BindResult<Value> {
        if matches!(token, Bson::Null) {
            return Ok(Value::Null);
        }

        let document = token.as_document().ok_or_else(|| {
            BindError::InvalidReference("reference token is not a document".to_string())
        })?;
        let collection = match document.get(REF_COLLECTION) {
            Some(Bson::String(name)) => name.clone(),
            _ => {
                return Err(BindError::InvalidReference(format!(
                    "reference token lacks \"{REF_COLLECTION}\""
                )));
            }
        };
        let id = document.get(REF_ID).cloned().ok_or_else(|| {
            BindError::InvalidReference(format!("reference token lacks \"{REF_ID}\""))
        })?;

        let backend = self
            .backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                BindError::InvalidReference("unable to resolve reference, not connected".to_string())
            })?;

        let class = self.models.by_collection(&collection)?.class().to_string();
        let converter = self.converter.clone();

        debug!("deferring reference to {collection} as {class}");

        Ok(Value::Proxy(Proxy::new(class, move || {
            let converter = converter.upgrade().ok_or_else(|| {
                BindError::InvalidReference("converter released before resolution".to_string())
            })?;
            match backend.find_by_id(&collection, &id)? {
                None => Ok(Value::Null),
                Some(document) => converter.to_entity(document)?.materialized(),
            }
        })))
    }
}

impl std::fmt::Debug for ReferenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResolver")
            .field("connected", &self.is_connected())
            .finish()
    }
}
