//! The document converter.
//!
//! This is the orchestrating core of the crate: it walks an entity graph
//! and its registered models to produce a raw BSON document, and walks a
//! raw document back into a (lazily materialized) entity. Field kinds drive
//! the recursion: scalars dispatch into the type registry, arrays convert
//! per element, embedded documents recurse into the converter, and
//! references go through the resolver.
//!
//! The converter holds no mutable state between calls; every conversion is
//! independent and reentrant.
//!
//! # Example
//!
//! ```ignore
//! use docbind::prelude::*;
//!
//! let mut models = ModelRegistry::new();
//! models.register(
//!     Model::new("app.User", [
//!         FieldDescriptor::id(),
//!         FieldDescriptor::scalar("name", tags::STRING)?,
//!     ])
//!     .with_collection("users"),
//! );
//!
//! let mut entities = EntityRegistry::new();
//! entities.register::<User>();
//!
//! let converter = DocumentConverter::builder(models, entities).build();
//! let raw = converter.entity_to_document(&user)?;
//! ```

use std::sync::{Arc, Weak};

use bson::{Bson, Document};
use chrono::FixedOffset;
use log::debug;

use crate::{
    backend::StoreBackend,
    entity::{Entity, EntityRegistry, reflect},
    error::{BindError, BindResult},
    model::{ElementKind, FieldDescriptor, FieldKind, Model, ModelRegistry},
    proxy::Proxy,
    reference::ReferenceResolver,
    types::{KEY_CLASS, TypeRegistry, tags},
    value::{Elements, FieldMap, Value},
};

/// Converts entity graphs to raw documents and back.
///
/// Cheap to clone; clones share the same registries and resolver.
#[derive(Debug, Clone)]
pub struct DocumentConverter {
    state: Arc<ConverterState>,
}

/// Builder for [`DocumentConverter`].
pub struct DocumentConverterBuilder {
    models: ModelRegistry,
    entities: EntityRegistry,
    graceful: bool,
    tz: Option<FixedOffset>,
}

impl DocumentConverterBuilder {
    /// Enables or disables the graceful fallback for documents without a
    /// class discriminator. Enabled by default; when disabled, such
    /// documents fail with
    /// [`BindError::IncompleteDocument`].
    pub fn graceful(mut self, graceful: bool) -> Self {
        self.graceful = graceful;
        self
    }

    /// Normalizes decoded dates to the given offset. Dates written to
    /// storage are unaffected.
    pub fn timezone(mut self, tz: FixedOffset) -> Self {
        self.tz = Some(tz);
        self
    }

    /// Builds the converter.
    pub fn build(self) -> DocumentConverter {
        let models = Arc::new(self.models);
        let entities = Arc::new(self.entities);
        let graceful = self.graceful;
        let tz = self.tz;

        let state = Arc::new_cyclic(|me: &Weak<ConverterState>| ConverterState {
            types: TypeRegistry::standard(entities.clone(), tz),
            resolver: ReferenceResolver::new(models.clone(), me.clone()),
            me: me.clone(),
            models,
            entities,
            graceful,
            tz,
        });

        DocumentConverter { state }
    }
}

impl DocumentConverter {
    /// Starts building a converter over the given registries.
    pub fn builder(models: ModelRegistry, entities: EntityRegistry) -> DocumentConverterBuilder {
        DocumentConverterBuilder {
            models,
            entities,
            graceful: true,
            tz: None,
        }
    }

    /// Builds a converter with default options (graceful mode on, no
    /// timezone normalization).
    pub fn new(models: ModelRegistry, entities: EntityRegistry) -> Self {
        Self::builder(models, entities).build()
    }

    /// Converts an entity value into its raw document representation.
    ///
    /// The value must be an entity or a proxy over one; proxies are
    /// materialized first. Null-valued fields never appear in the result.
    ///
    /// # Errors
    ///
    /// Fails with [`BindError::InvalidEntity`] when the value is not an
    /// entity; model, type and reference errors propagate unchanged.
    pub fn to_document(&self, value: &Value) -> BindResult<Document> {
        self.state.to_document(value)
    }

    /// Converts an entity instance into its raw document representation.
    pub fn entity_to_document(&self, entity: &dyn Entity) -> BindResult<Document> {
        self.state.entity_to_document(entity)
    }

    /// Converts a raw document into an entity value.
    ///
    /// Documents carrying a class discriminator decode into a lazy proxy;
    /// the per-field conversion work runs on first access. Documents
    /// without one decode into an untyped map when graceful mode is on and
    /// fail with [`BindError::IncompleteDocument`] otherwise.
    pub fn to_entity(&self, document: Document) -> BindResult<Value> {
        self.state.to_entity(document)
    }

    /// Connects the reference resolver to a backend; required before any
    /// reference can be resolved.
    pub fn connect(&self, backend: Arc<dyn StoreBackend>) {
        self.state.resolver.connect(backend);
    }

    /// The reference resolver this converter dispatches reference fields to.
    pub fn resolver(&self) -> &ReferenceResolver {
        &self.state.resolver
    }

    /// The registered models.
    pub fn models(&self) -> &ModelRegistry {
        &self.state.models
    }

    /// The scalar type registry.
    pub fn types(&self) -> &TypeRegistry {
        &self.state.types
    }
}

pub(crate) struct ConverterState {
    types: TypeRegistry,
    entities: Arc<EntityRegistry>,
    models: Arc<ModelRegistry>,
    resolver: ReferenceResolver,
    me: Weak<ConverterState>,
    graceful: bool,
    tz: Option<FixedOffset>,
}

impl ConverterState {
    pub(crate) fn to_document(&self, value: &Value) -> BindResult<Document> {
        match value {
            Value::Proxy(proxy) => {
                let inner = proxy.value()?;
                self.to_document(&inner)
            }
            Value::Entity(entity) => self.entity_to_document(entity.as_ref()),
            other => Err(BindError::InvalidEntity(format!(
                "expected an entity, got a value of kind \"{}\"",
                other.kind()
            ))),
        }
    }

    pub(crate) fn entity_to_document(&self, entity: &dyn Entity) -> BindResult<Document> {
        let model = self.models.by_instance(entity)?;
        let mut result = Document::new();

        for (name, value) in reflect(entity) {
            let converted = if name != KEY_CLASS && model.has_field(&name) {
                self.field_to_storage(value, model.field(&name)?)?
            } else {
                value.to_bson()?
            };

            // Storage documents never carry explicit null placeholders.
            if !matches!(converted, Bson::Null) {
                result.insert(name, converted);
            }
        }

        Ok(result)
    }

    fn field_to_storage(&self, value: Value, field: &FieldDescriptor) -> BindResult<Bson> {
        match field.kind() {
            FieldKind::Array(element) => self.array_to_storage(value, element),
            FieldKind::EmbeddedDocument => match value {
                Value::Null => Ok(Bson::Null),
                other => Ok(Bson::Document(self.to_document(&other)?)),
            },
            FieldKind::Reference => self.resolver.store(&value),
            FieldKind::Scalar(tag) => self.types.to_storage(value, tag),
            FieldKind::Id => self.types.to_storage(value, tags::ID),
        }
    }

    fn array_to_storage(&self, value: Value, element: &ElementKind) -> BindResult<Bson> {
        match value.materialized()?.into_elements() {
            Elements::Seq(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.element_to_storage(item, element)?);
                }
                Ok(Bson::Array(out))
            }
            Elements::Keyed(map) => {
                let mut out = Document::new();
                for (key, item) in map {
                    out.insert(key, self.element_to_storage(item, element)?);
                }
                Ok(Bson::Document(out))
            }
        }
    }

    fn element_to_storage(&self, value: Value, element: &ElementKind) -> BindResult<Bson> {
        match element {
            ElementKind::EmbeddedDocument => match value {
                Value::Null => Ok(Bson::Null),
                other => Ok(Bson::Document(self.to_document(&other)?)),
            },
            ElementKind::Reference => self.resolver.store(&value),
            ElementKind::Scalar(tag) => self.types.to_storage(value, tag),
            ElementKind::Id => self.types.to_storage(value, tags::ID),
        }
    }

    pub(crate) fn to_entity(&self, document: Document) -> BindResult<Value> {
        self.decode(document, true)
    }

    /// Decodes a raw document. With `defer`, the per-field conversion and
    /// instance construction are postponed behind a proxy; nested documents
    /// are always materialized eagerly once the work actually runs.
    fn decode(&self, document: Document, defer: bool) -> BindResult<Value> {
        let class = match document.get(KEY_CLASS) {
            Some(Bson::String(class)) => class.clone(),
            Some(other) => {
                return Err(BindError::IncompleteDocument(format!(
                    "class discriminator is not a string: {other:?}"
                )));
            }
            None => {
                if self.graceful {
                    debug!("document without class discriminator, decoding untyped");
                    return Ok(Value::from_bson(&Bson::Document(document), self.tz));
                }
                return Err(BindError::IncompleteDocument(
                    "document has no class discriminator".to_string(),
                ));
            }
        };

        // Unknown classes fail before any proxy is handed out.
        let model = self.models.by_class(&class)?;

        if !defer {
            return self.materialize(document, &model);
        }

        let me = self.me.clone();
        Ok(Value::Proxy(Proxy::new(class, move || {
            let state = me.upgrade().ok_or_else(|| {
                BindError::InvalidReference("converter released before materialization".to_string())
            })?;
            state.materialize(document, &model)
        })))
    }

    fn materialize(&self, document: Document, model: &Model) -> BindResult<Value> {
        let mut fields = FieldMap::with_capacity(document.len());

        for (name, raw) in document {
            if name == KEY_CLASS {
                continue;
            }
            let value = if model.has_field(&name) {
                self.field_to_entity(raw, model.field(&name)?)?
            } else {
                Value::from_bson(&raw, self.tz)
            };
            fields.insert(name, value);
        }

        let entity = self.entities.instantiate(model.class(), fields)?;
        Ok(Value::Entity(entity))
    }

    fn field_to_entity(&self, raw: Bson, field: &FieldDescriptor) -> BindResult<Value> {
        match field.kind() {
            FieldKind::Array(element) => self.array_to_entity(raw, element),
            FieldKind::EmbeddedDocument => self.embedded_to_entity(raw, field.name()),
            FieldKind::Reference => self.resolver.resolve(&raw),
            FieldKind::Scalar(tag) => self.types.to_entity(raw, tag),
            FieldKind::Id => self.types.to_entity(raw, tags::ID),
        }
    }

    fn embedded_to_entity(&self, raw: Bson, field: &str) -> BindResult<Value> {
        match raw {
            Bson::Null => Ok(Value::Null),
            Bson::Document(doc) => self.decode(doc, false),
            other => Err(BindError::IncompleteDocument(format!(
                "embedded document field \"{field}\" holds {other:?}"
            ))),
        }
    }

    fn array_to_entity(&self, raw: Bson, element: &ElementKind) -> BindResult<Value> {
        match raw {
            Bson::Null => Ok(Value::Array(Vec::new())),
            Bson::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.element_to_entity(item, element)?);
                }
                Ok(Value::Array(out))
            }
            Bson::Document(doc) => {
                let mut out = FieldMap::with_capacity(doc.len());
                for (key, item) in doc {
                    out.insert(key, self.element_to_entity(item, element)?);
                }
                Ok(Value::Map(out))
            }
            scalar => Ok(Value::Array(vec![self.element_to_entity(scalar, element)?])),
        }
    }

    fn element_to_entity(&self, raw: Bson, element: &ElementKind) -> BindResult<Value> {
        match element {
            ElementKind::EmbeddedDocument => self.embedded_to_entity(raw, "element"),
            ElementKind::Reference => self.resolver.resolve(&raw),
            ElementKind::Scalar(tag) => self.types.to_entity(raw, tag),
            ElementKind::Id => self.types.to_entity(raw, tags::ID),
        }
    }
}

impl std::fmt::Debug for ConverterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterState")
            .field("graceful", &self.graceful)
            .field("tz", &self.tz)
            .finish()
    }
}
