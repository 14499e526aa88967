//! Entity reflection traits and the class factory registry.
//!
//! This module provides the fundamental traits that all mapped entities must
//! implement: field access by document field name, and construction from a
//! decoded field map.
//!
//! # Implementing `Entity`
//!
//! Entities expose their fields under the names they carry in documents, so
//! the identifier field answers to `_id` regardless of what the struct field
//! is called. Construction goes through [`EntityType::from_fields`], a
//! builder-style constructor that receives every decoded field at once
//! rather than patching a blank instance field by field.
//!
//! # Example
//!
//! ```ignore
//! use docbind::entity::{Entity, EntityType};
//! use docbind::value::{FieldMap, Value};
//!
//! #[derive(Debug, Clone, PartialEq, Default)]
//! pub struct Note {
//!     pub id: Option<bson::oid::ObjectId>,
//!     pub body: String,
//! }
//!
//! impl Entity for Note {
//!     fn class_name(&self) -> &'static str { Self::CLASS }
//!     fn field_names(&self) -> &'static [&'static str] { &["_id", "body"] }
//!     // ... get/set match on the document field names ...
//! #   fn get(&self, _: &str) -> Option<Value> { None }
//! #   fn set(&mut self, _: &str, _: Value) -> bool { false }
//! #   fn clone_entity(&self) -> Box<dyn Entity> { Box::new(self.clone()) }
//! #   fn eq_entity(&self, other: &dyn Entity) -> bool {
//! #       other.downcast_ref::<Self>() == Some(self)
//! #   }
//! #   fn as_any(&self) -> &dyn std::any::Any { self }
//! #   fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
//! }
//! ```

use std::{any::Any, collections::HashMap, fmt::Debug};

use crate::{
    error::{BindError, BindResult},
    types::KEY_CLASS,
    value::{FieldMap, Value},
};

/// Object-safe reflection surface over a mapped entity.
///
/// The conversion engine reads and writes entity state exclusively through
/// this trait; it never sees concrete entity types. Field names are
/// *document* field names.
pub trait Entity: Any + Send + Sync + Debug {
    /// Returns the fully qualified class name written as the document's
    /// class discriminator.
    fn class_name(&self) -> &'static str;

    /// Returns the document field names this entity exposes, in declaration
    /// order. Written documents carry the fields in this order.
    fn field_names(&self) -> &'static [&'static str];

    /// Returns the current value of a field, or `None` when the entity has
    /// no such field.
    fn get(&self, field: &str) -> Option<Value>;

    /// Assigns a field. Returns `false` when the entity has no such field
    /// or the value shape does not fit.
    fn set(&mut self, field: &str, value: Value) -> bool;

    /// Clones the entity into a new boxed trait object.
    fn clone_entity(&self) -> Box<dyn Entity>;

    /// Deep equality against another entity, `false` across different
    /// concrete types.
    fn eq_entity(&self, other: &dyn Entity) -> bool;

    /// Returns the entity as a generic `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns the entity as a mutable generic `Any` for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Entity {
    /// Attempts to downcast a reference to a concrete entity type.
    pub fn downcast_ref<E: Entity>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Attempts to downcast a mutable reference to a concrete entity type.
    pub fn downcast_mut<E: Entity>(&mut self) -> Option<&mut E> {
        self.as_any_mut().downcast_mut::<E>()
    }
}

impl Clone for Box<dyn Entity> {
    fn clone(&self) -> Box<dyn Entity> {
        self.clone_entity()
    }
}

/// Static companion of [`Entity`]: the class constant and the constructor
/// used when a document of this class is materialized.
pub trait EntityType: Entity + Sized {
    /// The fully qualified class name, as written to and matched against
    /// the document class discriminator.
    const CLASS: &'static str;

    /// Builds an instance from a decoded field map.
    ///
    /// Every field the document carried (minus the class discriminator) is
    /// present in `fields`, already converted to entity-side values. Fields
    /// absent from the document are absent from the map.
    fn from_fields(fields: FieldMap) -> BindResult<Self>;
}

type EntityFactory = fn(FieldMap) -> BindResult<Box<dyn Entity>>;

/// Registry mapping class discriminator strings to entity factories.
///
/// Populated once during setup; the generic sub-document converter consults
/// it whenever a document names a class to materialize.
#[derive(Default)]
pub struct EntityRegistry {
    factories: HashMap<String, EntityFactory>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type under its class constant. Registration is
    /// idempotent by class name; the last registration wins.
    pub fn register<E: EntityType>(&mut self) {
        self.factories.insert(
            normalize_class(E::CLASS).to_string(),
            |fields| Ok(Box::new(E::from_fields(fields)?) as Box<dyn Entity>),
        );
    }

    /// Returns `true` when a factory is registered for the class.
    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(normalize_class(class))
    }

    /// Builds an entity of the named class from a decoded field map.
    ///
    /// # Errors
    ///
    /// Fails with [`BindError::ModelNotFound`] when no factory is
    /// registered for the class.
    pub fn instantiate(&self, class: &str, fields: FieldMap) -> BindResult<Box<dyn Entity>> {
        let factory = self
            .factories
            .get(normalize_class(class))
            .ok_or_else(|| {
                BindError::ModelNotFound(format!("no entity factory registered for \"{class}\""))
            })?;
        factory(fields)
    }
}

impl Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("classes", &self.factories.len())
            .finish()
    }
}

/// Strips leading namespace-separator noise from a class name, so lookups
/// tolerate `::Foo` spellings of `Foo`.
pub(crate) fn normalize_class(class: &str) -> &str {
    class.trim_start_matches(':')
}

/// Reflects an entity into its field list: the class discriminator first,
/// then every non-null field in declaration order.
///
/// Null-valued fields are skipped here, so written documents never carry
/// explicit null placeholders.
pub fn reflect(entity: &dyn Entity) -> Vec<(String, Value)> {
    let mut fields = Vec::with_capacity(entity.field_names().len() + 1);
    fields.push((
        KEY_CLASS.to_string(),
        Value::String(entity.class_name().to_string()),
    ));

    for name in entity.field_names() {
        match entity.get(name) {
            None | Some(Value::Null) => {}
            Some(value) => fields.push(((*name).to_string(), value)),
        }
    }

    fields
}
