//! Models: per-class field schemas and their registry.
//!
//! A [`Model`] describes how one entity class maps onto documents: which
//! fields it has, what kind each field is, and (optionally) which storage
//! collection holds it. Models are built once during setup, registered in a
//! [`ModelRegistry`], and read-only afterwards.
//!
//! Field kinds form a closed vocabulary ([`FieldKind`]); array fields reuse
//! it one level deep through [`ElementKind`], which deliberately has no
//! array variant, so arrays of arrays are not modeled.

use std::{collections::HashMap, sync::Arc};

use crate::{
    entity::{Entity, normalize_class},
    error::{BindError, BindResult},
    types::{KEY_ID, tags},
};

/// Scalar tags a [`FieldKind::Scalar`] descriptor may cite.
const VALUE_TAGS: [&str; 5] = [
    tags::BOOLEAN,
    tags::INTEGER,
    tags::DECIMAL,
    tags::STRING,
    tags::DATE,
];

/// The kind of value an array field's elements hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// Elements converted through the scalar registry under the given tag.
    Scalar(String),
    /// Elements holding document identifiers.
    Id,
    /// Elements that are embedded entities, written with a discriminator.
    EmbeddedDocument,
    /// Elements referencing other stored entities by token.
    Reference,
}

/// The semantic kind of one entity field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Converted through the scalar registry under the given tag.
    Scalar(String),
    /// The entity's identifier field.
    Id,
    /// An ordered (or keyed) collection of elements of one kind.
    Array(ElementKind),
    /// An embedded entity, written inline with a class discriminator.
    EmbeddedDocument,
    /// A pointer to another stored entity, written as a reference token.
    Reference,
}

/// Immutable description of one entity field: its document name and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
}

impl FieldDescriptor {
    /// Describes a scalar field.
    ///
    /// # Errors
    ///
    /// Fails with [`BindError::UnknownType`] when `tag` is not a value
    /// scalar tag (`boolean`, `integer`, `decimal`, `string`, `date`).
    pub fn scalar(name: impl Into<String>, tag: impl Into<String>) -> BindResult<Self> {
        let tag = tag.into();
        assert_value_tag(&tag)?;
        Ok(Self { name: name.into(), kind: FieldKind::Scalar(tag) })
    }

    /// Describes the identifier field, always named `_id`.
    pub fn id() -> Self {
        Self { name: KEY_ID.to_string(), kind: FieldKind::Id }
    }

    /// Describes an array field with elements of the given kind.
    ///
    /// # Errors
    ///
    /// Fails with [`BindError::UnknownType`] when the element kind cites an
    /// unsupported scalar tag.
    pub fn array_of(name: impl Into<String>, element: ElementKind) -> BindResult<Self> {
        if let ElementKind::Scalar(tag) = &element {
            assert_value_tag(tag)?;
        }
        Ok(Self { name: name.into(), kind: FieldKind::Array(element) })
    }

    /// Describes an embedded-document field.
    pub fn document(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: FieldKind::EmbeddedDocument }
    }

    /// Describes a reference field.
    pub fn reference(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: FieldKind::Reference }
    }

    /// The document field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field's kind.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }
}

fn assert_value_tag(tag: &str) -> BindResult<()> {
    if VALUE_TAGS.contains(&tag) {
        Ok(())
    } else {
        Err(BindError::UnknownType(tag.to_string()))
    }
}

/// Field schema and storage binding for one entity class.
#[derive(Debug, Clone)]
pub struct Model {
    class: String,
    collection: Option<String>,
    fields: HashMap<String, FieldDescriptor>,
}

impl Model {
    /// Creates a model for an embeddable entity class (no collection
    /// binding). Field names are unique; a later descriptor with the same
    /// name replaces an earlier one.
    pub fn new(class: impl Into<String>, fields: impl IntoIterator<Item = FieldDescriptor>) -> Self {
        let mut model = Self {
            class: normalize_class(&class.into()).to_string(),
            collection: None,
            fields: HashMap::new(),
        };
        for field in fields {
            model.add_field(field);
        }
        model
    }

    /// Binds this model to a storage collection, making its class a
    /// top-level stored entity.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Registers one more field descriptor; intended for setup time only.
    pub fn add_field(&mut self, field: FieldDescriptor) {
        self.fields.insert(field.name().to_string(), field);
    }

    /// The entity class name this model describes.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The bound storage collection, or `None` for embeddable-only models.
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Returns `true` when the model describes a field with this name.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Returns the descriptor for a field name.
    ///
    /// # Errors
    ///
    /// Fails with [`BindError::ModelNotFound`] when the model has no such
    /// field.
    pub fn field(&self, name: &str) -> BindResult<&FieldDescriptor> {
        self.fields.get(name).ok_or_else(|| {
            BindError::ModelNotFound(format!(
                "no field \"{name}\" in model for \"{}\"",
                self.class
            ))
        })
    }

    /// Iterates over all field descriptors, in no particular order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }
}

/// Registry of models, indexed by class name and by collection name.
///
/// Populated during setup; lookups afterwards are read-only. At most one
/// model per class name and one per non-null collection name; later
/// registrations win.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<Model>>,
    collections: HashMap<String, Arc<Model>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model, replacing any previous model for the same class
    /// and deriving the collection index entry when the model is bound.
    pub fn register(&mut self, model: Model) {
        let model = Arc::new(model);

        if let Some(previous) = self.models.insert(model.class().to_string(), model.clone()) {
            // Drop the stale collection index entry of the replaced model.
            if let Some(collection) = previous.collection() {
                if self
                    .collections
                    .get(collection)
                    .is_some_and(|m| Arc::ptr_eq(m, &previous))
                {
                    self.collections.remove(collection);
                }
            }
        }

        if let Some(collection) = model.collection() {
            self.collections.insert(collection.to_string(), model);
        }
    }

    /// Looks a model up by class name, tolerating leading namespace
    /// separator noise.
    ///
    /// # Errors
    ///
    /// Fails with [`BindError::ModelNotFound`] for unregistered classes.
    pub fn by_class(&self, class: &str) -> BindResult<Arc<Model>> {
        self.models
            .get(normalize_class(class))
            .cloned()
            .ok_or_else(|| BindError::ModelNotFound(format!("model for \"{class}\" not found")))
    }

    /// Looks a model up from an entity instance's runtime class.
    pub fn by_instance(&self, entity: &dyn Entity) -> BindResult<Arc<Model>> {
        self.by_class(entity.class_name())
    }

    /// Looks a model up by its bound collection name.
    ///
    /// # Errors
    ///
    /// Fails with [`BindError::ModelNotFound`] when no model declares the
    /// collection.
    pub fn by_collection(&self, collection: &str) -> BindResult<Arc<Model>> {
        self.collections.get(collection).cloned().ok_or_else(|| {
            BindError::ModelNotFound(format!("model with collection \"{collection}\" not found"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> Model {
        Model::new(
            "fixtures.Article",
            [
                FieldDescriptor::id(),
                FieldDescriptor::scalar("title", tags::STRING).unwrap(),
                FieldDescriptor::array_of("tags", ElementKind::Scalar(tags::STRING.to_string()))
                    .unwrap(),
            ],
        )
        .with_collection("articles")
    }

    #[test]
    fn scalar_descriptor_rejects_unsupported_tags() {
        let err = FieldDescriptor::scalar("broken", "reference").unwrap_err();
        assert_eq!(err, BindError::UnknownType("reference".to_string()));

        let err =
            FieldDescriptor::array_of("broken", ElementKind::Scalar("array".to_string()))
                .unwrap_err();
        assert_eq!(err, BindError::UnknownType("array".to_string()));
    }

    #[test]
    fn field_names_are_unique_last_wins() {
        let mut model = Model::new("fixtures.Article", []);
        model.add_field(FieldDescriptor::scalar("title", tags::STRING).unwrap());
        model.add_field(FieldDescriptor::scalar("title", tags::INTEGER).unwrap());

        assert_eq!(
            model.field("title").unwrap().kind(),
            &FieldKind::Scalar(tags::INTEGER.to_string())
        );
    }

    #[test]
    fn lookup_by_class_normalizes_namespace_noise() {
        let mut registry = ModelRegistry::new();
        registry.register(sample_model());

        assert!(registry.by_class("fixtures.Article").is_ok());
        assert!(registry.by_class("::fixtures.Article").is_ok());
    }

    #[test]
    fn lookup_by_collection_follows_binding() {
        let mut registry = ModelRegistry::new();
        registry.register(sample_model());

        let model = registry.by_collection("articles").unwrap();
        assert_eq!(model.class(), "fixtures.Article");

        let err = registry.by_collection("missing").unwrap_err();
        assert!(matches!(err, BindError::ModelNotFound(_)));
    }

    #[test]
    fn reregistration_replaces_class_and_collection_indices() {
        let mut registry = ModelRegistry::new();
        registry.register(sample_model());
        registry.register(
            Model::new("fixtures.Article", [FieldDescriptor::id()]).with_collection("posts"),
        );

        assert!(registry.by_collection("articles").is_err());
        assert!(registry.by_collection("posts").is_ok());
    }

    #[test]
    fn unknown_class_reports_model_not_found() {
        let registry = ModelRegistry::new();
        let err = registry.by_class("fixtures.Missing").unwrap_err();
        assert!(matches!(err, BindError::ModelNotFound(_)));
    }
}
