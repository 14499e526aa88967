//! An object-document mapping core that converts between typed Rust
//! entities and the BSON documents a document store speaks natively.
//!
//! This crate is the heart of the docbind project and provides:
//!
//! - **Entity reflection** ([`entity`]) - Traits for exposing and building
//!   entity fields by document field name, plus the class factory registry
//! - **Dynamic values** ([`value`]) - The entity-side value vocabulary and
//!   structural BSON conversions
//! - **Scalar types** ([`types`]) - The tag-dispatched registry of primitive
//!   converters
//! - **Models** ([`model`]) - Per-class field schemas and their registry
//! - **Lazy proxies** ([`proxy`]) - Deferred materialization of decoded and
//!   referenced entities
//! - **References** ([`reference`]) - `{$ref, $id}` tokens and lazy
//!   cross-collection resolution
//! - **The converter** ([`converter`]) - The recursive marshal/unmarshal
//!   pipeline tying it all together
//! - **Backend seam** ([`backend`]) - The thin trait raw document storage
//!   hides behind
//! - **Collections** ([`collection`]) - Entity-level access to one stored
//!   collection
//! - **Error handling** ([`error`]) - The error and result types
//!
//! # Example
//!
//! ```ignore
//! use docbind_core::{
//!     converter::DocumentConverter,
//!     entity::EntityRegistry,
//!     model::{FieldDescriptor, Model, ModelRegistry},
//!     types::tags,
//! };
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
//! let converter = DocumentConverter::new(models, entities);
//! let raw = converter.entity_to_document(&user)?;
//! ```
//!
//! Most users should depend on the `docbind` facade crate, which re-exports
//! everything here alongside the bundled backends.

#[allow(unused_extern_crates)]
extern crate self as docbind_core;

pub mod backend;
pub mod collection;
pub mod converter;
pub mod entity;
pub mod error;
pub mod model;
pub mod proxy;
pub mod reference;
pub mod types;
pub mod value;
