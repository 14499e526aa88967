//! Main docbind crate: object-document mapping for BSON document stores.
//!
//! This crate is the primary entry point for users of the docbind
//! framework. It re-exports the conversion engine from `docbind-core` and
//! provides convenient access to the bundled storage backends.
//!
//! # Features
//!
//! - **Schema-driven conversion** - Models describe each entity class's
//!   fields; the converter walks them recursively in both directions
//! - **Polymorphic documents** - Written documents carry a class
//!   discriminator, so heterogeneous collections decode to their concrete
//!   types
//! - **Lazy references** - Cross-collection references persist as small
//!   `{$ref, $id}` tokens and load on first access, so circular graphs
//!   round-trip
//! - **Graceful decoding** - Documents without a discriminator can decode
//!   into untyped structures instead of failing
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind::prelude::*;
//! use docbind::memory::MemoryBackend;
//! use std::sync::Arc;
//!
//! // Describe the entity class.
//! let mut models = ModelRegistry::new();
//! models.register(
//!     Model::new("app.User", [
//!         FieldDescriptor::id(),
//!         FieldDescriptor::scalar("name", tags::STRING)?,
//!         FieldDescriptor::scalar("joined", tags::DATE)?,
//!     ])
//!     .with_collection("users"),
//! );
//!
//! // Register its factory.
//! let mut entities = EntityRegistry::new();
//! entities.register::<User>();
//!
//! // Build the converter and wire it to a backend.
//! let converter = DocumentConverter::new(models, entities);
//! let connection = Connection::new(Arc::new(MemoryBackend::new()), converter);
//!
//! // Work with entities; raw documents stay out of sight.
//! let users = connection.collection("users");
//! let mut user = User::named("Alice");
//! users.insert(&mut user)?;                    // user.id is now assigned
//! let loaded = users.find_by_id(&user.id())?;  // a lazy proxy
//! let user_again = loaded.materialized()?;
//! ```
//!
//! # Converting without a store
//!
//! The converter is a pure transformation layer; no backend is needed until
//! references have to be resolved:
//!
//! ```ignore
//! let raw: bson::Document = converter.entity_to_document(&user)?;
//! let back = converter.to_entity(raw)?.materialized()?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing

pub mod prelude;

pub use docbind_core::{
    backend, collection, converter, entity, error, model, proxy, reference, types, value,
};

// Re-export the BSON and chrono types appearing in the public API.
pub use bson;
pub use chrono;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docbind_memory::{MemoryBackend, MemoryBackendBuilder};
}
