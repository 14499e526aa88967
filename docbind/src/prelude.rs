//! Convenient re-exports of commonly used types from docbind.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docbind::prelude::*;
//! ```

pub use docbind_core::{
    backend::StoreBackend,
    collection::{Collection, Connection},
    converter::{DocumentConverter, DocumentConverterBuilder},
    entity::{Entity, EntityRegistry, EntityType},
    error::{BindError, BindResult},
    model::{ElementKind, FieldDescriptor, FieldKind, Model, ModelRegistry},
    proxy::Proxy,
    reference::ReferenceResolver,
    types::{KEY_CLASS, KEY_ID, TypeConverter, TypeRegistry, tags},
    value::{FieldMap, Value},
};
