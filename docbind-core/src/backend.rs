//! Storage backend abstraction.
//!
//! The conversion engine never talks to a database directly; it reaches raw
//! document storage through this trait. Implementations are expected to be
//! thin wrappers over a driver (or an in-memory map, see the
//! `docbind-memory` crate).
//!
//! All methods are synchronous: reference proxies materialize through a
//! blocking round-trip on first access, and the engine defines no
//! cancellation or timeout semantics of its own.

use std::fmt::Debug;

use bson::{Bson, Document};

use crate::error::BindResult;

/// Raw document storage operations a backend must provide.
///
/// Backends store documents exactly as handed to them; all conversion
/// happens above this seam. Failures surface as
/// [`BindError::Storage`](crate::error::BindError::Storage).
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts a document into a collection, assigning a fresh identifier
    /// when the document carries none. Returns the stored document, `_id`
    /// included.
    ///
    /// # Errors
    ///
    /// Fails when a document with the same identifier already exists.
    fn insert(&self, collection: &str, document: Document) -> BindResult<Document>;

    /// Inserts or replaces a document (upsert). Returns the stored
    /// document, `_id` included.
    fn save(&self, collection: &str, document: Document) -> BindResult<Document>;

    /// Fetches a document by identifier, or `None` when absent.
    fn find_by_id(&self, collection: &str, id: &Bson) -> BindResult<Option<Document>>;

    /// Removes a document by identifier. Returns `true` when a document was
    /// removed.
    fn remove_by_id(&self, collection: &str, id: &Bson) -> BindResult<bool>;
}
