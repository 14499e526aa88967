//! Error types and result types for document mapping operations.
//!
//! This module provides error handling for the conversion engine. Use
//! [`BindResult<T>`] as the return type for fallible operations.
//!
//! All conversion errors are data or configuration errors: none of them are
//! transient, none are retried internally, and every one propagates
//! synchronously to the immediate caller.

use thiserror::Error;

/// Represents all possible errors raised by the mapping layer.
///
/// The first five variants cover the conversion engine itself; [`Storage`]
/// carries failures surfaced by a store backend.
///
/// [`Storage`]: BindError::Storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// An input expected to be an entity wasn't, or a to-be-referenced
    /// entity lacks a usable identifier.
    #[error("invalid entity: {0}")]
    InvalidEntity(String),
    /// A document lacking a class discriminator was submitted for strict
    /// (non-graceful) decoding.
    #[error("incomplete document: {0}")]
    IncompleteDocument(String),
    /// A field or value cited a scalar type tag with no registered converter.
    #[error("unknown type converter \"{0}\"")]
    UnknownType(String),
    /// A class name or collection name has no registered model or factory.
    #[error("model not found: {0}")]
    ModelNotFound(String),
    /// A reference token is malformed, or resolution was attempted before
    /// the resolver was connected to a backend.
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    /// An error occurred in the underlying storage backend.
    #[error("storage error: {0}")]
    Storage(String),
}

/// A specialized `Result` type for document mapping operations.
pub type BindResult<T> = Result<T, BindError>;
