//! In-memory storage backend for docbind.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreBackend` trait. It is ideal for development and testing: reference
//! resolution, identifier generation and the full entity round-trip work
//! against it without any external service.
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind::{collection::Connection, memory::MemoryBackend};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let connection = Connection::new(backend, converter);
//! let users = connection.collection("users");
//!
//! users.insert(&mut user)?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_memory;

pub mod store;

pub use store::{MemoryBackend, MemoryBackendBuilder};
