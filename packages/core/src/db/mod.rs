//! Storage Layer
//!
//! This module holds everything that touches storage:
//!
//! - Fractional position keys for sibling ordering
//! - The `DocumentStore` abstraction over the authoritative document database,
//!   with an in-memory implementation for tests and offline-first clients
//! - The Local Cache: page mirrors plus the durable operation queue, backed by
//!   libsql or kept in memory when durable storage is unavailable

mod document_store;
mod error;
pub mod events;
pub mod fractional_ordering;
mod local_cache;
mod memory_store;
mod sqlite_cache;

pub use document_store::{compare_values, BatchOp, Document, DocumentStore, Filter, SnapshotStream};
pub use error::{CacheError, StoreError};
pub use events::StoreChange;
pub use fractional_ordering::{FractionalIndex, PositionError, FIRST_KEY};
pub use local_cache::{LocalCache, MemoryCache};
pub use memory_store::MemoryDocumentStore;
pub use sqlite_cache::SqliteCache;
