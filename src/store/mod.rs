//! Entity Store Module
//!
//! Transactional key-value storage consumed by the session coordinator:
//! - Conditional puts and all-or-nothing multi-item writes
//! - Single-field updates and idempotent deletes
//! - Secondary-index lookups by field value
//!
//! Two interchangeable engines are provided behind [`EntityStore`].

pub mod backend;
pub mod error;
pub mod memory;
pub mod sqlite;

pub use backend::{EntityStore, FieldUpdate, PutItem, Record};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
