//! Entity Store Abstraction
//!
//! Provides a unified interface over transactional key-value engines:
//! - In-memory (tests, single-process deployments)
//! - SQLite (durable single-node deployments)

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::error::StoreResult;

/// A stored item: a JSON object keyed by field name
pub type Record = Map<String, Value>;

/// A put that only succeeds when the key is not yet present
#[derive(Debug, Clone, PartialEq)]
pub struct PutItem {
    pub collection: String,
    pub key: String,
    pub record: Record,
}

impl PutItem {
    pub fn new(collection: impl Into<String>, key: impl Into<String>, record: Record) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            record,
        }
    }
}

/// A single-field assignment applied by [`EntityStore::update`]
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub field: String,
    pub value: Value,
}

impl FieldUpdate {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Entity store trait - the only surface the coordinator touches
///
/// Implementations must be safe to share across concurrent requests.
/// Every mutating call applies in one step, so dropping the future
/// mid-flight never leaves half of a transactional write behind.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert `record` under `key`, failing with `Conflict` if the key exists
    async fn put_if_absent(&self, collection: &str, key: &str, record: Record) -> StoreResult<()>;

    /// Fetch the record under `key`
    async fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Record>>;

    /// Assign fields on an existing record. Absent keys are left absent.
    async fn update(&self, collection: &str, key: &str, updates: &[FieldUpdate]) -> StoreResult<()>;

    /// Remove the record under `key`. Absent keys are not an error.
    async fn delete(&self, collection: &str, key: &str) -> StoreResult<()>;

    /// All records whose string field `index_field` equals `value`
    async fn query_by_index(
        &self,
        collection: &str,
        index_field: &str,
        value: &str,
    ) -> StoreResult<Vec<Record>>;

    /// Apply every put or none of them
    async fn transact_write(&self, puts: Vec<PutItem>) -> StoreResult<()>;

    /// Get engine name
    fn backend_name(&self) -> &'static str;
}

/// Whether `record` carries `value` in its string field `field`
pub(crate) fn matches_index(record: &Record, field: &str, value: &str) -> bool {
    record.get(field).and_then(Value::as_str) == Some(value)
}
