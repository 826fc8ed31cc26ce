//! In-Memory Entity Store
//!
//! DashMap-backed engine. Reads are lock-free; conditional writes and
//! transactions serialize through a single write gate so a transaction's
//! existence checks and puts are observed as one step.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashSet;

use super::backend::{matches_index, EntityStore, FieldUpdate, PutItem, Record};
use super::error::{StoreError, StoreResult};

type ItemKey = (String, String);

fn item_key(collection: &str, key: &str) -> ItemKey {
    (collection.to_string(), key.to_string())
}

/// In-memory store shared by reference across requests
pub struct MemoryStore {
    /// (collection, key) -> record
    items: DashMap<ItemKey, Record>,
    /// Held for every mutation
    write_gate: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            write_gate: Mutex::new(()),
        }
    }

    /// Number of records held in a collection
    pub fn item_count(&self, collection: &str) -> usize {
        self.items.iter().filter(|e| e.key().0 == collection).count()
    }

    /// Whether a record exists
    pub fn contains(&self, collection: &str, key: &str) -> bool {
        self.items.contains_key(&item_key(collection, key))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn put_if_absent(&self, collection: &str, key: &str, record: Record) -> StoreResult<()> {
        let _gate = self.write_gate.lock();

        match self.items.entry(item_key(collection, key)) {
            Entry::Occupied(_) => Err(StoreError::conflict(collection, key)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Record>> {
        Ok(self
            .items
            .get(&item_key(collection, key))
            .map(|r| r.value().clone()))
    }

    async fn update(&self, collection: &str, key: &str, updates: &[FieldUpdate]) -> StoreResult<()> {
        let _gate = self.write_gate.lock();

        if let Some(mut record) = self.items.get_mut(&item_key(collection, key)) {
            for update in updates {
                record.insert(update.field.clone(), update.value.clone());
            }
        } else {
            debug!("Update skipped, no item at {}/{}", collection, key);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> StoreResult<()> {
        let _gate = self.write_gate.lock();
        self.items.remove(&item_key(collection, key));
        Ok(())
    }

    async fn query_by_index(
        &self,
        collection: &str,
        index_field: &str,
        value: &str,
    ) -> StoreResult<Vec<Record>> {
        let mut matched: Vec<(String, Record)> = self
            .items
            .iter()
            .filter(|e| e.key().0 == collection && matches_index(e.value(), index_field, value))
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();

        // Stable order for callers, matching the SQLite engine
        matched.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matched.into_iter().map(|(_, record)| record).collect())
    }

    async fn transact_write(&self, puts: Vec<PutItem>) -> StoreResult<()> {
        let _gate = self.write_gate.lock();

        let mut seen = HashSet::with_capacity(puts.len());
        for put in &puts {
            let key = item_key(&put.collection, &put.key);
            if self.items.contains_key(&key) || !seen.insert(key) {
                return Err(StoreError::conflict(&put.collection, &put.key));
            }
        }

        for put in puts {
            self.items.insert((put.collection, put.key), put.record);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_put_if_absent_rejects_duplicate_key() {
        let store = MemoryStore::new();
        store
            .put_if_absent("members", "p1", record(json!({ "memberId": "p1" })))
            .await
            .unwrap();

        let result = store
            .put_if_absent("members", "p1", record(json!({ "memberId": "p1", "x": 1 })))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));

        // Original record untouched
        let stored = store.get("members", "p1").await.unwrap().unwrap();
        assert!(stored.get("x").is_none());
    }

    #[tokio::test]
    async fn test_collections_are_independent() {
        let store = MemoryStore::new();
        store.put_if_absent("sessions", "k", Record::new()).await.unwrap();
        store.put_if_absent("members", "k", Record::new()).await.unwrap();

        assert_eq!(store.item_count("sessions"), 1);
        assert_eq!(store.item_count("members"), 1);
    }

    #[tokio::test]
    async fn test_transaction_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.put_if_absent("members", "p1", Record::new()).await.unwrap();

        let result = store
            .transact_write(vec![
                PutItem::new("sessions", "s1", record(json!({ "sessionId": "s1" }))),
                PutItem::new("members", "p1", record(json!({ "memberId": "p1" }))),
            ])
            .await;

        assert!(result.unwrap_err().is_conflict());
        assert!(!store.contains("sessions", "s1"));
    }

    #[tokio::test]
    async fn test_transaction_rejects_duplicate_keys_within_batch() {
        let store = MemoryStore::new();
        let result = store
            .transact_write(vec![
                PutItem::new("members", "p1", Record::new()),
                PutItem::new("members", "p1", Record::new()),
            ])
            .await;

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(store.item_count("members"), 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        store
            .put_if_absent("sessions", "s1", record(json!({ "started": false })))
            .await
            .unwrap();

        store
            .update("sessions", "s1", &[FieldUpdate::set("started", true)])
            .await
            .unwrap();
        let stored = store.get("sessions", "s1").await.unwrap().unwrap();
        assert_eq!(stored["started"], json!(true));

        // Absent keys stay absent
        store
            .update("sessions", "nope", &[FieldUpdate::set("started", true)])
            .await
            .unwrap();
        assert!(!store.contains("sessions", "nope"));

        store.delete("sessions", "s1").await.unwrap();
        store.delete("sessions", "s1").await.unwrap();
        assert!(store.get("sessions", "s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_by_index() {
        let store = MemoryStore::new();
        for (id, session) in [("p2", "s1"), ("p1", "s1"), ("p3", "s2")] {
            store
                .put_if_absent("members", id, record(json!({ "memberId": id, "sessionId": session })))
                .await
                .unwrap();
        }

        let found = store.query_by_index("members", "sessionId", "s1").await.unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r["memberId"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);

        assert!(store
            .query_by_index("members", "sessionId", "s9")
            .await
            .unwrap()
            .is_empty());
    }
}
