//! In-process document store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::{matches_all, merge_fields, strip_absent, Document, DocumentStore, FieldFilter, StoreError, StoreResult};

type Collections = HashMap<String, Vec<(String, Document)>>;

/// Document store held in memory.
///
/// Used for tests and the `memory` backend. An optional per-call latency
/// turns every operation into a real suspension point, and the store can be
/// switched offline to simulate an outage.
pub struct MemoryStore {
    collections: Mutex<Collections>,
    latency: Option<Duration>,
    online: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            latency: None,
            online: AtomicBool::new(true),
        }
    }

    /// Sleep for `latency` before every operation
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::new()
        }
    }

    /// Toggle simulated availability
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .map(|c| c.get(collection).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    async fn round_trip(&self) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".into()))
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Collections>> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.round_trip().await?;
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|(doc_id, _)| doc_id == id))
            .map(|(_, doc)| doc.clone()))
    }

    async fn set(&self, collection: &str, id: &str, mut doc: Document) -> StoreResult<()> {
        self.round_trip().await?;
        strip_absent(&mut doc);
        let mut collections = self.lock()?;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|(doc_id, _)| doc_id == id) {
            Some((_, existing)) => *existing = doc,
            None => docs.push((id.to_string(), doc)),
        }
        debug!(collection, id, "Document set");
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        self.update_if(collection, id, fields, &[]).await.map(|_| ())
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        expected: &[FieldFilter],
    ) -> StoreResult<bool> {
        self.round_trip().await?;
        let mut collections = self.lock()?;
        let existing = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|(doc_id, _)| doc_id == id))
            .map(|(_, doc)| doc)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", collection, id)))?;

        if !matches_all(existing, expected) {
            debug!(collection, id, "Conditional update rejected");
            return Ok(false);
        }

        merge_fields(existing, fields);
        debug!(collection, id, "Document updated");
        Ok(true)
    }

    async fn query(&self, collection: &str, filters: &[FieldFilter]) -> StoreResult<Vec<Document>> {
        self.round_trip().await?;
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| matches_all(doc, filters))
                    .map(|(_, doc)| doc.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_exclusive(
        &self,
        collection: &str,
        id: &str,
        mut doc: Document,
        conflicts: &[FieldFilter],
    ) -> StoreResult<bool> {
        self.round_trip().await?;
        strip_absent(&mut doc);
        let mut collections = self.lock()?;
        let docs = collections.entry(collection.to_string()).or_default();

        if docs.iter().any(|(_, existing)| matches_all(existing, conflicts)) {
            debug!(collection, id, "Conditional create rejected");
            return Ok(false);
        }
        if docs.iter().any(|(doc_id, _)| doc_id == id) {
            return Err(StoreError::Database(format!("{}/{} already exists", collection, id)));
        }

        docs.push((id.to_string(), doc));
        debug!(collection, id, "Document created");
        Ok(true)
    }

    fn is_healthy(&self) -> bool {
        self.online.load(Ordering::SeqCst) && self.collections.lock().is_ok()
    }
}
