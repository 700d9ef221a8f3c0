//! Store trait definitions

use async_trait::async_trait;
use clockistry_util::EntryId;

use crate::{Document, FieldFilter, StoreResult};

/// Key-value document store addressed by `(collection, id)`.
///
/// Every method is an I/O suspension point and may fail independently.
/// Apart from [`create_exclusive`](DocumentStore::create_exclusive) and
/// [`update_if`](DocumentStore::update_if), nothing here is transactional
/// across calls.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` if it does not exist
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Create or replace a document
    async fn set(&self, collection: &str, id: &str, doc: Document) -> StoreResult<()>;

    /// Merge top-level fields into an existing document.
    ///
    /// Fails with `StoreError::NotFound` if the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()>;

    /// Merge `fields` only if the stored document matches every filter in
    /// `expected`.
    ///
    /// The check and the write happen atomically. Returns `false` (and writes
    /// nothing) when the document no longer matches. Fails with
    /// `StoreError::NotFound` if the document does not exist.
    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        expected: &[FieldFilter],
    ) -> StoreResult<bool>;

    /// All documents matching every filter, in insertion order
    async fn query(&self, collection: &str, filters: &[FieldFilter]) -> StoreResult<Vec<Document>>;

    /// Insert `doc` only if no document in `collection` matches `conflicts`.
    ///
    /// The check and the insert happen atomically. Returns `false` (and
    /// writes nothing) when a conflicting document exists.
    async fn create_exclusive(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
        conflicts: &[FieldFilter],
    ) -> StoreResult<bool>;

    /// Allocate an id for a new document
    fn generate_id(&self) -> EntryId {
        EntryId::generate()
    }

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
