//! Persistent document store
//!
//! A minimal document interface keyed by collection and id. Decision records
//! are written with [`DocumentStore::insert`], which refuses to overwrite;
//! everything else is upserted.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Collection names used by the daemon
pub mod collections {
    pub const PERSONAS: &str = "personas";
    pub const ASSIGNMENTS: &str = "assignments";
    pub const SESSIONS: &str = "sessions";
    pub const DECISIONS: &str = "decisions";
    pub const METRICS: &str = "metrics";
    pub const CYCLES: &str = "cycles";
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable location for diagnostics
    fn location(&self) -> String;

    /// Insert a new document. Fails with `StoreDuplicate` if the id exists.
    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Insert or replace a document
    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// All documents in a collection, ordered by id
    async fn list(&self, collection: &str) -> Result<Vec<Value>>;
}

/// Outcome of an insert-only write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

// ─────────────────────────────────────────────────────────────────
// Typed helpers
// ─────────────────────────────────────────────────────────────────

/// Insert a typed document, mapping `StoreDuplicate` to `AlreadyExists`
pub async fn insert_doc<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    doc: &T,
) -> Result<InsertOutcome> {
    match store.insert(collection, id, serde_json::to_value(doc)?).await {
        Ok(()) => Ok(InsertOutcome::Inserted),
        Err(Error::StoreDuplicate { .. }) => Ok(InsertOutcome::AlreadyExists),
        Err(e) => Err(e),
    }
}

pub async fn upsert_doc<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    doc: &T,
) -> Result<()> {
    store.upsert(collection, id, serde_json::to_value(doc)?).await
}

pub async fn get_doc<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>> {
    match store.get(collection, id).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| Error::StoreCorrupt {
                collection: collection.to_string(),
                id: id.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Decode every document in a collection. Undecodable documents are an error.
pub async fn list_docs<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<T>> {
    store
        .list(collection)
        .await?
        .into_iter()
        .map(|value| {
            let id = value
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string();
            serde_json::from_value(value).map_err(|e| Error::StoreCorrupt {
                collection: collection.to_string(),
                id,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Reject ids that would escape a collection directory
pub(crate) fn validate_id(collection: &str, id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(Error::StoreCorrupt {
            collection: collection.to_string(),
            id: id.to_string(),
            message: "invalid document id".to_string(),
        })
    }
}
