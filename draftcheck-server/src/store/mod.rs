//! Key-value storage shared by the check lifecycle and the rate limiter.
//!
//! The store is a plain overwrite-on-put key-value interface: no conditional
//! writes, no transactions. Namespacing is by key prefix, e.g.
//! `check:<owner/name>:<pr>` for check records.

mod memory;
mod sqlite;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

use async_trait::async_trait;

use crate::error::StoreError;

/// Capabilities the core requires from its backing store.
///
/// `put` is a full overwrite. There is no compare-and-swap, so callers that
/// read-modify-write share a race window; see `CheckLifecycle::admit`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// All stored keys starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
