//! Per-kind store client capability trait.

use async_trait::async_trait;
use capstan_core::{LabelSelector, Object};

use crate::error::StoreResult;
use crate::event::WatchStream;

/// CRUD + watch over one resource kind.
///
/// Controllers hold `Arc<dyn ResourceClient<K>>` handles for exactly the
/// kinds they touch; nothing in the system sees a whole-store client.
#[async_trait]
pub trait ResourceClient<T: Object>: Send + Sync {
    /// All objects matching `selector`, plus the store's current
    /// resource version (the point to watch from).
    async fn list(&self, selector: &LabelSelector) -> StoreResult<(Vec<T>, u64)>;

    async fn get(&self, id: &str) -> StoreResult<T>;

    /// Stores a new object. Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, obj: T) -> StoreResult<T>;

    /// Replaces an existing object. When `obj` carries a non-zero
    /// resource version the write is compare-and-set: a mismatch fails
    /// with `Conflict` and writes nothing.
    async fn update(&self, obj: T) -> StoreResult<T>;

    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Opens a stream of changes after `resource_version`.
    async fn watch(&self, resource_version: u64) -> StoreResult<WatchStream<T>>;
}
