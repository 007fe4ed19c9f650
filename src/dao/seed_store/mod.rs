pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the durable key-ordered list service backing the seed counters.
///
/// Each key holds one list of decimal-encoded integers. Indices follow list
/// semantics: `range_read` accepts negative offsets counted from the tail.
pub trait SeedStore: Send + Sync {
    /// Whether a list is stored under `key`.
    fn exists(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// Read the inclusive `start..=end` slice of the list stored at `key`.
    fn range_read(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>>;
    /// Append `values` to the tail of the list stored at `key`, creating it if needed.
    fn append(&self, key: &str, values: Vec<i64>) -> BoxFuture<'static, StorageResult<()>>;
    /// Overwrite the entry at `index` of the existing list stored at `key`.
    fn positional_set(
        &self,
        key: &str,
        index: usize,
        value: i64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap round-trip used by the storage supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the underlying connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
