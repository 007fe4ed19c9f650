//! Process-local [`SeedStore`] used with `SEED_STORE=memory` and in tests.

use std::{
    collections::{HashMap, HashSet},
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::future::{self, BoxFuture};

use crate::dao::{
    seed_store::SeedStore,
    storage::{StorageError, StorageResult},
};

#[derive(Debug, Default)]
struct MemoryLists {
    lists: HashMap<String, Vec<String>>,
    writes: usize,
    failing_sets: HashSet<(String, usize)>,
    offline: bool,
}

/// In-memory list store with list semantics close to Redis.
///
/// Clones share the same underlying lists, which lets tests keep a handle while
/// the application owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemorySeedStore {
    inner: Arc<Mutex<MemoryLists>>,
}

impl InMemorySeedStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `key` with `values`.
    pub fn with_list<I, V>(self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.lock().lists.insert(
            key.to_string(),
            values.into_iter().map(|value| value.to_string()).collect(),
        );
        self
    }

    /// Current content of `key`, if any.
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        self.lock().lists.get(key).cloned()
    }

    /// Number of successful `append` and `positional_set` calls so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Make every `positional_set` on `key[index]` fail until cleared.
    pub fn fail_positional_set(&self, key: &str, index: usize) {
        self.lock().failing_sets.insert((key.to_string(), index));
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        self.lock().failing_sets.clear();
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryLists> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_lists<T>(
        &self,
        op: impl FnOnce(&mut MemoryLists) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut guard = self.lock();
        if guard.offline {
            return Err(StorageError::unavailable(
                "in-memory store is offline".into(),
                io::Error::from(io::ErrorKind::ConnectionRefused),
            ));
        }
        op(&mut guard)
    }
}

/// Resolve a possibly negative list offset against `len`.
fn resolve_offset(offset: i64, len: i64) -> i64 {
    if offset < 0 { len + offset } else { offset }
}

impl SeedStore for InMemorySeedStore {
    fn exists(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let result = self.with_lists(|state| Ok(state.lists.contains_key(key)));
        Box::pin(future::ready(result))
    }

    fn range_read(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let result = self.with_lists(|state| {
            let Some(list) = state.lists.get(key) else {
                return Ok(Vec::new());
            };
            let len = list.len() as i64;
            let start = resolve_offset(start, len).max(0);
            let end = resolve_offset(end, len).min(len - 1);
            if start > end {
                return Ok(Vec::new());
            }
            Ok(list[start as usize..=end as usize].to_vec())
        });
        Box::pin(future::ready(result))
    }

    fn append(&self, key: &str, values: Vec<i64>) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.with_lists(|state| {
            state
                .lists
                .entry(key.to_string())
                .or_default()
                .extend(values.iter().map(i64::to_string));
            state.writes += 1;
            Ok(())
        });
        Box::pin(future::ready(result))
    }

    fn positional_set(
        &self,
        key: &str,
        index: usize,
        value: i64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.with_lists(|state| {
            if state.failing_sets.contains(&(key.to_string(), index)) {
                return Err(StorageError::unavailable(
                    format!("injected failure on {key}[{index}]"),
                    io::Error::from(io::ErrorKind::TimedOut),
                ));
            }
            let Some(list) = state.lists.get_mut(key) else {
                return Err(StorageError::rejected(key, "no such key"));
            };
            let Some(slot) = list.get_mut(index) else {
                return Err(StorageError::rejected(key, "index out of range"));
            };
            *slot = value.to_string();
            state.writes += 1;
            Ok(())
        });
        Box::pin(future::ready(result))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.with_lists(|_| Ok(()));
        Box::pin(future::ready(result))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}
