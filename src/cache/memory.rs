//! In-process [`CacheStore`] backed by a concurrent map.

use dashmap::DashMap;

use super::{CacheResult, CacheStats, CacheStore};

/// A [`CacheStore`] that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<(String, String), Vec<u8>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, store: &str, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .get(&(store.to_string(), key.to_string()))
            .map(|v| v.value().clone()))
    }

    fn set(&self, store: &str, key: &str, value: &[u8]) -> CacheResult<()> {
        self.entries
            .insert((store.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    fn contains_key(&self, store: &str, key: &str) -> CacheResult<bool> {
        Ok(self
            .entries
            .contains_key(&(store.to_string(), key.to_string())))
    }

    fn delete(&self, store: &str, key: &str) -> CacheResult<bool> {
        Ok(self
            .entries
            .remove(&(store.to_string(), key.to_string()))
            .is_some())
    }

    fn clear_store(&self, store: &str) -> CacheResult<usize> {
        let before = self.entries.len();
        self.entries.retain(|(s, _), _| s != store);
        Ok(before - self.entries.len())
    }

    fn clear_all(&self) -> CacheResult<usize> {
        let removed = self.entries.len();
        self.entries.clear();
        Ok(removed)
    }

    fn stats(&self) -> CacheResult<CacheStats> {
        let total_size_bytes = self.entries.iter().map(|e| e.value().len()).sum();
        Ok(CacheStats {
            entry_count: self.entries.len(),
            total_size_bytes,
        })
    }
}
