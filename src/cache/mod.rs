//! Persistent key/value storage for measure source snapshots.
//!
//! Every measure source family writes its snapshots into a named store.
//! The default store is SQLite at `~/.budgetsync/cache.db`; an in-memory
//! store backs tests and the offline simulation.
//!
//! # Design
//!
//! - Opaque blob values keyed by `(store, key)`
//! - No cross-key transactions; last writer wins on a key
//! - Expiry lives inside the blob ([`CacheEntry`]), not in the store
//! - Versioned - auto-clears on version mismatch
//!
//! # Key Format
//!
//! ```text
//! {store}  /  {source_id}[@{revision}]:snapshot  -> CacheEntry<Vec<Measure>>
//! ```

mod clock;
mod entry;
mod hash;
mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{is_stale, CacheEntry, Expiry};
pub use hash::stable_hash_u64;
pub use memory::MemoryCacheStore;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

/// Current cache schema version. Bump this when the cache format changes.
const CACHE_VERSION: i32 = 1;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache lock poisoned")]
    Poisoned,
}

pub type CacheResult<T> = Result<T, CacheError>;

/// A named blob store.
///
/// Implementations only need `get`/`set`/`contains_key`; everything else has
/// a default. The store name scopes keys so unrelated source families never
/// see each other's entries.
pub trait CacheStore: Send + Sync {
    /// Read the raw bytes stored under `key`.
    fn get(&self, store: &str, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Replace the bytes stored under `key`.
    fn set(&self, store: &str, key: &str, value: &[u8]) -> CacheResult<()>;

    /// Check whether `key` holds a value.
    fn contains_key(&self, store: &str, key: &str) -> CacheResult<bool> {
        Ok(self.get(store, key)?.is_some())
    }

    /// Remove a key. Returns true if something was removed.
    fn delete(&self, store: &str, key: &str) -> CacheResult<bool>;

    /// Remove every key in a store. Returns the number removed.
    fn clear_store(&self, store: &str) -> CacheResult<usize>;

    /// Remove every entry of every store.
    fn clear_all(&self) -> CacheResult<usize>;

    /// Entry count and total payload size.
    fn stats(&self) -> CacheResult<CacheStats>;
}

/// Typed JSON access on top of any [`CacheStore`].
pub trait CacheStoreExt: CacheStore {
    /// Get and deserialize a JSON value.
    fn get_json<T: DeserializeOwned>(&self, store: &str, key: &str) -> CacheResult<Option<T>> {
        match self.get(store, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a JSON value.
    fn set_json<T: Serialize>(&self, store: &str, key: &str, value: &T) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(store, key, &bytes)
    }
}

impl<S: CacheStore + ?Sized> CacheStoreExt for S {}

/// A store handle bound to one store name.
#[derive(Clone)]
pub struct ScopedCache {
    store: Arc<dyn CacheStore>,
    name: String,
}

impl ScopedCache {
    pub fn new(store: Arc<dyn CacheStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// The store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        self.store.get_json(&self.name, key)
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        self.store.set_json(&self.name, key, value)
    }

    pub fn contains_key(&self, key: &str) -> CacheResult<bool> {
        self.store.contains_key(&self.name, key)
    }

    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        self.store.delete(&self.name, key)
    }
}

impl std::fmt::Debug for ScopedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedCache").field("name", &self.name).finish()
    }
}

/// SQLite-backed [`CacheStore`].
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open or create the cache database at the default location.
    ///
    /// The cache is stored at `~/.budgetsync/cache.db`.
    /// If the cache version doesn't match, it's automatically cleared.
    pub fn open() -> CacheResult<Self> {
        Self::open_at(Self::default_path()?)
    }

    /// Open or create the cache database at `path`.
    pub fn open_at(path: impl Into<PathBuf>) -> CacheResult<Self> {
        let path = path.into();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init()?;

        Ok(cache)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init()?;
        Ok(cache)
    }

    /// Get the default path to the cache database.
    pub fn default_path() -> CacheResult<PathBuf> {
        let base = dirs::home_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(base.join(".budgetsync").join("cache.db"))
    }

    fn conn(&self) -> CacheResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Initialize the cache schema and check version.
    fn init(&self) -> CacheResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache (
                store TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (store, key)
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == CACHE_VERSION => {}
            Some(_) => {
                // Version mismatch, the blob layout may have changed
                conn.execute("DELETE FROM cache", [])?;
                Self::set_version(&conn)?;
            }
            None => Self::set_version(&conn)?,
        }

        Ok(())
    }

    fn set_version(conn: &Connection) -> CacheResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
            params![CACHE_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// List the keys held in a store.
    pub fn keys(&self, store: &str) -> CacheResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM cache WHERE store = ? ORDER BY key")?;
        let keys = stmt
            .query_map(params![store], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// List store names that currently hold entries.
    pub fn stores(&self) -> CacheResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT store FROM cache ORDER BY store")?;
        let stores = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(stores)
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, store: &str, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM cache WHERE store = ? AND key = ?",
                params![store, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, store: &str, key: &str, value: &[u8]) -> CacheResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache (store, key, value) VALUES (?, ?, ?)",
            params![store, key, value],
        )?;
        Ok(())
    }

    fn contains_key(&self, store: &str, key: &str) -> CacheResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM cache WHERE store = ? AND key = ?",
                params![store, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn delete(&self, store: &str, key: &str) -> CacheResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM cache WHERE store = ? AND key = ?",
            params![store, key],
        )?;
        Ok(rows > 0)
    }

    fn clear_store(&self, store: &str) -> CacheResult<usize> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM cache WHERE store = ?", params![store])?)
    }

    fn clear_all(&self) -> CacheResult<usize> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM cache", [])?)
    }

    fn stats(&self) -> CacheResult<CacheStats> {
        let conn = self.conn()?;
        let entry_count: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;

        let total_size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM cache",
            [],
            |row| row.get(0),
        )?;

        Ok(CacheStats {
            entry_count: entry_count as usize,
            total_size_bytes: total_size as usize,
        })
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in the cache.
    pub entry_count: usize,
    /// Total size of all values in bytes.
    pub total_size_bytes: usize,
}

/// Helper for generating cache keys.
pub struct CacheKey;

impl CacheKey {
    /// Store name for a source family on one network, e.g. `appnexus:static`.
    pub fn store(network: &str, family: &str) -> String {
        format!("{}:{}", network, family)
    }

    /// Key for a source's measure snapshot.
    pub fn snapshot(source_id: &str) -> String {
        format!("{}:snapshot", source_id)
    }

    /// Key for a snapshot of one revision of a source's content.
    pub fn revised_snapshot(source_id: &str, revision: &str) -> String {
        format!("{}@{}:snapshot", source_id, revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_open_in_memory() {
        let cache = SqliteCacheStore::open_in_memory().unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entry_count, 0);
    }

    #[test]
    fn test_cache_get_set() {
        let cache = SqliteCacheStore::open_in_memory().unwrap();

        cache
            .set_json("appnexus:static", "age:snapshot", &vec!["a", "b", "c"])
            .unwrap();

        let value: Option<Vec<String>> = cache.get_json("appnexus:static", "age:snapshot").unwrap();
        assert_eq!(
            value,
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );

        // Same key, different store
        let missing: Option<Vec<String>> = cache.get_json("dfp:static", "age:snapshot").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_cache_contains_and_delete() {
        let cache = SqliteCacheStore::open_in_memory().unwrap();

        cache.set("s", "k", b"value").unwrap();
        assert!(cache.contains_key("s", "k").unwrap());

        assert!(cache.delete("s", "k").unwrap());
        assert!(!cache.contains_key("s", "k").unwrap());
        assert!(!cache.delete("s", "k").unwrap());
    }

    #[test]
    fn test_cache_set_replaces() {
        let cache = SqliteCacheStore::open_in_memory().unwrap();

        cache.set("s", "k", b"one").unwrap();
        cache.set("s", "k", b"two").unwrap();

        assert_eq!(cache.get("s", "k").unwrap(), Some(b"two".to_vec()));
        assert_eq!(cache.stats().unwrap().entry_count, 1);
    }

    #[test]
    fn test_cache_clear_store() {
        let cache = SqliteCacheStore::open_in_memory().unwrap();

        cache.set("appnexus:static", "a", b"1").unwrap();
        cache.set("appnexus:static", "b", b"2").unwrap();
        cache.set("appnexus:inventory", "a", b"3").unwrap();

        assert_eq!(cache.clear_store("appnexus:static").unwrap(), 2);
        assert_eq!(cache.stores().unwrap(), vec!["appnexus:inventory".to_string()]);
        assert_eq!(cache.keys("appnexus:inventory").unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_cache_key_helpers() {
        assert_eq!(CacheKey::store("appnexus", "static"), "appnexus:static");
        assert_eq!(CacheKey::snapshot("age_range"), "age_range:snapshot");
        assert_eq!(
            CacheKey::revised_snapshot("domains-7", "00ff"),
            "domains-7@00ff:snapshot"
        );
    }

    #[test]
    fn test_cache_stats() {
        let cache = SqliteCacheStore::open_in_memory().unwrap();

        cache.set_json("s", "key1", &"short").unwrap();
        cache.set_json("s", "key2", &"a longer string value").unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entry_count, 2);
        assert!(stats.total_size_bytes > 0);
    }

    #[test]
    fn test_scoped_cache() {
        let store: Arc<dyn CacheStore> = Arc::new(SqliteCacheStore::open_in_memory().unwrap());
        let scoped = ScopedCache::new(store.clone(), "dfp:inventory");

        scoped.set_json("segments:snapshot", &42u32).unwrap();
        assert!(scoped.contains_key("segments:snapshot").unwrap());
        assert!(store.contains_key("dfp:inventory", "segments:snapshot").unwrap());
        assert_eq!(scoped.get_json::<u32>("segments:snapshot").unwrap(), Some(42));
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = std::env::temp_dir().join(format!("budgetsync-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("cache.db");

        {
            let cache = SqliteCacheStore::open_at(&path).unwrap();
            cache.set("s", "k", b"persisted").unwrap();
        }

        let cache = SqliteCacheStore::open_at(&path).unwrap();
        assert_eq!(cache.get("s", "k").unwrap(), Some(b"persisted".to_vec()));

        let _ = std::fs::remove_dir_all(dir);
    }
}
