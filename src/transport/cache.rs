//! TTL caching with memory and file backends.
//!
//! Both backends implement the same contract. Expired entries are never
//! returned; they are removed when observed. The memory backend evicts
//! least-recently-used entries at capacity; the file backend caps total bytes
//! and evicts least-recently-accessed files down to 80% of the cap.

use crate::models::DataCategory;
use crate::{OracleError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Uniform cache contract shared by every backend.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

struct MemoryEntry {
    value: Value,
    expires_at: Option<Instant>,
    hits: u64,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if Instant::now() > at)
    }
}

struct MemoryInner {
    entries: HashMap<String, MemoryEntry>,
    /// LRU order, least-recently-used first
    access_order: Vec<String>,
}

impl MemoryInner {
    fn touch(&mut self, key: &str) {
        self.access_order.retain(|k| k != key);
        self.access_order.push(key.to_string());
    }

    fn remove(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.access_order.retain(|k| k != key);
        }
        removed
    }
}

/// In-memory LRU cache with per-entry TTL.
pub struct MemoryCache {
    max_size: usize,
    default_ttl: Duration,
    inner: Mutex<MemoryInner>,
}

impl MemoryCache {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            max_size,
            default_ttl,
            inner: Mutex::new(MemoryInner {
                entries: HashMap::new(),
                access_order: Vec::new(),
            }),
        }
    }

    /// Entry count and utilization, for diagnostics.
    pub async fn stats(&self) -> (usize, f64) {
        let inner = self.inner.lock().await;
        let entries = inner.entries.len();
        (entries, entries as f64 / self.max_size as f64)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(300))
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut inner = self.inner.lock().await;
        let expired = match inner.entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(),
        };
        if expired {
            inner.remove(key);
            return Ok(None);
        }
        inner.touch(key);
        let entry = inner.entries.get_mut(key).expect("entry checked above");
        entry.hits += 1;
        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.entries.len() >= self.max_size && !inner.entries.contains_key(key) {
            if let Some(lru) = inner.access_order.first().cloned() {
                debug!(key = %lru, "evicting least-recently-used cache entry");
                inner.remove(&lru);
            }
        }
        let ttl = ttl.unwrap_or(self.default_ttl);
        inner.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Some(Instant::now() + ttl),
                hits: 0,
            },
        );
        inner.touch(key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.inner.lock().await.remove(key))
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.access_order.clear();
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let expired = match inner.entries.get(key) {
            None => return Ok(false),
            Some(entry) => entry.is_expired(),
        };
        if expired {
            inner.remove(key);
            return Ok(false);
        }
        Ok(true)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileMeta {
    key: String,
    created_at: f64,
    last_accessed: f64,
    expires_at: Option<f64>,
    hits: u64,
    size: u64,
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// File-backed cache: hashed key -> `<hash>.cache` value + `<hash>.meta` JSON.
///
/// The value file is written before the meta file, so an entry only becomes
/// visible once both halves are complete; readers never observe a torn entry.
pub struct FileCache {
    cache_dir: PathBuf,
    max_size_bytes: u64,
    lock: Mutex<()>,
}

impl FileCache {
    pub fn new(cache_dir: impl AsRef<Path>, max_size_mb: u64) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            max_size_bytes: max_size_mb * 1024 * 1024,
            lock: Mutex::new(()),
        })
    }

    fn hashed(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex[..32].to_string()
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.cache", Self::hashed(key)))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.meta", Self::hashed(key)))
    }

    async fn read_meta(&self, path: &Path) -> Option<FileMeta> {
        let raw = tokio::fs::read_to_string(path).await.ok()?;
        serde_json::from_str(&raw).ok()
    }

    async fn remove_entry(&self, key: &str) -> bool {
        let value_removed = tokio::fs::remove_file(self.value_path(key)).await.is_ok();
        let meta_removed = tokio::fs::remove_file(self.meta_path(key)).await.is_ok();
        value_removed || meta_removed
    }

    /// Evict least-recently-accessed entries until total size is at or below
    /// 80% of the cap.
    async fn cleanup_if_needed(&self) -> Result<()> {
        let mut entries: Vec<(FileMeta, PathBuf, PathBuf)> = Vec::new();
        let mut total: u64 = 0;

        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().map(|e| e == "meta").unwrap_or(false) {
                if let Some(meta) = self.read_meta(&path).await {
                    let value_path = path.with_extension("cache");
                    if tokio::fs::try_exists(&value_path).await.unwrap_or(false) {
                        total += meta.size;
                        entries.push((meta, value_path, path));
                    }
                } else {
                    // Corrupted metadata: discard the orphan
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }

        if total <= self.max_size_bytes {
            return Ok(());
        }

        entries.sort_by(|a, b| {
            a.0.last_accessed
                .partial_cmp(&b.0.last_accessed)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let target = (self.max_size_bytes as f64 * 0.8) as u64;
        for (meta, value_path, meta_path) in entries {
            let _ = tokio::fs::remove_file(&value_path).await;
            let _ = tokio::fs::remove_file(&meta_path).await;
            total = total.saturating_sub(meta.size);
            if total <= target {
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for FileCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        let meta_path = self.meta_path(key);
        let value_path = self.value_path(key);

        let Some(mut meta) = self.read_meta(&meta_path).await else {
            return Ok(None);
        };
        if matches!(meta.expires_at, Some(at) if unix_now() > at) {
            self.remove_entry(key).await;
            return Ok(None);
        }

        let raw = match tokio::fs::read_to_string(&value_path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "cache value unreadable, discarding entry");
                self.remove_entry(key).await;
                return Ok(None);
            }
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "cache value corrupted, discarding entry");
                self.remove_entry(key).await;
                return Ok(None);
            }
        };

        meta.last_accessed = unix_now();
        meta.hits += 1;
        tokio::fs::write(&meta_path, serde_json::to_string(&meta)?).await?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let value_path = self.value_path(key);
        let meta_path = self.meta_path(key);

        let raw = serde_json::to_string(&value)?;
        let size = raw.len() as u64;
        // Value first, meta second: the entry is visible only once complete
        tokio::fs::write(&value_path, raw).await?;
        let meta = FileMeta {
            key: key.to_string(),
            created_at: unix_now(),
            last_accessed: unix_now(),
            expires_at: ttl.map(|t| unix_now() + t.as_secs_f64()),
            hits: 0,
            size,
        };
        if let Err(e) = tokio::fs::write(&meta_path, serde_json::to_string(&meta)?).await {
            // Clean up the partial write
            let _ = tokio::fs::remove_file(&value_path).await;
            return Err(OracleError::Cache(format!("meta write failed: {e}")));
        }

        self.cleanup_if_needed().await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.remove_entry(key).await)
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let is_cache_file = path
                .extension()
                .map(|e| e == "cache" || e == "meta")
                .unwrap_or(false);
            if is_cache_file {
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let Some(meta) = self.read_meta(&self.meta_path(key)).await else {
            return Ok(false);
        };
        if matches!(meta.expires_at, Some(at) if unix_now() > at) {
            self.remove_entry(key).await;
            return Ok(false);
        }
        tokio::fs::try_exists(self.value_path(key))
            .await
            .map_err(|e| OracleError::Cache(e.to_string()))
    }
}

/// High-level cache front: key prefixing, default TTL, read-through helper.
pub struct CacheManager {
    backend: Box<dyn CacheBackend>,
    key_prefix: String,
    default_ttl: Duration,
}

impl CacheManager {
    pub fn new(backend: Box<dyn CacheBackend>, key_prefix: &str, default_ttl: Duration) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.to_string(),
            default_ttl,
        }
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.backend.get(&self.make_key(key)).await
    }

    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.or(Some(self.default_ttl));
        self.backend.set(&self.make_key(key), value, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.backend.delete(&self.make_key(key)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.backend.exists(&self.make_key(key)).await
    }

    /// Read-through: return the cached value or produce, store, and return it.
    pub async fn get_or_set<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(cached) = self.get(key).await? {
            return Ok(cached);
        }
        let value = producer().await?;
        self.set(key, value.clone(), ttl).await?;
        Ok(value)
    }
}

/// Cache key for an arbitrary request document: sha256 over canonical JSON
/// (object keys sorted).
pub fn cache_key_for_request(request: &Value) -> String {
    let canonical = serde_json::to_string(request).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// TTL by data category: fast-moving data expires quickly.
pub fn ttl_for_category(category: DataCategory) -> Duration {
    let secs = match category {
        DataCategory::Price => 60,
        DataCategory::Sports => 300,
        DataCategory::Weather => 600,
        DataCategory::Events => 1800,
        DataCategory::Economic => 3600,
        _ => 300,
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_cache_expires_entries() {
        let cache = MemoryCache::new(10, Duration::from_secs(300));
        cache
            .set("k", json!({"price": 65000}), Some(Duration::from_millis(40)))
            .await
            .unwrap();
        assert!(cache.exists("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        // Expired entries are never returned
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn memory_cache_evicts_lru_at_capacity() {
        let cache = MemoryCache::new(2, Duration::from_secs(300));
        cache.set("a", json!(1), None).await.unwrap();
        cache.set("b", json!(2), None).await.unwrap();
        // Touch "a" so "b" becomes least recently used
        cache.get("a").await.unwrap();
        cache.set("c", json!(3), None).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), Some(json!(1)));
        assert_eq!(cache.get("b").await.unwrap(), None);
        assert_eq!(cache.get("c").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn file_cache_round_trips_and_expires() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path(), 10).unwrap();

        cache
            .set("btc", json!({"price": 65000.0}), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(
            cache.get("btc").await.unwrap(),
            Some(json!({"price": 65000.0}))
        );

        // Both halves of the entry exist on disk
        let hashed: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(hashed.len(), 2);

        cache
            .set("eth", json!(3000), Some(Duration::from_millis(30)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("eth").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_cache_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path(), 10).unwrap();
        cache.set("a", json!(1), None).await.unwrap();
        assert!(cache.delete("a").await.unwrap());
        assert!(!cache.exists("a").await.unwrap());

        cache.set("b", json!(2), None).await.unwrap();
        cache.clear().await.unwrap();
        assert!(!cache.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn manager_prefixes_and_reads_through() {
        let manager = CacheManager::new(
            Box::new(MemoryCache::default()),
            "oracle",
            Duration::from_secs(300),
        );
        let value = manager
            .get_or_set("price:BTC", None, || async { Ok(json!(65000)) })
            .await
            .unwrap();
        assert_eq!(value, json!(65000));

        // Second read comes from cache, producer not invoked
        let value = manager
            .get_or_set("price:BTC", None, || async {
                Err(OracleError::Internal(anyhow::anyhow!("must not be called")))
            })
            .await
            .unwrap();
        assert_eq!(value, json!(65000));
    }

    #[test]
    fn request_cache_keys_are_stable() {
        let a = json!({"query": "BTC/USD", "data_type": "price"});
        let b = json!({"data_type": "price", "query": "BTC/USD"});
        // serde_json object keys are ordered, so field order cannot matter
        assert_eq!(cache_key_for_request(&a), cache_key_for_request(&b));
    }

    #[test]
    fn category_ttls() {
        assert_eq!(ttl_for_category(DataCategory::Price), Duration::from_secs(60));
        assert_eq!(
            ttl_for_category(DataCategory::Economic),
            Duration::from_secs(3600)
        );
        assert_eq!(ttl_for_category(DataCategory::Nft), Duration::from_secs(300));
    }
}
