//! Override lookup cache
//!
//! Caches the result of the per-check override query, including "no
//! override", for a fixed TTL. Admin actions and bus events evict entries
//! explicitly; the TTL bounds staleness for changes made elsewhere.
//!
//! Every eviction bumps a generation counter. A lookup records the
//! generation before it queries the store and only caches its result if no
//! eviction happened in between, so a slow read cannot restore a value an
//! admin action just evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;
use vireo_permissions::UserPermissionOverride;

/// Default maximum number of cached lookups
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Cached override lookup
#[derive(Debug, Clone)]
struct CachedLookup {
    value: Option<UserPermissionOverride>,
    expires_at: Instant,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Live and expired entries currently held
    pub size: usize,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that went to the store
    pub misses: u64,
    /// Entries dropped to stay within capacity
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

/// TTL cache of override lookups keyed by user and permission.
///
/// Clones share the same entries.
#[derive(Debug, Clone)]
pub struct OverrideCache {
    entries: Arc<RwLock<HashMap<(Uuid, String), CachedLookup>>>,
    ttl: Duration,
    capacity: usize,
    enabled: bool,
    generation: Arc<AtomicU64>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
}

impl OverrideCache {
    /// Create a cache holding up to [`DEFAULT_CACHE_CAPACITY`] lookups for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a cache holding up to `capacity` lookups for `ttl`.
    ///
    /// A zero TTL or zero capacity disables caching.
    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            capacity,
            enabled: !ttl.is_zero() && capacity > 0,
            generation: Arc::new(AtomicU64::new(0)),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a cache that never holds anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Check if lookups are cached at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Maximum number of entries held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current eviction generation.
    ///
    /// Read this before querying the store and pass it to
    /// [`put_if_current`](Self::put_if_current).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Look up a cached result.
    ///
    /// # Returns
    ///
    /// `None` on a miss, `Some(None)` when "no override" is cached
    pub async fn get(
        &self,
        user_id: Uuid,
        permission: &str,
    ) -> Option<Option<UserPermissionOverride>> {
        if !self.enabled {
            return None;
        }

        let key = (user_id, permission.to_string());
        let now = Instant::now();

        let expired = {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.expires_at > now => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            self.entries.write().await.remove(&key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a lookup result.
    pub async fn put(
        &self,
        user_id: Uuid,
        permission: &str,
        value: Option<UserPermissionOverride>,
    ) {
        if !self.enabled {
            return;
        }

        let mut entries = self.entries.write().await;
        self.insert_locked(&mut entries, user_id, permission, value);
    }

    /// Store a lookup result read at `generation`.
    ///
    /// # Returns
    ///
    /// `false` if an eviction happened since `generation` was read, in which
    /// case nothing is stored
    pub async fn put_if_current(
        &self,
        user_id: Uuid,
        permission: &str,
        value: Option<UserPermissionOverride>,
        generation: u64,
    ) -> bool {
        if !self.enabled {
            return false;
        }

        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        self.insert_locked(&mut entries, user_id, permission, value);
        true
    }

    fn insert_locked(
        &self,
        entries: &mut HashMap<(Uuid, String), CachedLookup>,
        user_id: Uuid,
        permission: &str,
        value: Option<UserPermissionOverride>,
    ) {
        let key = (user_id, permission.to_string());
        let now = Instant::now();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let before = entries.len();
            entries.retain(|_, entry| entry.expires_at > now);
            let mut dropped = before - entries.len();

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    dropped += 1;
                }
            }
            self.evictions.fetch_add(dropped as u64, Ordering::Relaxed);
        }

        entries.insert(
            key,
            CachedLookup {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Evict one user's lookup for one permission.
    pub async fn invalidate(&self, user_id: Uuid, permission: &str) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.remove(&(user_id, permission.to_string()));
    }

    /// Evict every lookup for a user.
    pub async fn invalidate_user(&self, user_id: Uuid) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.retain(|(owner, _), _| *owner != user_id);
    }

    /// Evict everything.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    /// Drop expired entries.
    ///
    /// # Returns
    ///
    /// Number of entries removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.read().await.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
