//! # Profile Cache
//!
//! In-memory cache of identity provider profiles keyed by access token.
//!
//! Entries carry their insertion time and are valid for a fixed TTL. Expiry is
//! checked lazily when an entry is read; there is no background sweep. An
//! optional entry bound purges expired entries and then evicts the oldest
//! insertion when the cache is full.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::core::config::ProfileCacheConfig;
use crate::core::types::{token_fingerprint, Profile};

/// Millisecond clock used to stamp and age cache entries
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Clock that only moves when told to. Shared handles see the same time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_millis)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A cached profile and the time it was stored
#[derive(Debug, Clone)]
pub struct CachedProfile {
    pub profile: Profile,
    pub inserted_at: u64,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evictions: u64,
}

/// Token -> profile cache with lazy TTL expiry
pub struct ProfileCache {
    entries: DashMap<String, CachedProfile>,
    ttl_millis: u64,
    max_entries: Option<usize>,
    clock: Arc<dyn Clock>,

    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evictions: AtomicU64,
}

impl ProfileCache {
    pub fn new(config: &ProfileCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_millis: config.ttl.as_millis() as u64,
            max_entries: config.max_entries,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// 100 minute TTL, unbounded, wall clock
    pub fn with_defaults() -> Self {
        Self::new(&ProfileCacheConfig::default(), Arc::new(SystemClock))
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_millis)
    }

    fn is_expired(&self, entry: &CachedProfile, now: u64) -> bool {
        now.saturating_sub(entry.inserted_at) >= self.ttl_millis
    }

    /// Look up a live profile. An expired entry is removed and reported as a miss.
    pub fn get(&self, token: &str) -> Option<Profile> {
        let now = self.clock.now_millis();

        if let Some(entry) = self.entries.get(token) {
            if !self.is_expired(&entry, now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("profile_cache_hits_total").increment(1);
                return Some(entry.profile.clone());
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("profile_cache_misses_total").increment(1);
            return None;
        }

        // Only drop the entry if it is still the stale one we just saw
        if self
            .entries
            .remove_if(token, |_, entry| self.is_expired(entry, now))
            .is_some()
        {
            self.expired.fetch_add(1, Ordering::Relaxed);
            debug!(token = %token_fingerprint(token), "Dropped expired profile");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("profile_cache_misses_total").increment(1);
        None
    }

    /// Store a profile stamped with the current time, replacing any previous entry
    pub fn insert(&self, token: &str, profile: Profile) {
        let now = self.clock.now_millis();

        if !self.entries.contains_key(token) {
            self.make_room(now);
        }

        self.entries.insert(
            token.to_string(),
            CachedProfile {
                profile,
                inserted_at: now,
            },
        );
    }

    /// Whether a live entry exists, without touching statistics
    pub fn contains(&self, token: &str) -> bool {
        let now = self.clock.now_millis();
        self.entries
            .get(token)
            .map(|entry| !self.is_expired(&entry, now))
            .unwrap_or(false)
    }

    /// Raw entry, including its insertion time. Expired entries are returned as-is.
    pub fn entry(&self, token: &str) -> Option<CachedProfile> {
        self.entries.get(token).map(|entry| entry.clone())
    }

    pub fn remove(&self, token: &str) -> bool {
        self.entries.remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        info!("Cleared {} cached profiles", count);
    }

    pub fn stats(&self) -> ProfileCacheStats {
        ProfileCacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn make_room(&self, now: u64) {
        let Some(max_entries) = self.max_entries else {
            return;
        };

        if self.entries.len() < max_entries {
            return;
        }

        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            self.expired.fetch_add(purged as u64, Ordering::Relaxed);
        }

        while self.entries.len() >= max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted_at)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        debug!(purged, "Made room in profile cache");
    }
}
