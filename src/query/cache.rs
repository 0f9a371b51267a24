use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::query::{QueryError, QueryParams, QueryResult, QueryStore};

/// Source of "now" for expiry decisions, injected so tests can move time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    sql: String,
    params: String,
}

impl CacheKey {
    fn new(sql: &str, params: &QueryParams) -> Self {
        Self {
            sql: sql.to_string(),
            params: params.canonical_key(),
        }
    }
}

struct CacheEntry {
    value: Arc<QueryResult>,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Memoizes query results per exact `(sql, params)` for a fixed window.
///
/// Stale entries are not evicted proactively; the next access recomputes
/// synchronously and replaces them. Two callers missing on the same key at
/// once may both hit the store; the last write wins and values are never
/// mutated after insertion. Failed queries are not cached.
pub struct QueryCache {
    inner: Arc<dyn QueryStore>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    pub fn new(inner: Arc<dyn QueryStore>, ttl: Duration) -> Self {
        Self::with_clock(inner, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(inner: Arc<dyn QueryStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get_or_compute(&self, sql: &str, params: &QueryParams) -> Result<Arc<QueryResult>, QueryError> {
        let key = CacheKey::new(sql, params);
        let now = self.clock.now();

        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(&key) {
                if now < entry.expires_at {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Arc::clone(&entry.value));
                }
                debug!("Cache entry expired, refreshing");
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = Arc::new(self.inner.fetch(sql, params)?);

        let expires_at = self.clock.now() + self.ttl;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            CacheEntry {
                value: Arc::clone(&value),
                expires_at,
            },
        );

        Ok(value)
    }

    /// Drops every entry, fresh or stale.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner).len();
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
