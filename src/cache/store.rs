use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use dashmap::DashMap;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::infra::upstream::{UpstreamError, UpstreamSource, decode_object};

use super::config::{CacheConfig, MAX_TTL};

/// Where a cached read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Hit,
    Miss,
}

impl CacheSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheSource::Hit => "hit",
            CacheSource::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }

    /// Percentage of lookups served from memory; zero when nothing was read.
    pub fn hit_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.hits as f64 * 100.0 / total as f64,
        }
    }
}

/// Outcome of one maintenance sweep. `stats` covers the window since the
/// previous sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepReport {
    pub removed: usize,
    pub retained: usize,
    pub stats: CacheStats,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: Bytes,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

pub struct ResponseCache {
    source: Arc<dyn UpstreamSource>,
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(source: Arc<dyn UpstreamSource>, config: &CacheConfig) -> Self {
        Self {
            source,
            entries: DashMap::new(),
            ttl: config.ttl.min(MAX_TTL),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the body for `path`, fetching from the upstream on a miss.
    /// Upstream errors are returned as-is and never cached.
    pub async fn get(&self, path: &str) -> Result<(Bytes, CacheSource), UpstreamError> {
        let key = self.source.url_for(path);

        if let Some(body) = self.live_body(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!("shelfwise_cache_hit_total").increment(1);
            return Ok((body, CacheSource::Hit));
        }

        let body = self.source.fetch_raw(path).await?;
        self.entries.insert(
            key,
            CacheEntry {
                body: body.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("shelfwise_cache_miss_total").increment(1);
        Ok((body, CacheSource::Miss))
    }

    /// Cached read decoded as a JSON object. A body that fails to decode is
    /// dropped from the cache.
    pub async fn get_object(
        &self,
        path: &str,
    ) -> Result<(Map<String, Value>, CacheSource), UpstreamError> {
        let (body, source) = self.get(path).await?;
        let url = self.source.url_for(path);
        match decode_object(&url, &body) {
            Ok(map) => Ok((map, source)),
            Err(err) => {
                self.entries.remove(&url);
                Err(err)
            }
        }
    }

    /// Cached read decoded into a typed upstream document.
    pub async fn get_json<T>(&self, path: &str) -> Result<(T, CacheSource), UpstreamError>
    where
        T: DeserializeOwned,
    {
        let (map, source) = self.get_object(path).await?;
        match serde_json::from_value(Value::Object(map)) {
            Ok(value) => Ok((value, source)),
            Err(err) => {
                let url = self.source.url_for(path);
                self.entries.remove(&url);
                Err(UpstreamError::decode(url, err.to_string()))
            }
        }
    }

    pub fn invalidate(&self, path: &str) -> bool {
        self.entries.remove(&self.source.url_for(path)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters accumulated since the last sweep.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drops expired entries shard by shard, then swaps the counters to zero.
    pub fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let retained = self.entries.len();
        let removed = before.saturating_sub(retained);
        if removed > 0 {
            counter!("shelfwise_cache_evict_total").increment(removed as u64);
        }

        let stats = CacheStats {
            hits: self.hits.swap(0, Ordering::Relaxed),
            misses: self.misses.swap(0, Ordering::Relaxed),
        };

        SweepReport {
            removed,
            retained,
            stats,
        }
    }

    fn live_body(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Some(entry.body.clone()),
            Some(_) => {}
            None => return None,
        }

        if self
            .entries
            .remove_if(key, |_, entry| !entry.is_live(now))
            .is_some()
        {
            counter!("shelfwise_cache_evict_total").increment(1);
            debug!(
                target = "shelfwise::cache::store",
                key,
                "Dropped expired cache entry on lookup"
            );
        }
        None
    }
}
