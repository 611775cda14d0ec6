//! Fan-out of source fetches through the cache.
//!
//! Each source fetch consults the [`TieredCache`] first, calls its adapter on
//! a miss (or when the entry is stale), and writes the result back. Fetches
//! run as tokio tasks capped by a semaphore; `fetch_many` gathers them with
//! a bounded wait and merges the results newest first.

pub mod tracker;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::adapters::{FetchContext, Query, Registry, SourceAdapter};
use crate::app::{Result, TrendError};
use crate::cache::{CacheHit, TieredCache};
use crate::config::Config;
use crate::domain::{recency_order, NormalizedItem, Source, Volatility};
use crate::fetcher::Transport;

pub use tracker::{RequestTracker, Ticket};

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Items for one source together with when and how they were obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSnapshot {
    pub source_id: String,
    pub key: String,
    pub items: Vec<NormalizedItem>,
    pub fetched_at: DateTime<Utc>,
    pub freshness: Freshness,
}

impl SourceSnapshot {
    fn from_hit(source_id: &str, key: &str, hit: CacheHit) -> Self {
        Self {
            source_id: source_id.to_string(),
            key: key.to_string(),
            items: hit.items,
            fetched_at: hit.fetched_at,
            freshness: if hit.is_fresh {
                Freshness::Fresh
            } else {
                Freshness::Stale
            },
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub workers: usize,
    pub collect_timeout: Duration,
    pub hot_list_ttl: Duration,
    pub feed_ttl: Duration,
    pub serve_stale_while_refreshing: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
            hot_list_ttl: Duration::from_secs(900),
            feed_ttl: Duration::from_secs(1800),
            serve_stale_while_refreshing: false,
        }
    }
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.orchestrator.workers.max(1),
            collect_timeout: Duration::from_secs(config.orchestrator.collect_timeout_secs),
            hot_list_ttl: Duration::from_secs(config.cache.hot_list_ttl_secs),
            feed_ttl: Duration::from_secs(config.cache.feed_ttl_secs),
            serve_stale_while_refreshing: config.orchestrator.serve_stale_while_refreshing,
        }
    }

    pub fn ttl_for(&self, source: &Source) -> Duration {
        match source.volatility() {
            Volatility::HotList => self.hot_list_ttl,
            Volatility::Feed => self.feed_ttl,
        }
    }
}

struct Inner {
    registry: Registry,
    transport: Transport,
    cache: Arc<TieredCache>,
    tracker: RequestTracker,
    semaphore: Semaphore,
    settings: Settings,
}

/// Cheap to clone; clones share the cache, tracker and worker cap.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        registry: Registry,
        transport: Transport,
        cache: Arc<TieredCache>,
        settings: Settings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                transport,
                cache,
                tracker: RequestTracker::new(),
                semaphore: Semaphore::new(settings.workers.max(1)),
                settings,
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn cache(&self) -> &TieredCache {
        &self.inner.cache
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    fn adapter(&self, source_id: &str) -> Result<Arc<dyn SourceAdapter>> {
        self.inner
            .registry
            .get(source_id)
            .ok_or_else(|| TrendError::SourceNotFound(source_id.to_string()))
    }

    /// Items for one source, from cache when fresh. Upstream failures fall
    /// back to stale cached items when there are any.
    pub async fn fetch_one(&self, source_id: &str) -> Result<Vec<NormalizedItem>> {
        Ok(self.fetch_one_snapshot(source_id).await?.items)
    }

    pub async fn fetch_one_snapshot(&self, source_id: &str) -> Result<SourceSnapshot> {
        self.resolve(source_id, &Query::new(), false).await
    }

    /// Like [`fetch_one_snapshot`](Self::fetch_one_snapshot) for a
    /// parameterised source. Each distinct query is cached separately.
    pub async fn fetch_query(&self, source_id: &str, query: &Query) -> Result<SourceSnapshot> {
        self.resolve(source_id, query, false).await
    }

    /// Skip the freshness check and go to the upstream.
    pub async fn refresh_one(&self, source_id: &str) -> Result<SourceSnapshot> {
        self.resolve(source_id, &Query::new(), true).await
    }

    pub async fn refresh_query(&self, source_id: &str, query: &Query) -> Result<SourceSnapshot> {
        self.resolve(source_id, query, true).await
    }

    async fn resolve(&self, source_id: &str, query: &Query, force: bool) -> Result<SourceSnapshot> {
        let adapter = self.adapter(source_id)?;
        let key = query.cache_key(source_id);
        let cached = self.inner.cache.get(&key);

        if !force {
            if let Some(hit) = &cached {
                if hit.is_fresh {
                    tracing::debug!(source = %source_id, key = %key, "serving fresh cache");
                    return Ok(SourceSnapshot::from_hit(source_id, &key, hit.clone()));
                }
                if self.inner.settings.serve_stale_while_refreshing {
                    tracing::debug!(source = %source_id, key = %key, "serving stale, refreshing in background");
                    self.spawn_refresh(adapter, key.clone(), query.clone());
                    return Ok(SourceSnapshot::from_hit(source_id, &key, hit.clone()));
                }
            }
        }

        match self.refresh(adapter.as_ref(), &key, query).await {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => match cached {
                Some(hit) => {
                    tracing::warn!(source = %source_id, key = %key, error = %err, "upstream failed, serving cached items");
                    Ok(SourceSnapshot::from_hit(source_id, &key, hit))
                }
                None => Err(err),
            },
        }
    }

    fn spawn_refresh(&self, adapter: Arc<dyn SourceAdapter>, key: String, query: Query) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.refresh(adapter.as_ref(), &key, &query).await {
                tracing::warn!(key = %key, error = %e, "background refresh failed");
            }
        });
    }

    /// Call the adapter and write the result back, unless a newer fetch of
    /// the same key started in the meantime.
    async fn refresh(
        &self,
        adapter: &dyn SourceAdapter,
        key: &str,
        query: &Query,
    ) -> Result<SourceSnapshot> {
        let source = adapter.descriptor();
        let ticket = self.inner.tracker.begin(key);
        let _permit = self.inner.semaphore.acquire().await.ok();

        let now = self.inner.cache.now();
        let cx = FetchContext::new(&self.inner.transport, query, now);
        let items = match adapter.fetch(&cx).await {
            Ok(items) => items,
            Err(e) => {
                self.inner.tracker.release(&ticket);
                return Err(e.for_source(&source.id));
            }
        };

        let ttl = self.inner.settings.ttl_for(source);
        let written = self
            .inner
            .tracker
            .commit(&ticket, || self.inner.cache.put(key, items.clone(), ttl));
        match written {
            Some(Ok(_)) => {
                tracing::info!(source = %source.id, key = %key, count = items.len(), "refreshed");
            }
            Some(Err(e)) => {
                tracing::warn!(source = %source.id, key = %key, error = %e, "cache write failed");
            }
            None => {
                tracing::debug!(source = %source.id, key = %key, "superseded by a newer fetch, not cached");
            }
        }

        Ok(SourceSnapshot {
            source_id: source.id.clone(),
            key: key.to_string(),
            items,
            fetched_at: now,
            freshness: Freshness::Fresh,
        })
    }

    /// Fetch every source concurrently and merge newest first. Never fails:
    /// a source that errors contributes nothing and is logged. Sources that
    /// have not finished when the collect timeout elapses are abandoned.
    ///
    /// Dropping the returned future aborts the in-flight fetches.
    pub async fn fetch_many<S: AsRef<str>>(&self, source_ids: &[S]) -> Vec<NormalizedItem> {
        let mut seen = std::collections::HashSet::new();
        let mut tasks = JoinSet::new();
        for id in source_ids.iter().map(AsRef::as_ref) {
            if !seen.insert(id.to_string()) {
                continue;
            }
            let this = self.clone();
            let id = id.to_string();
            tasks.spawn(async move {
                let result = this.fetch_one(&id).await;
                (id, result)
            });
        }

        let mut merged = Vec::new();
        let collected = tokio::time::timeout(self.inner.settings.collect_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((id, Ok(items))) => {
                        tracing::debug!(source = %id, count = items.len(), "source collected");
                        merged.extend(items);
                    }
                    Ok((id, Err(e))) => {
                        tracing::warn!(source = %id, error = %e, "source failed, contributing no items");
                    }
                    Err(e) => {
                        tracing::error!("Task join error: {}", e);
                    }
                }
            }
        })
        .await;

        if collected.is_err() {
            tracing::warn!(pending = tasks.len(), "collect timeout elapsed, abandoning slow sources");
            tasks.abort_all();
        }

        merged.sort_by(recency_order);
        merged
    }

    /// Every registered source.
    pub async fn fetch_all(&self) -> Vec<NormalizedItem> {
        let ids = self.inner.registry.ids();
        self.fetch_many(&ids).await
    }

    /// Drop one cache entry. A fetch of `key` already in flight will not
    /// write its result back.
    pub fn invalidate_cache(&self, key: &str) -> Result<bool> {
        self.inner.tracker.forget(key);
        self.inner.cache.invalidate(key)
    }

    pub fn clear_cache(&self) -> Result<usize> {
        self.inner.tracker.clear();
        self.inner.cache.clear_all()
    }

    pub fn clear_expired(&self) -> Result<usize> {
        self.inner.cache.clear_expired()
    }
}
