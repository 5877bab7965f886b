//! Per-source cache refresh.
//!
//! # Batch lifecycle
//!
//! ```text
//! refresh_many(urls)
//!   ├─ normalize (trim, drop blanks, dedupe, keep first-seen order)
//!   ├─ take the refresh lock (one batch at a time, process-wide)
//!   ├─ per URL, concurrently, gated by the fetch semaphore:
//!   │     fetch → parse → put_entry(nodes, refreshed_at)
//!   │     failure → item.error, existing entry untouched
//!   ├─ aggregate items in normalized URL order
//!   └─ set_last_run_at(refreshed_at), after every item settled
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};

use crate::store::{CacheEntry, CacheStatus, CacheStore, SourceStatus, StoreError};
use crate::subscription::{ProxyNode, SubscriptionFetcher};

/// Outcome for one source in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshItem {
    pub url: String,
    pub count: usize,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RefreshItem {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate outcome of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshResult {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub refreshed_at: i64,
    pub items: Vec<RefreshItem>,
}

impl RefreshResult {
    fn empty(refreshed_at: i64) -> Self {
        Self {
            total: 0,
            success: 0,
            failed: 0,
            refreshed_at,
            items: Vec::new(),
        }
    }
}

/// Trim, drop blanks and de-duplicate, keeping first-seen order.
pub fn normalize_urls<S: AsRef<str>>(urls: &[S]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(urls.len());
    urls.iter()
        .map(|u| u.as_ref().trim())
        .filter(|u| !u.is_empty())
        .filter(|u| seen.insert(*u))
        .map(str::to_string)
        .collect()
}

/// Fetches sources into the cache store.
pub struct RefreshEngine {
    cache: Arc<dyn CacheStore>,
    fetcher: SubscriptionFetcher,
    refresh_lock: Mutex<()>,
    fetch_permits: Semaphore,
}

impl RefreshEngine {
    /// `max_concurrent_fetches` bounds outbound requests within a batch;
    /// values below one are raised to one.
    pub fn new(
        cache: Arc<dyn CacheStore>,
        fetcher: SubscriptionFetcher,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            cache,
            fetcher,
            refresh_lock: Mutex::new(()),
            fetch_permits: Semaphore::new(max_concurrent_fetches.max(1)),
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Refresh every given source as one batch.
    ///
    /// Per-source failures (network, HTTP status, cache write) are recorded
    /// on their item. Only a failure to record the batch timestamp fails the
    /// whole call. An empty set returns immediately and leaves the
    /// timestamp alone.
    pub async fn refresh_many<S: AsRef<str>>(
        &self,
        urls: &[S],
    ) -> Result<RefreshResult, StoreError> {
        let _batch = self.refresh_lock.lock().await;

        let urls = normalize_urls(urls);
        let refreshed_at = chrono::Utc::now().timestamp();
        if urls.is_empty() {
            return Ok(RefreshResult::empty(refreshed_at));
        }

        let futures = urls.iter().map(|url| self.refresh_one(url, refreshed_at));
        let items = futures_util::future::join_all(futures).await;

        let success = items.iter().filter(|i| i.is_success()).count();
        let result = RefreshResult {
            total: items.len(),
            success,
            failed: items.len() - success,
            refreshed_at,
            items,
        };

        self.cache.set_last_run_at(refreshed_at)?;
        tracing::info!(
            success = result.success,
            failed = result.failed,
            total = result.total,
            "proxy cache batch finished"
        );
        Ok(result)
    }

    async fn refresh_one(&self, url: &str, refreshed_at: i64) -> RefreshItem {
        let mut item = RefreshItem {
            url: url.to_string(),
            count: 0,
            updated_at: refreshed_at,
            error: None,
        };

        let fetched = match self.fetch_permits.acquire().await {
            Ok(_permit) => self.fetcher.fetch_and_parse(url).await.map_err(|e| e.to_string()),
            Err(e) => Err(format!("fetch pool closed: {e}")),
        };

        let nodes = match fetched {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::warn!(url, error = %e, "subscription refresh failed");
                item.error = Some(e);
                return item;
            }
        };

        let count = nodes.len();
        let entry = CacheEntry {
            nodes,
            updated_at: refreshed_at,
        };
        match self.cache.put_entry(url, &entry) {
            Ok(()) => item.count = count,
            Err(e) => {
                tracing::warn!(url, error = %e, "failed to write proxy cache entry");
                item.error = Some(e.to_string());
            }
        }
        item
    }

    /// Nodes for the given sources, in source order.
    ///
    /// Sources that already have an entry are served from the cache however
    /// old it is. Sources with no entry are fetched once, synchronously; if
    /// that fails they are simply absent from the result.
    pub async fn build_from_cache<S: AsRef<str>>(
        &self,
        urls: &[S],
    ) -> Result<Vec<ProxyNode>, StoreError> {
        let urls = normalize_urls(urls);
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let mut missing = Vec::new();
        for url in &urls {
            if self.cache.get_entry(url)?.is_none() {
                missing.push(url.as_str());
            }
        }

        if !missing.is_empty() {
            tracing::info!(missing = missing.len(), "fetching sources with no cache entry");
            match self.refresh_many(&missing).await {
                Ok(result) if result.failed > 0 => {
                    tracing::warn!(failed = result.failed, "some missing sources could not be fetched");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "failed to refresh missing proxy cache"),
            }
        }

        let mut nodes = Vec::new();
        for url in &urls {
            if let Some(entry) = self.cache.get_entry(url)? {
                nodes.extend(entry.nodes);
            }
        }
        Ok(nodes)
    }

    /// Cache status for the given sources. Sources without an entry report
    /// zero nodes and a zero timestamp.
    pub fn status<S: AsRef<str>>(&self, urls: &[S]) -> Result<CacheStatus, StoreError> {
        let statuses = normalize_urls(urls)
            .into_iter()
            .map(|url| {
                let entry = self.cache.get_entry(&url)?;
                Ok(SourceStatus {
                    count: entry.as_ref().map_or(0, |e| e.nodes.len()),
                    updated_at: entry.as_ref().map_or(0, |e| e.updated_at),
                    url,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(CacheStatus {
            last_run_at: self.cache.last_run_at()?,
            statuses,
        })
    }
}
