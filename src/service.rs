//! Service facade owning the stores, refresh engine and profiles.
//!
//! One [`StashService`] is built per process and handed to whatever drives
//! it (the CLI here). Nothing in the crate relies on global state.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cache::{normalize_urls, RefreshEngine, RefreshResult, RefreshScheduler};
use crate::config::{AppConfig, RefreshConfig};
use crate::profile::{OverlayDocument, Profiles, DEFAULT_PROFILE_NAME};
use crate::store::{
    CacheStatus, CacheStore, ProfileStore, SourceStore, SqliteStore, SubscriberStore,
};
use crate::subscriber::Subscribers;
use crate::subscription::SubscriptionFetcher;
use crate::synth::{self, ConfigDocument};

/// Returned instead of a document when no sources are configured.
pub const NO_SOURCES_WARNING: &str = "# Warning: 未配置订阅链接，请使用 `stash-rule sources set` 进行配置\n";

pub struct StashService {
    engine: Arc<RefreshEngine>,
    sources: Arc<dyn SourceStore>,
    profiles: Profiles,
    subscribers: Subscribers,
    refresh: RefreshConfig,
}

impl StashService {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        sources: Arc<dyn SourceStore>,
        profiles: Arc<dyn ProfileStore>,
        subscribers: Arc<dyn SubscriberStore>,
        refresh: RefreshConfig,
    ) -> Result<Self> {
        let fetcher = SubscriptionFetcher::new(refresh.fetch_timeout(), refresh.user_agent.clone())?;
        let engine = Arc::new(RefreshEngine::new(
            cache,
            fetcher,
            refresh.max_concurrent_fetches,
        ));
        let profiles = Profiles::new(profiles);
        Ok(Self {
            engine,
            sources,
            subscribers: Subscribers::new(subscribers, profiles.clone()),
            profiles,
            refresh,
        })
    }

    /// Single SQLite store behind every interface.
    pub fn with_store(store: Arc<SqliteStore>, refresh: RefreshConfig) -> Result<Self> {
        Self::new(store.clone(), store.clone(), store.clone(), store, refresh)
    }

    /// Open the configured database and seed sources from the config when
    /// the store has none yet.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.db_path)
            .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
        let service = Self::with_store(Arc::new(store), config.refresh.clone())?;
        if service.seed_sources(&config.sources)? {
            tracing::info!(count = config.sources.len(), "seeded subscription sources from config");
        }
        Ok(service)
    }

    pub fn engine(&self) -> &Arc<RefreshEngine> {
        &self.engine
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    pub fn subscribers(&self) -> &Subscribers {
        &self.subscribers
    }

    /// Scheduler over this service's engine and sources.
    pub fn scheduler(&self) -> RefreshScheduler {
        RefreshScheduler::new(self.engine.clone(), self.sources.clone())
            .with_interval(self.refresh.interval())
            .with_tick(self.refresh.tick())
    }

    // ── Sources ─────────────────────────────────────────────────

    pub fn sources(&self) -> Result<Vec<String>> {
        Ok(self.sources.configured_sources()?)
    }

    pub fn set_sources(&self, urls: &[String]) -> Result<Vec<String>> {
        let urls = normalize_urls(urls);
        self.sources.save_sources(&urls)?;
        tracing::info!(count = urls.len(), "saved subscription sources");
        Ok(urls)
    }

    /// Write `seed` only if no sources are stored. Returns whether it wrote.
    pub fn seed_sources(&self, seed: &[String]) -> Result<bool> {
        let seed = normalize_urls(seed);
        if seed.is_empty() || !self.sources.configured_sources()?.is_empty() {
            return Ok(false);
        }
        self.sources.save_sources(&seed)?;
        Ok(true)
    }

    // ── Cache ───────────────────────────────────────────────────

    /// Manual full refresh of every configured source.
    pub async fn refresh_all(&self) -> Result<RefreshResult> {
        let urls = self.sources.configured_sources()?;
        let result = self
            .engine
            .refresh_many(&urls)
            .await
            .context("proxy cache refresh failed")?;
        Ok(result)
    }

    pub fn cache_status(&self) -> Result<CacheStatus> {
        let urls = self.sources.configured_sources()?;
        Ok(self.engine.status(&urls)?)
    }

    // ── Documents ───────────────────────────────────────────────

    /// Document for `sources` with `overlays` merged in order.
    pub async fn build_document<S: AsRef<str>>(
        &self,
        sources: &[S],
        overlays: &[OverlayDocument],
    ) -> Result<ConfigDocument> {
        let nodes = self
            .engine
            .build_from_cache(sources)
            .await
            .context("failed to load proxies from cache")?;
        Ok(synth::build_document(&nodes, overlays))
    }

    /// Overlay chain for a profile: `default`, then the profile itself.
    pub fn overlays_for(&self, profile: &str) -> Result<Vec<OverlayDocument>> {
        let profile = crate::profile::normalize_name(profile);
        let mut names = vec![DEFAULT_PROFILE_NAME];
        if profile != DEFAULT_PROFILE_NAME {
            names.push(profile);
        }
        self.profiles
            .overlay_documents(&names)
            .with_context(|| format!("failed to load stash profile {profile}"))
    }

    /// Rendered YAML for the configured sources under `profile`.
    ///
    /// Overlays are resolved before any node is read, so a broken profile
    /// fails fast without touching the cache.
    pub async fn render_config(&self, profile: &str) -> Result<String> {
        let urls = self.sources.configured_sources()?;
        if normalize_urls(&urls).is_empty() {
            return Ok(NO_SOURCES_WARNING.to_string());
        }
        let overlays = self.overlays_for(profile)?;
        tracing::info!(sources = urls.len(), "building config from proxy cache");
        let doc = self.build_document(&urls, &overlays).await?;
        Ok(synth::render_yaml(&doc)?)
    }

    /// Rendered YAML for a subscriber, using the profile they are bound to.
    /// Unknown subscribers get the `default` profile.
    pub async fn render_for_subscriber(&self, username: &str) -> Result<String> {
        let profile = self
            .subscribers
            .profile_for(username)
            .with_context(|| format!("failed to load subscriber profile for {}", username.trim()))?;
        tracing::info!(subscriber = username.trim(), profile = %profile, "rendering subscriber config");
        self.render_config(&profile).await
    }

    /// Base document for an empty node set, no overlays.
    pub fn preview_default(&self) -> Result<String> {
        Ok(synth::render_yaml(&synth::build_base(&[]))?)
    }
}
