//! Application configuration.
//!
//! Loaded from `~/.stash-rule/config.toml` (or an explicit path). A missing
//! file means defaults; a malformed one is an error. `STASH_RULE_DB_PATH` and
//! `SUBSCRIBE_URLS` override the file after loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::subscription::{DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};

const APP_DIR: &str = ".stash-rule";
const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "stash-rule.db";

pub const ENV_DB_PATH: &str = "STASH_RULE_DB_PATH";
pub const ENV_SUBSCRIBE_URLS: &str = "SUBSCRIBE_URLS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database holding the cache, sources and profiles.
    pub db_path: PathBuf,
    pub refresh: RefreshConfig,
    /// Seed list written to the store on startup when it holds no sources.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_hours: u64,
    pub tick_secs: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub max_concurrent_fetches: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_hours: 24,
            tick_secs: 3600,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrent_fetches: 8,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: app_dir().join(DB_FILE),
            refresh: RefreshConfig::default(),
            sources: Vec::new(),
        }
    }
}

/// `~/.stash-rule`, or `./.stash-rule` when no home directory is known.
pub fn app_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        app_dir().join(CONFIG_FILE)
    }

    /// Load, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_toml(&content)
                .with_context(|| format!("invalid config file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read config {}", path.display()))
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse TOML")
    }

    /// Apply overrides from `lookup` (the process environment in
    /// production).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db_path) = lookup(ENV_DB_PATH).filter(|v| !v.trim().is_empty()) {
            self.db_path = PathBuf::from(db_path.trim());
        }
        if let Some(urls) = lookup(ENV_SUBSCRIBE_URLS) {
            self.sources = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<()> {
        let refresh = &self.refresh;
        if refresh.interval_hours == 0 {
            bail!("refresh.interval_hours must be at least 1");
        }
        if refresh.tick_secs == 0 {
            bail!("refresh.tick_secs must be at least 1");
        }
        if refresh.tick() >= refresh.interval() {
            bail!(
                "refresh.tick_secs ({}) must be shorter than refresh.interval_hours ({}h)",
                refresh.tick_secs,
                refresh.interval_hours
            );
        }
        if refresh.max_concurrent_fetches == 0 {
            bail!("refresh.max_concurrent_fetches must be at least 1");
        }
        if refresh.fetch_timeout_secs == 0 {
            bail!("refresh.fetch_timeout_secs must be at least 1");
        }
        if refresh.user_agent.trim().is_empty() {
            bail!("refresh.user_agent must not be empty");
        }
        Ok(())
    }
}
