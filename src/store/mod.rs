//! Persistence interfaces.
//!
//! The refresh engine, scheduler and profile layer only see these traits;
//! [`sqlite::SqliteStore`] is the implementation the binary wires in. Store
//! failures are always hard errors. "Not found" is `Ok(None)` (or `0` for
//! the last-run timestamp), never an error.

pub mod sqlite;

use serde::Serialize;

use crate::subscription::ProxyNode;

pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to (de)serialize cached nodes: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("failed to prepare store location: {0}")]
    Io(#[from] std::io::Error),
    #[error("store key must not be empty")]
    EmptyKey,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Snapshot of one source's last successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub nodes: Vec<ProxyNode>,
    /// Unix seconds of the batch that produced `nodes`.
    pub updated_at: i64,
}

/// Per-source line of a cache status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub url: String,
    pub count: usize,
    pub updated_at: i64,
}

/// Cache status report. Serialized as-is for external consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub last_run_at: i64,
    pub statuses: Vec<SourceStatus>,
}

/// A subscriber and the profile their config requests are rendered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscriber {
    pub username: String,
    pub profile_name: String,
}

/// Per-source node snapshots plus the last full-refresh timestamp.
pub trait CacheStore: Send + Sync {
    fn get_entry(&self, url: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Write nodes and timestamp together; readers never see one without
    /// the other.
    fn put_entry(&self, url: &str, entry: &CacheEntry) -> Result<(), StoreError>;

    /// Unix seconds of the last full refresh, `0` if none has run.
    fn last_run_at(&self) -> Result<i64, StoreError>;

    fn set_last_run_at(&self, at: i64) -> Result<(), StoreError>;
}

/// Administrator-maintained subscription list.
pub trait SourceStore: Send + Sync {
    fn configured_sources(&self) -> Result<Vec<String>, StoreError>;

    /// Replace the whole list. Blank entries are dropped, order is kept.
    fn save_sources(&self, urls: &[String]) -> Result<(), StoreError>;
}

/// Raw profile documents keyed by name. Validation lives in
/// [`crate::profile`].
pub trait ProfileStore: Send + Sync {
    fn get_profile(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite.
    fn put_profile(&self, name: &str, content: &str) -> Result<(), StoreError>;

    /// Insert only if absent. Returns `false` when the name is taken.
    fn insert_profile(&self, name: &str, content: &str) -> Result<bool, StoreError>;

    fn profile_names(&self) -> Result<Vec<String>, StoreError>;
}

/// Subscriber → profile bindings. Validation lives in
/// [`crate::subscriber`].
pub trait SubscriberStore: Send + Sync {
    /// Bound profile name, `None` for an unknown subscriber.
    fn subscriber_profile(&self, username: &str) -> Result<Option<String>, StoreError>;

    /// Insert only if absent. Returns `false` when the username is taken.
    fn insert_subscriber(&self, username: &str, profile: &str) -> Result<bool, StoreError>;

    /// Rebind an existing subscriber. Returns `false` when it does not exist.
    fn set_subscriber_profile(&self, username: &str, profile: &str) -> Result<bool, StoreError>;

    /// Returns `false` when the subscriber did not exist.
    fn delete_subscriber(&self, username: &str) -> Result<bool, StoreError>;

    /// All subscribers ordered by username.
    fn subscribers(&self) -> Result<Vec<Subscriber>, StoreError>;
}
