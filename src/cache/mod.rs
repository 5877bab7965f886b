//! Per-source proxy cache: batch refresh and its background scheduler.

pub mod refresh;
pub mod scheduler;

pub use refresh::{normalize_urls, RefreshEngine, RefreshItem, RefreshResult};
pub use scheduler::{RefreshScheduler, DEFAULT_REFRESH_INTERVAL, DEFAULT_TICK};
