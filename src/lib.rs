//! stash-rule: turns proxy subscription feeds into one Stash/Clash
//! configuration document.
//!
//! # Data flow
//!
//! ```text
//! RefreshScheduler / CLI
//!   → RefreshEngine ── SubscriptionFetcher → SubscriptionParser → decode()
//!   → CacheStore (per-source snapshot + last-run timestamp)
//!   → synth::build_document (regions, groups, overlay merge;
//!     overlays picked by profile or subscriber binding)
//!   → rendered YAML
//! ```

pub mod cache;
pub mod config;
pub mod profile;
pub mod service;
pub mod store;
pub mod subscriber;
pub mod subscription;
pub mod synth;

pub use config::AppConfig;
pub use service::StashService;
