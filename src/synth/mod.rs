//! Client configuration synthesis: region groups, base document, overlays.

pub mod document;
pub mod groups;
pub mod merge;
pub mod region;

pub use document::{build_base, build_document, render_yaml, ConfigDocument};
pub use groups::{build_proxy_groups, GroupKind, ProxyGroup};
pub use merge::{deep_merge, merge_all};
pub use region::{classify, Region};
