//! Subscription decoding: proxy URIs, subscription bodies, remote fetch.

pub mod decoder;
pub mod fetcher;
pub mod node;
pub mod parser;

pub use decoder::decode;
pub use fetcher::{FetchError, SubscriptionFetcher, DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};
pub use node::{NodeType, ProxyNode};
pub use parser::SubscriptionParser;
