//! Subscription body parsing.
//!
//! A fetched subscription is one of three shapes:
//!
//! ```text
//! proxies: [ {name, type, ...}, ... ]   structured YAML, kept verbatim
//! dm1lc3M6Ly8uLi4KdHJvamFuOi8v...       base64-wrapped URI list
//! vmess://...\ntrojan://...             plain URI list
//! ```
//!
//! The structured form wins when it yields at least one entry; otherwise the
//! body is unwrapped from base64 when possible and decoded line by line.

use serde::Deserialize;
use serde_json::Value;

use super::decoder;
use super::node::ProxyNode;

#[derive(Deserialize)]
struct StructuredSubscription {
    #[serde(default)]
    proxies: Vec<Value>,
}

/// Stateless subscription parser.
pub struct SubscriptionParser;

impl SubscriptionParser {
    /// Parse a raw subscription body into nodes, in source order.
    ///
    /// Never fails: unrecognized or malformed lines are dropped, and an
    /// unusable body simply yields no nodes.
    pub fn parse(raw: &str) -> Vec<ProxyNode> {
        let content = raw.trim();
        if content.is_empty() {
            return Vec::new();
        }

        let structured = Self::parse_structured(content);
        if !structured.is_empty() {
            return structured;
        }

        let unwrapped = decoder::decode_base64(content).and_then(|bytes| String::from_utf8(bytes).ok());
        let text = unwrapped.as_deref().unwrap_or(content);
        Self::parse_lines(text)
    }

    /// Pre-shaped `proxies:` entries. Non-mapping entries are skipped.
    fn parse_structured(content: &str) -> Vec<ProxyNode> {
        let Ok(doc) = serde_yaml::from_str::<StructuredSubscription>(content) else {
            return Vec::new();
        };
        doc.proxies
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(map) => Some(ProxyNode::Verbatim(map)),
                _ => None,
            })
            .collect()
    }

    fn parse_lines(text: &str) -> Vec<ProxyNode> {
        let mut nodes = Vec::new();
        let mut dropped = 0usize;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match decoder::decode(line) {
                Some(node) => nodes.push(node),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::debug!(kept = nodes.len(), dropped, "dropped unrecognized subscription lines");
        }
        nodes
    }
}
