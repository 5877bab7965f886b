//! Base document generation and YAML rendering.

use serde_json::{json, Map, Value};

use super::groups::build_proxy_groups;
use super::merge::merge_all;
use crate::subscription::ProxyNode;

/// Synthesized client configuration. Key order is preserved when rendered.
pub type ConfigDocument = Map<String, Value>;

pub const MIXED_PORT: u16 = 7890;
pub const EXTERNAL_CONTROLLER: &str = "0.0.0.0:9090";

// ── Fixed sections ──────────────────────────────────────────────

fn general_section() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("mixed-port".into(), json!(MIXED_PORT));
    map.insert("allow-lan".into(), json!(true));
    map.insert("bind-address".into(), json!("*"));
    map.insert("mode".into(), json!("rule"));
    map.insert("log-level".into(), json!("info"));
    map.insert("ipv6".into(), json!(false));
    map.insert("external-controller".into(), json!(EXTERNAL_CONTROLLER));
    map
}

fn dns_section() -> Value {
    json!({
        "enable": true,
        "ipv6": false,
        "listen": "0.0.0.0:53",
        "default-nameserver": ["223.5.5.5", "119.29.29.29"],
        "enhanced-mode": "fake-ip",
        "fake-ip-range": "198.18.0.1/16",
        "fake-ip-filter": [
            "*.lan",
            "*.local",
            "*.crashlytics.com",
            "localhost.ptlogin2.qq.com",
            "+.srv.nintendo.net",
            "+.stun.playstation.net",
            "xbox.*.microsoft.com",
            "+.xboxlive.com",
            "+.msftconnecttest.com",
            "+.msftncsi.com"
        ],
        "nameserver": ["https://doh.pub/dns-query", "https://dns.alidns.com/dns-query"],
        "fallback": ["https://1.1.1.1/dns-query", "https://dns.google/dns-query"],
        "fallback-filter": {
            "geoip": true,
            "geoip-code": "CN",
            "ipcidr": ["240.0.0.0/4", "0.0.0.0/32"]
        }
    })
}

/// The generated base routes nothing itself; rules come from overlays,
/// whose sequences are prepended to this one.
fn rules() -> Vec<Value> {
    Vec::new()
}

// ── Assembly ────────────────────────────────────────────────────

/// Base document for the given nodes.
pub fn build_base(nodes: &[ProxyNode]) -> ConfigDocument {
    let mut doc = general_section();
    doc.insert("dns".into(), dns_section());
    doc.insert(
        "proxies".into(),
        Value::Array(nodes.iter().map(ProxyNode::to_value).collect()),
    );
    doc.insert(
        "proxy-groups".into(),
        Value::Array(build_proxy_groups(nodes).iter().map(|g| g.to_value()).collect()),
    );
    doc.insert("rules".into(), Value::Array(rules()));
    doc
}

/// Base document with overlays deep-merged on top, in order.
pub fn build_document<'a, I>(nodes: &[ProxyNode], overlays: I) -> ConfigDocument
where
    I: IntoIterator<Item = &'a Map<String, Value>>,
{
    merge_all(build_base(nodes), overlays)
}

/// Render to the client-facing YAML text.
pub fn render_yaml(doc: &ConfigDocument) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(doc)
}
