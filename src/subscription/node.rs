//! Proxy node model.
//!
//! Every decoded subscription entry becomes a [`ProxyNode`]: one variant per
//! supported protocol plus a `Verbatim` variant for entries that arrived
//! pre-shaped in a structured (`proxies:`) subscription. All variants render
//! through [`ProxyNode::to_value`] into the flat mapping shape that Clash and
//! Stash expect under `proxies:`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol tag carried in the rendered `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    VMess,
    Trojan,
    Shadowsocks,
    ShadowsocksR,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VMess => "vmess",
            Self::Trojan => "trojan",
            Self::Shadowsocks => "ss",
            Self::ShadowsocksR => "ssr",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `ws-opts` block shared by vmess and trojan websocket transports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WsOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<WsHeaders>,
}

impl WsOpts {
    /// Build from optional `path` / `host` values. Returns `None` when both
    /// are empty so the block is omitted entirely.
    pub fn from_parts(path: Option<&str>, host: Option<&str>) -> Option<Self> {
        let path = path.filter(|p| !p.is_empty()).map(str::to_string);
        let headers = host.filter(|h| !h.is_empty()).map(|h| WsHeaders {
            host: h.to_string(),
        });
        if path.is_none() && headers.is_none() {
            return None;
        }
        Some(Self { path, headers })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsHeaders {
    #[serde(rename = "Host")]
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrpcOpts {
    #[serde(rename = "grpc-service-name")]
    pub service_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmessNode {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub uuid: String,
    #[serde(rename = "alterId")]
    pub alter_id: u32,
    pub cipher: String,
    pub udp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servername: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(rename = "ws-opts", default, skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOpts>,
    #[serde(rename = "grpc-opts", default, skip_serializing_if = "Option::is_none")]
    pub grpc_opts: Option<GrpcOpts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrojanNode {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub password: String,
    pub udp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(
        rename = "skip-cert-verify",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub skip_cert_verify: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(rename = "ws-opts", default, skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOpts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowsocksNode {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub cipher: String,
    pub password: String,
    pub udp: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowsocksRNode {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub cipher: String,
    pub password: String,
    pub protocol: String,
    pub obfs: String,
    pub udp: bool,
}

/// A single proxy endpoint.
///
/// The serde representation is the storage form used by the node cache
/// (`{"kind": ..., "node": {...}}`), which round-trips every variant exactly.
/// The client-facing shape comes from [`ProxyNode::to_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "node", rename_all = "snake_case")]
pub enum ProxyNode {
    Vmess(VmessNode),
    Trojan(TrojanNode),
    Shadowsocks(ShadowsocksNode),
    ShadowsocksR(ShadowsocksRNode),
    /// Pre-shaped entry from a structured subscription, kept as-is.
    Verbatim(Map<String, Value>),
}

impl ProxyNode {
    /// Display name. Verbatim entries may lack one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Vmess(n) => Some(&n.name),
            Self::Trojan(n) => Some(&n.name),
            Self::Shadowsocks(n) => Some(&n.name),
            Self::ShadowsocksR(n) => Some(&n.name),
            Self::Verbatim(map) => map.get("name").and_then(Value::as_str),
        }
    }

    /// Protocol tag for decoded variants; verbatim entries report their own
    /// `type` field, whatever it is.
    pub fn type_tag(&self) -> Option<&str> {
        match self {
            Self::Vmess(_) => Some(NodeType::VMess.as_str()),
            Self::Trojan(_) => Some(NodeType::Trojan.as_str()),
            Self::Shadowsocks(_) => Some(NodeType::Shadowsocks.as_str()),
            Self::ShadowsocksR(_) => Some(NodeType::ShadowsocksR.as_str()),
            Self::Verbatim(map) => map.get("type").and_then(Value::as_str),
        }
    }

    pub fn server(&self) -> Option<&str> {
        match self {
            Self::Vmess(n) => Some(&n.server),
            Self::Trojan(n) => Some(&n.server),
            Self::Shadowsocks(n) => Some(&n.server),
            Self::ShadowsocksR(n) => Some(&n.server),
            Self::Verbatim(map) => map.get("server").and_then(Value::as_str),
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Vmess(n) => Some(n.port),
            Self::Trojan(n) => Some(n.port),
            Self::Shadowsocks(n) => Some(n.port),
            Self::ShadowsocksR(n) => Some(n.port),
            Self::Verbatim(map) => map
                .get("port")
                .and_then(Value::as_u64)
                .and_then(|p| u16::try_from(p).ok()),
        }
    }

    /// Render into the flat `proxies:` entry shape: `name`, `type`, then the
    /// protocol fields in declaration order.
    pub fn to_value(&self) -> Value {
        let (tag, fields) = match self {
            Self::Verbatim(map) => return Value::Object(map.clone()),
            Self::Vmess(n) => (NodeType::VMess, serde_json::to_value(n)),
            Self::Trojan(n) => (NodeType::Trojan, serde_json::to_value(n)),
            Self::Shadowsocks(n) => (NodeType::Shadowsocks, serde_json::to_value(n)),
            Self::ShadowsocksR(n) => (NodeType::ShadowsocksR, serde_json::to_value(n)),
        };

        let mut out = Map::new();
        if let Some(name) = self.name() {
            out.insert("name".into(), Value::String(name.to_string()));
        }
        out.insert("type".into(), Value::String(tag.as_str().to_string()));
        if let Ok(Value::Object(fields)) = fields {
            for (key, value) in fields {
                if key != "name" {
                    out.insert(key, value);
                }
            }
        }
        Value::Object(out)
    }
}
