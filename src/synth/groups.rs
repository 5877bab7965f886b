//! Selector groups for the generated document.
//!
//! Fixed order: umbrella selector, latency auto-selector, one group per
//! region, the per-service catalog, then the catch-all.

use serde_json::{Map, Value};

use super::region::Region;
use crate::subscription::ProxyNode;

pub const UMBRELLA_GROUP: &str = "Proxies";
pub const AUTO_GROUP: &str = "自动选择";
pub const FALLBACK_GROUP: &str = "Final";
pub const DIRECT: &str = "DIRECT";

const PROBE_URL: &str = "http://www.gstatic.com/generate_204";
const PROBE_INTERVAL_SECS: u32 = 300;
const PROBE_TOLERANCE_MS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Select,
    UrlTest,
}

impl GroupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::UrlTest => "url-test",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyGroup {
    pub name: String,
    pub kind: GroupKind,
    pub proxies: Vec<String>,
}

impl ProxyGroup {
    fn select(name: &str, proxies: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            kind: GroupKind::Select,
            proxies,
        }
    }

    fn url_test(name: &str, proxies: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            kind: GroupKind::UrlTest,
            proxies,
        }
    }

    /// `proxy-groups:` entry. Latency groups carry the probe settings.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), Value::from(self.name.as_str()));
        map.insert("type".into(), Value::from(self.kind.as_str()));
        map.insert(
            "proxies".into(),
            Value::Array(self.proxies.iter().map(|p| Value::from(p.as_str())).collect()),
        );
        if self.kind == GroupKind::UrlTest {
            map.insert("url".into(), Value::from(PROBE_URL));
            map.insert("interval".into(), Value::from(PROBE_INTERVAL_SECS));
            map.insert("tolerance".into(), Value::from(PROBE_TOLERANCE_MS));
        }
        Value::Object(map)
    }
}

/// Member of a service group.
#[derive(Clone, Copy)]
enum Member {
    Umbrella,
    Direct,
    Region(Region),
}

impl Member {
    fn name(self) -> &'static str {
        match self {
            Self::Umbrella => UMBRELLA_GROUP,
            Self::Direct => DIRECT,
            Self::Region(region) => region.group_name(),
        }
    }
}

const HK: Member = Member::Region(Region::HongKong);
const TW: Member = Member::Region(Region::Taiwan);
const JP: Member = Member::Region(Region::Japan);
const SG: Member = Member::Region(Region::Singapore);
const US: Member = Member::Region(Region::UnitedStates);

const PROXIED: &[Member] = &[Member::Umbrella, HK, JP, SG, TW, US];
const PROXIED_OR_DIRECT: &[Member] = &[Member::Umbrella, Member::Direct, HK, JP, SG, TW, US];

const SERVICE_GROUPS: &[(&str, &[Member])] = &[
    ("YouTube", PROXIED),
    ("Disney", PROXIED),
    ("Hbomax", PROXIED),
    ("Netflix", PROXIED),
    ("Bahamut", &[Member::Umbrella, HK, TW]),
    ("Bilibili", &[Member::Direct, HK, TW]),
    ("Spotify", PROXIED_OR_DIRECT),
    ("Steam", PROXIED_OR_DIRECT),
    ("Telegram", PROXIED),
    ("Google", PROXIED),
    ("Microsoft", PROXIED_OR_DIRECT),
    ("OpenAI", PROXIED),
    ("PayPal", PROXIED_OR_DIRECT),
    ("Apple", PROXIED_OR_DIRECT),
];

/// Build every group for the given nodes. Nodes without a name are left
/// out of all groups.
pub fn build_proxy_groups(nodes: &[ProxyNode]) -> Vec<ProxyGroup> {
    let names: Vec<String> = nodes
        .iter()
        .filter_map(ProxyNode::name)
        .map(str::to_string)
        .collect();

    let mut groups = Vec::with_capacity(3 + Region::ALL.len() + SERVICE_GROUPS.len());

    let mut umbrella: Vec<String> = std::iter::once(AUTO_GROUP)
        .chain(Region::ALL.iter().map(|r| r.group_name()))
        .chain(std::iter::once(DIRECT))
        .map(str::to_string)
        .collect();
    umbrella.extend(names.iter().cloned());
    groups.push(ProxyGroup::select(UMBRELLA_GROUP, umbrella));

    groups.push(ProxyGroup::url_test(AUTO_GROUP, names.clone()));

    for region in Region::ALL {
        let members: Vec<String> = names.iter().filter(|n| region.matches(n)).cloned().collect();
        let group = if members.is_empty() {
            ProxyGroup::select(region.group_name(), vec![AUTO_GROUP.into(), DIRECT.into()])
        } else {
            ProxyGroup::url_test(region.group_name(), members)
        };
        groups.push(group);
    }

    for (name, members) in SERVICE_GROUPS {
        let proxies = members.iter().map(|m| m.name().to_string()).collect();
        groups.push(ProxyGroup::select(name, proxies));
    }

    groups.push(ProxyGroup::select(
        FALLBACK_GROUP,
        vec![UMBRELLA_GROUP.into(), DIRECT.into()],
    ));

    groups
}
