//! Region classification of node names.
//!
//! A name belongs to a region when it contains one of the region's flag
//! emoji or native/English keywords, or the region's country code as a
//! standalone token. Token boundaries are the string ends and any character
//! outside `[A-Za-z0-9]`, so `US-01` is US but `BONUS-1` is not. A name may
//! match several regions.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    HongKong,
    Taiwan,
    Japan,
    Singapore,
    UnitedStates,
    Korea,
}

impl Region {
    /// Group order in the generated document.
    pub const ALL: [Region; 6] = [
        Region::HongKong,
        Region::Taiwan,
        Region::Japan,
        Region::Singapore,
        Region::UnitedStates,
        Region::Korea,
    ];

    pub fn group_name(self) -> &'static str {
        match self {
            Self::HongKong => "香港节点",
            Self::Taiwan => "台湾节点",
            Self::Japan => "日本节点",
            Self::Singapore => "新加坡节点",
            Self::UnitedStates => "美国节点",
            Self::Korea => "韩国节点",
        }
    }

    /// Lowercase substrings that mark the region.
    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::HongKong => &["🇭🇰", "香港", "hong kong"],
            Self::Taiwan => &["🇹🇼", "台湾", "taiwan"],
            Self::Japan => &["🇯🇵", "日本", "japan"],
            Self::Singapore => &["🇸🇬", "新加坡", "狮城", "坡县", "singapore"],
            Self::UnitedStates => &["🇺🇸", "美国", "united states", "america"],
            Self::Korea => &["🇰🇷", "韩国", "korea"],
        }
    }

    fn codes(self) -> &'static [&'static str] {
        match self {
            Self::HongKong => &["HK"],
            Self::Taiwan => &["TW"],
            Self::Japan => &["JP"],
            Self::Singapore => &["SG", "SGP"],
            Self::UnitedStates => &["US", "USA"],
            Self::Korea => &["KR"],
        }
    }

    pub fn matches(self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.keywords().iter().any(|k| lowered.contains(k))
            || code_patterns()
                .iter()
                .any(|(region, pattern)| *region == self && pattern.is_match(name))
    }
}

/// Code-token pattern per region, paired with the region it belongs to.
fn code_patterns() -> &'static [(Region, Regex)] {
    static PATTERNS: OnceLock<Vec<(Region, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        Region::ALL
            .iter()
            .map(|&region| {
                let codes = region.codes().join("|");
                let pattern = Regex::new(&format!(r"(?i)(?:^|[^a-z0-9])(?:{codes})(?:[^a-z0-9]|$)"))
                    .expect("region code regex");
                (region, pattern)
            })
            .collect()
    })
}

/// Every region the name belongs to, in group order.
pub fn classify(name: &str) -> Vec<Region> {
    Region::ALL.into_iter().filter(|r| r.matches(name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_token_matches() {
        assert!(Region::UnitedStates.matches("US-01"));
        assert!(Region::UnitedStates.matches("Premium | US 02"));
        assert!(Region::UnitedStates.matches("usa_west"));
        assert!(Region::Singapore.matches("[SGP] Node"));
        assert!(Region::HongKong.matches("hk"));
    }

    #[test]
    fn code_inside_word_does_not_match() {
        assert!(!Region::UnitedStates.matches("BONUS-1"));
        assert!(!Region::UnitedStates.matches("USAGE left: 10G"));
        assert!(!Region::Japan.matches("JPN01"));
        assert!(!Region::Korea.matches("KR1"));
    }

    #[test]
    fn non_ascii_neighbours_are_boundaries() {
        assert!(Region::HongKong.matches("高速HK专线"));
        assert!(Region::Taiwan.matches("TW🚀"));
    }

    #[test]
    fn keyword_and_flag_matches() {
        assert!(Region::HongKong.matches("🇭🇰 Premium 01"));
        assert!(Region::Japan.matches("日本 东京 01"));
        assert!(Region::Singapore.matches("狮城 IEPL"));
        assert!(Region::UnitedStates.matches("North America 3"));
        assert!(Region::Korea.matches("South Korea"));
        assert!(Region::HongKong.matches("HONG KONG 1"));
    }

    #[test]
    fn names_may_match_several_regions() {
        assert_eq!(
            classify("HK-JP relay"),
            vec![Region::HongKong, Region::Japan]
        );
        assert!(classify("Germany 01").is_empty());
    }

    #[test]
    fn every_region_matches_its_own_codes() {
        for region in Region::ALL {
            for code in region.codes() {
                assert!(region.matches(&format!("{code}-01")), "{region:?} {code}");
                let others: Vec<_> = Region::ALL
                    .into_iter()
                    .filter(|r| *r != region && r.matches(&format!("{code}-01")))
                    .collect();
                assert!(others.is_empty(), "{code} also matched {others:?}");
            }
        }
    }

    #[test]
    fn group_names_follow_region_order() {
        let names: Vec<_> = Region::ALL.iter().map(|r| r.group_name()).collect();
        assert_eq!(
            names,
            vec!["香港节点", "台湾节点", "日本节点", "新加坡节点", "美国节点", "韩国节点"]
        );
    }
}
