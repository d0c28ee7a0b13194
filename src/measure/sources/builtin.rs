//! Reference tables shipped with the crate, and the source prefixes of
//! every builtin source.

use super::static_table::{StaticRow, StaticTable};
use crate::measure::{attrs, kinds, DeliveryNetwork};

pub const AGE_RANGE_PREFIX: u8 = 1;
pub const GENDER_PREFIX: u8 = 2;
pub const METRO_PREFIX: u8 = 3;
pub const DEVICE_TYPE_PREFIX: u8 = 4;
pub const DOMAIN_PREFIX: u8 = 5;
pub const SEGMENT_PREFIX: u8 = 10;
pub const CONTENT_CATEGORY_PREFIX: u8 = 11;
pub const AD_UNIT_PREFIX: u8 = 12;

const AGE_BANDS: &[(u16, u16)] = &[(18, 24), (25, 34), (35, 44), (45, 54), (55, 64), (65, 99)];

/// Nielsen DMA codes.
const METROS: &[(i64, &str)] = &[
    (501, "New York"),
    (803, "Los Angeles"),
    (602, "Chicago"),
    (504, "Philadelphia"),
    (623, "Dallas-Ft. Worth"),
    (807, "San Francisco-Oakland-San Jose"),
    (511, "Washington, DC"),
    (618, "Houston"),
    (506, "Boston"),
    (524, "Atlanta"),
    (539, "Tampa-St. Petersburg"),
    (819, "Seattle-Tacoma"),
];

const DEVICE_TYPES: &[(&str, &str)] = &[
    ("desktop", "Desktop & Laptop"),
    ("phone", "Smartphone"),
    ("tablet", "Tablet"),
    ("tv", "Connected TV"),
];

/// Age bands; the local id is `low * 100 + high`.
pub fn age_ranges() -> StaticTable {
    let rows = AGE_BANDS
        .iter()
        .map(|&(low, high)| {
            let name = if high >= 99 {
                format!("{}+", low)
            } else {
                format!("{}-{}", low, high)
            };
            StaticRow::natural(i64::from(low) * 100 + i64::from(high), kinds::DEMOGRAPHIC, name)
                .sub_type(kinds::AGE_RANGE)
                .attr(attrs::AGE_LOW, i64::from(low))
                .attr(attrs::AGE_HIGH, i64::from(high))
        })
        .collect();
    StaticTable::new("age_ranges", rows)
}

/// Genders, with the code each network expects.
pub fn genders(network: DeliveryNetwork) -> StaticTable {
    let (male, female) = match network {
        DeliveryNetwork::AppNexus => ("m", "f"),
        DeliveryNetwork::GoogleDfp => ("MALE", "FEMALE"),
    };
    StaticTable::new(
        "genders",
        vec![
            StaticRow::natural(1, kinds::DEMOGRAPHIC, "Male")
                .sub_type(kinds::GENDER)
                .attr(attrs::CODE, male),
            StaticRow::natural(2, kinds::DEMOGRAPHIC, "Female")
                .sub_type(kinds::GENDER)
                .attr(attrs::CODE, female),
        ],
    )
}

/// Designated market areas keyed by DMA code.
pub fn metros() -> StaticTable {
    let rows = METROS
        .iter()
        .map(|&(code, name)| {
            StaticRow::natural(code, kinds::GEOGRAPHY, name)
                .sub_type(kinds::METRO)
                .attr(attrs::CODE, code)
        })
        .collect();
    StaticTable::new("metros", rows).with_data_provider("nielsen")
}

pub fn device_types() -> StaticTable {
    let rows = DEVICE_TYPES
        .iter()
        .map(|&(code, name)| {
            StaticRow::hashed(code, kinds::DEVICE, name)
                .sub_type(kinds::DEVICE_TYPE)
                .attr(attrs::CODE, code)
        })
        .collect();
    StaticTable::new("device_types", rows)
}

/// A campaign's domain targeting list; one hashed row per domain.
pub fn domains(list: &[String]) -> StaticTable {
    let mut names: Vec<String> = list.iter().map(|d| d.trim().to_lowercase()).collect();
    names.retain(|d| !d.is_empty());
    names.sort();
    names.dedup();

    let rows = names
        .into_iter()
        .map(|domain| {
            StaticRow::hashed(domain.clone(), kinds::DOMAIN, domain.clone())
                .attr(attrs::DOMAIN, domain)
        })
        .collect();
    StaticTable::new("domains", rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::sources::static_table::LocalKey;
    use std::collections::HashSet;

    #[test]
    fn test_age_range_names() {
        let names: Vec<_> = age_ranges().rows.into_iter().map(|r| r.display_name).collect();
        assert_eq!(names.first().map(String::as_str), Some("18-24"));
        assert_eq!(names.last().map(String::as_str), Some("65+"));
    }

    #[test]
    fn test_gender_codes_follow_network() {
        let dfp = genders(DeliveryNetwork::GoogleDfp);
        assert_eq!(dfp.rows[0].attributes[0].1.as_text(), Some("MALE"));
    }

    #[test]
    fn test_device_keys_unique() {
        let ids: HashSet<i64> = device_types().rows.iter().map(|r| r.key.local_id()).collect();
        assert_eq!(ids.len(), DEVICE_TYPES.len());
    }

    #[test]
    fn test_domains_normalized() {
        let table = domains(&[
            "Example.com".to_string(),
            " example.com ".to_string(),
            "".to_string(),
            "news.org".to_string(),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].key, LocalKey::Hashed("example.com".into()));
    }
}
