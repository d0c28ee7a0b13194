//! Translate measure sets into network targeting payloads.

use crate::measure::{attrs, kinds, DeliveryNetwork, Measure, MeasureCatalog, MeasureSet};
use crate::remote::{AgeBand, ProfileSpec, RemoteId};

use super::error::{NodeFailure, NodeResult};

/// Targeting of one node, split by the object that carries it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeTargeting {
    /// Campaign profile criteria.
    pub profile: ProfileSpec,
    /// Domains go on the shared line-item profile, not the campaign.
    pub domains: Vec<String>,
}

/// Reads measures from a catalog and maps them onto profile fields.
pub struct TargetingTranslator<'a> {
    catalog: &'a MeasureCatalog,
    network: DeliveryNetwork,
}

impl<'a> TargetingTranslator<'a> {
    pub fn new(catalog: &'a MeasureCatalog, network: DeliveryNetwork) -> Self {
        Self { catalog, network }
    }

    /// Targeting for a node whose profile code is `code`.
    ///
    /// Every measure of the set must be known, belong to this network and
    /// be of a supported kind.
    pub fn translate(&self, code: &str, set: &MeasureSet) -> NodeResult<NodeTargeting> {
        let resolved = self.catalog.resolve(set);
        if let Some(unknown) = resolved.unknown.first() {
            return Err(NodeFailure::UnknownMeasure(*unknown));
        }
        if let Some(foreign) = resolved.found.iter().find(|m| m.delivery_network != self.network) {
            return Err(NodeFailure::Targeting(format!(
                "measure {} belongs to {}, not {}",
                foreign.id, foreign.delivery_network, self.network
            )));
        }
        if let Some(unsupported) = resolved.found.iter().find(|m| !is_supported(m)) {
            return Err(NodeFailure::Targeting(format!(
                "measure {} has unsupported type {}/{}",
                unsupported.id,
                unsupported.measure_type,
                unsupported.sub_type.as_deref().unwrap_or("-")
            )));
        }

        let mut profile = ProfileSpec {
            code: code.to_string(),
            ..Default::default()
        };

        for m in self.pick(set, kinds::DEMOGRAPHIC, Some(kinds::AGE_RANGE)) {
            let low = self.required_int(m, attrs::AGE_LOW)?;
            let high = self.required_int(m, attrs::AGE_HIGH)?;
            profile.age_bands.push(AgeBand {
                low: to_age(m, low)?,
                high: to_age(m, high)?,
            });
        }
        for m in self.pick(set, kinds::DEMOGRAPHIC, Some(kinds::GENDER)) {
            profile.genders.push(self.required_text(m, attrs::CODE)?);
        }
        for m in self.pick(set, kinds::GEOGRAPHY, Some(kinds::METRO)) {
            profile.metro_codes.push(self.required_int(m, attrs::CODE)?);
        }
        for m in self.pick(set, kinds::DEVICE, Some(kinds::DEVICE_TYPE)) {
            profile.device_types.push(self.required_text(m, attrs::CODE)?);
        }
        profile.segment_ids = self.remote_ids(set, kinds::SEGMENT, None)?;
        profile.content_category_ids =
            self.remote_ids(set, kinds::INVENTORY, Some(kinds::CONTENT_CATEGORY))?;
        profile.ad_unit_ids = self.remote_ids(set, kinds::INVENTORY, Some(kinds::AD_UNIT))?;

        let domains = self
            .pick(set, kinds::DOMAIN, None)
            .into_iter()
            .map(|m| self.required_text(m, attrs::DOMAIN))
            .collect::<NodeResult<Vec<_>>>()?;

        profile.age_bands.sort();
        profile.age_bands.dedup();
        sort_dedup(&mut profile.genders);
        sort_dedup(&mut profile.metro_codes);
        sort_dedup(&mut profile.device_types);

        Ok(NodeTargeting {
            profile,
            domains: sorted(domains),
        })
    }

    /// Domains of every set, merged. Unknown ids are ignored.
    pub fn domains<'s>(&self, sets: impl IntoIterator<Item = &'s MeasureSet>) -> Vec<String> {
        let domains = sets
            .into_iter()
            .flat_map(|set| self.pick(set, kinds::DOMAIN, None))
            .filter_map(|m| self.catalog.text_value(m, attrs::DOMAIN))
            .map(str::to_string)
            .collect();
        sorted(domains)
    }

    fn pick(
        &self,
        set: &MeasureSet,
        measure_type: &str,
        sub_type: Option<&str>,
    ) -> Vec<&'a Measure> {
        self.catalog.filter_set(set, self.network, measure_type, sub_type)
    }

    fn remote_ids(
        &self,
        set: &MeasureSet,
        measure_type: &str,
        sub_type: Option<&str>,
    ) -> NodeResult<Vec<RemoteId>> {
        let mut ids = self
            .pick(set, measure_type, sub_type)
            .into_iter()
            .map(|m| self.required_int(m, attrs::REMOTE_ID))
            .collect::<NodeResult<Vec<_>>>()?;
        sort_dedup(&mut ids);
        Ok(ids)
    }

    fn required_int(&self, measure: &Measure, attribute: &str) -> NodeResult<i64> {
        self.catalog
            .int_value(measure, attribute)
            .ok_or_else(|| missing(measure, attribute))
    }

    fn required_text(&self, measure: &Measure, attribute: &str) -> NodeResult<String> {
        self.catalog
            .value(measure, attribute)
            .map(|v| v.to_string())
            .ok_or_else(|| missing(measure, attribute))
    }
}

fn is_supported(m: &Measure) -> bool {
    m.is_kind(kinds::DEMOGRAPHIC, Some(kinds::AGE_RANGE))
        || m.is_kind(kinds::DEMOGRAPHIC, Some(kinds::GENDER))
        || m.is_kind(kinds::GEOGRAPHY, Some(kinds::METRO))
        || m.is_kind(kinds::DEVICE, Some(kinds::DEVICE_TYPE))
        || m.is_kind(kinds::SEGMENT, None)
        || m.is_kind(kinds::INVENTORY, Some(kinds::CONTENT_CATEGORY))
        || m.is_kind(kinds::INVENTORY, Some(kinds::AD_UNIT))
        || m.is_kind(kinds::DOMAIN, None)
}

fn missing(measure: &Measure, attribute: &str) -> NodeFailure {
    NodeFailure::Targeting(format!(
        "measure {} ({}) has no {} attribute",
        measure.id, measure.display_name, attribute
    ))
}

fn to_age(measure: &Measure, value: i64) -> NodeResult<u16> {
    u16::try_from(value).map_err(|_| {
        NodeFailure::Targeting(format!("measure {} has invalid age {}", measure.id, value))
    })
}

fn sort_dedup<T: Ord>(values: &mut Vec<T>) {
    values.sort();
    values.dedup();
}

fn sorted(mut values: Vec<String>) -> Vec<String> {
    sort_dedup(&mut values);
    values
}
