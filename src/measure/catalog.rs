//! One lookup surface over every registered measure source.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info};

use super::error::{MeasureError, MeasureResult};
use super::id::{verify_disjoint, IdRange};
use super::source::MeasureSource;
use super::{AttributeValue, DeliveryNetwork, Measure, MeasureId, MeasureSet};

/// What the catalog knows about one of its sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub source_id: String,
    pub network: DeliveryNetwork,
    pub range: IdRange,
    pub online: bool,
    pub async_refresh: bool,
    /// `None` while an async source has nothing to offer yet.
    pub measure_count: Option<usize>,
}

/// The measures of a [`MeasureSet`] split into known and unknown ids.
#[derive(Debug, Default)]
pub struct Resolved<'a> {
    pub found: Vec<&'a Measure>,
    pub unknown: Vec<MeasureId>,
}

impl Resolved<'_> {
    pub fn is_complete(&self) -> bool {
        self.unknown.is_empty()
    }
}

/// Immutable view over the measures of all sources at build time.
///
/// Rebuilt for each export run; there is no way to add or remove measures
/// from a built catalog.
#[derive(Debug, Default)]
pub struct MeasureCatalog {
    measures: BTreeMap<MeasureId, Measure>,
    sources: Vec<SourceSummary>,
    pending: Vec<String>,
}

impl MeasureCatalog {
    /// Load every source and merge their measures.
    ///
    /// Fails when two sources claim overlapping id ranges or when any source
    /// fails to load. Async sources that are still refreshing are listed in
    /// [`pending_sources`](Self::pending_sources) instead.
    pub async fn build(sources: &[Arc<dyn MeasureSource>]) -> MeasureResult<Self> {
        let ranges: Vec<(String, IdRange)> = sources
            .iter()
            .map(|s| (s.source_id().to_string(), s.descriptor().id_range()))
            .collect();
        verify_disjoint(ranges.iter().map(|(name, range)| (name.as_str(), *range)))?;

        let loaded = join_all(sources.iter().map(|s| s.measures())).await;

        let mut catalog = MeasureCatalog::default();
        for (source, result) in sources.iter().zip(loaded) {
            let snapshot = result?;
            let descriptor = source.descriptor();

            catalog.sources.push(SourceSummary {
                source_id: descriptor.source_id.clone(),
                network: descriptor.network,
                range: descriptor.id_range(),
                online: descriptor.online,
                async_refresh: source.is_async_refresh(),
                measure_count: snapshot.as_ref().map(|m| m.len()),
            });

            match snapshot {
                Some(measures) => {
                    debug!(source = %descriptor.source_id, count = measures.len(), "source loaded");
                    catalog
                        .measures
                        .extend(measures.iter().map(|(id, m)| (*id, m.clone())));
                }
                None => {
                    debug!(source = %descriptor.source_id, "source pending refresh");
                    catalog.pending.push(descriptor.source_id.clone());
                }
            }
        }

        info!(
            measures = catalog.measures.len(),
            sources = catalog.sources.len(),
            pending = catalog.pending.len(),
            "measure catalog built"
        );
        Ok(catalog)
    }

    /// A catalog over a fixed list of measures, with no backing sources.
    pub fn from_measures(measures: impl IntoIterator<Item = Measure>) -> MeasureResult<Self> {
        let mut map = BTreeMap::new();
        for measure in measures {
            let id = measure.id;
            if map.insert(id, measure).is_some() {
                return Err(MeasureError::configuration(format!(
                    "measure id {} appears twice",
                    id
                )));
            }
        }
        Ok(Self {
            measures: map,
            ..Default::default()
        })
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn by_id(&self, id: MeasureId) -> Option<&Measure> {
        self.measures.get(&id)
    }

    /// All measures of a network matching a type and optional subtype.
    pub fn filter<'a>(
        &'a self,
        network: DeliveryNetwork,
        measure_type: &'a str,
        sub_type: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Measure> + 'a {
        self.measures
            .values()
            .filter(move |m| m.delivery_network == network && m.is_kind(measure_type, sub_type))
    }

    /// The measures of `set`, plus the ids the catalog does not know.
    pub fn resolve(&self, set: &MeasureSet) -> Resolved<'_> {
        let mut resolved = Resolved::default();
        for id in set.iter() {
            match self.measures.get(&id) {
                Some(measure) => resolved.found.push(measure),
                None => resolved.unknown.push(id),
            }
        }
        resolved
    }

    /// The measures of `set` matching a network, type and optional subtype.
    ///
    /// Ids unknown to the catalog are skipped; use [`resolve`](Self::resolve)
    /// to detect them.
    pub fn filter_set(
        &self,
        set: &MeasureSet,
        network: DeliveryNetwork,
        measure_type: &str,
        sub_type: Option<&str>,
    ) -> Vec<&Measure> {
        set.iter()
            .filter_map(|id| self.measures.get(&id))
            .filter(|m| m.delivery_network == network && m.is_kind(measure_type, sub_type))
            .collect()
    }

    // =========================================================================
    // Attribute access
    // =========================================================================

    pub fn value<'m>(&self, measure: &'m Measure, attribute: &str) -> Option<&'m AttributeValue> {
        measure.attribute(attribute)
    }

    pub fn text_value<'m>(&self, measure: &'m Measure, attribute: &str) -> Option<&'m str> {
        self.value(measure, attribute).and_then(AttributeValue::as_text)
    }

    pub fn int_value(&self, measure: &Measure, attribute: &str) -> Option<i64> {
        self.value(measure, attribute).and_then(AttributeValue::as_i64)
    }

    pub fn decimal_value(&self, measure: &Measure, attribute: &str) -> Option<f64> {
        self.value(measure, attribute).and_then(AttributeValue::as_f64)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn len(&self) -> usize {
        self.measures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measure> {
        self.measures.values()
    }

    pub fn sources(&self) -> &[SourceSummary] {
        &self.sources
    }

    /// Async sources that had no fresh snapshot when the catalog was built.
    pub fn pending_sources(&self) -> &[String] {
        &self.pending
    }

    /// Networks that have at least one measure in the catalog.
    pub fn networks(&self) -> Vec<DeliveryNetwork> {
        let mut networks: Vec<DeliveryNetwork> =
            self.measures.values().map(|m| m.delivery_network).collect();
        networks.sort();
        networks.dedup();
        networks
    }
}
