//! Collision-free measure id allocation.
//!
//! A measure id packs three parts into one `i64`:
//!
//! ```text
//!   network_prefix * 10^16  +  source_prefix * 10^13  +  local_id
//!   └── u8, 0..=255 ──┘        └── u8, 0..=255 ─┘         └ 0..10^13 ┘
//! ```
//!
//! Because the source prefix can never reach 1000, the block owned by one
//! `(network, source)` pair never touches any other pair's block. Ids can
//! therefore be used as one flat namespace across every source.

use serde::{Deserialize, Serialize};

use super::error::{MeasureError, MeasureResult};
use super::{DeliveryNetwork, MeasureId};
use crate::cache::stable_hash_u64;

/// Number of local ids available to one source.
pub const LOCAL_SPAN: i64 = 10_000_000_000_000;

/// Width of one network's block.
pub const NETWORK_SPAN: i64 = 1_000 * LOCAL_SPAN;

/// Allocates ids for one `(network, source)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeasureIdAllocator {
    network_prefix: u8,
    source_prefix: u8,
}

impl MeasureIdAllocator {
    pub fn new(network_prefix: u8, source_prefix: u8) -> Self {
        Self {
            network_prefix,
            source_prefix,
        }
    }

    /// Allocator for a source on a delivery network.
    pub fn for_source(network: DeliveryNetwork, source_prefix: u8) -> Self {
        Self::new(network.prefix(), source_prefix)
    }

    /// Build the global id for `local_id`.
    pub fn allocate(&self, local_id: i64) -> MeasureResult<MeasureId> {
        allocate(self.network_prefix, self.source_prefix, local_id)
    }

    /// The closed id interval owned by this source.
    pub fn range(&self) -> IdRange {
        let base = base(self.network_prefix, self.source_prefix);
        IdRange {
            min: MeasureId::new(base),
            max: MeasureId::new(base + LOCAL_SPAN - 1),
        }
    }

    pub fn network_prefix(&self) -> u8 {
        self.network_prefix
    }

    pub fn source_prefix(&self) -> u8 {
        self.source_prefix
    }
}

fn base(network_prefix: u8, source_prefix: u8) -> i64 {
    i64::from(network_prefix) * NETWORK_SPAN + i64::from(source_prefix) * LOCAL_SPAN
}

/// Map `(network_prefix, source_prefix, local_id)` to a global measure id.
pub fn allocate(network_prefix: u8, source_prefix: u8, local_id: i64) -> MeasureResult<MeasureId> {
    if !(0..LOCAL_SPAN).contains(&local_id) {
        return Err(MeasureError::IdOutOfRange { local_id });
    }
    Ok(MeasureId::new(base(network_prefix, source_prefix) + local_id))
}

/// Split an id back into `(network_prefix, source_prefix, local_id)`.
///
/// Returns `None` for ids no allocator could have produced.
pub fn decompose(id: MeasureId) -> Option<(u8, u8, i64)> {
    let raw = id.get();
    if raw < 0 {
        return None;
    }
    let network = u8::try_from(raw / NETWORK_SPAN).ok()?;
    let source = u8::try_from((raw % NETWORK_SPAN) / LOCAL_SPAN).ok()?;
    Some((network, source, raw % LOCAL_SPAN))
}

/// Derive a local id from a natural key that has no numeric form.
///
/// Deterministic across processes, so ids survive cache rebuilds.
pub fn stable_local_id(natural_key: &str) -> i64 {
    (stable_hash_u64(natural_key) % LOCAL_SPAN as u64) as i64
}

/// A closed interval of measure ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub min: MeasureId,
    pub max: MeasureId,
}

impl IdRange {
    pub fn contains(&self, id: MeasureId) -> bool {
        self.min <= id && id <= self.max
    }

    pub fn intersects(&self, other: &IdRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

/// Fail if any two named ranges intersect.
pub fn verify_disjoint<'a, I>(ranges: I) -> MeasureResult<()>
where
    I: IntoIterator<Item = (&'a str, IdRange)>,
{
    let mut sorted: Vec<(&str, IdRange)> = ranges.into_iter().collect();
    sorted.sort_by_key(|(_, r)| r.min);

    for pair in sorted.windows(2) {
        let (left_name, left) = pair[0];
        let (right_name, right) = pair[1];
        if left.intersects(&right) {
            return Err(MeasureError::configuration(format!(
                "measure id ranges of sources {} [{}, {}] and {} [{}, {}] overlap",
                left_name, left.min, left.max, right_name, right.min, right.max
            )));
        }
    }
    Ok(())
}
