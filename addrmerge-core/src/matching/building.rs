//! Matching of records to unaddressed buildings they fall inside.
//!
//! A pairing is only accepted when it is unambiguous in both directions: the
//! building is hit by exactly one pending record and that record hits no other
//! candidate building. Buildings with an addressed neighbour closer than the
//! configured radius are left alone.

use std::collections::BTreeMap;

use geo::Geometry;
use log::{debug, warn};

use crate::batch::AddressRecord;
use crate::changeset::ChangesetBuilder;
use crate::feature::{ExistingFeature, FeatureRef};
use crate::geometry::{is_valid_buffer, point_buffer};
use crate::index::SpatialIndex;

/// Buffer hits between records and candidate buildings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildingHits {
    by_building: BTreeMap<FeatureRef, Vec<i64>>,
    by_record: BTreeMap<i64, Vec<FeatureRef>>,
    invalid: Vec<i64>,
}

impl BuildingHits {
    /// Records whose buffer intersects `building`, ascending.
    #[must_use]
    pub fn records_hitting(&self, building: FeatureRef) -> &[i64] {
        self.by_building
            .get(&building)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Candidate buildings hit by the buffer of `import_id`, ascending.
    #[must_use]
    pub fn buildings_hit_by(&self, import_id: i64) -> &[FeatureRef] {
        self.by_record
            .get(&import_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether the record's buffer failed validation.
    #[must_use]
    pub fn has_invalid_buffer(&self, import_id: i64) -> bool {
        self.invalid.binary_search(&import_id).is_ok()
    }

    /// Pairs that are unambiguous in both directions and have a valid buffer.
    #[must_use]
    pub fn unambiguous_pairs(&self) -> Vec<(i64, FeatureRef)> {
        let mut pairs: Vec<(i64, FeatureRef)> = self
            .by_building
            .iter()
            .filter_map(|(building, records)| match records.as_slice() {
                [only] => Some((*only, *building)),
                _ => None,
            })
            .filter(|(import_id, _)| {
                self.buildings_hit_by(*import_id).len() == 1 && !self.has_invalid_buffer(*import_id)
            })
            .collect();
        pairs.sort_unstable();
        pairs
    }
}

/// Whether `feature` may receive an address from this matcher.
#[must_use]
pub fn is_candidate_building(feature: &ExistingFeature) -> bool {
    matches!(
        feature.geometry,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_)
    ) && feature.is_building()
        && !feature.is_addressed()
}

/// Intersect each record's buffer with candidate buildings.
///
/// Buildings for which `eligible` returns `false` are ignored. Records with
/// an invalid buffer still count towards a building's ambiguity but are never
/// paired.
pub fn find_hits<'a, I, F>(
    records: I,
    index: &SpatialIndex,
    buffer: f64,
    mut eligible: F,
) -> BuildingHits
where
    I: IntoIterator<Item = &'a AddressRecord>,
    F: FnMut(&ExistingFeature) -> bool,
{
    let mut hits = BuildingHits::default();
    for record in records {
        let polygon = point_buffer(record.location, buffer);
        if !is_valid_buffer(&polygon) {
            warn!(
                "Import record {} has an invalid {buffer} m buffer and cannot match a building",
                record.import_id
            );
            hits.invalid.push(record.import_id);
        }
        let buildings: Vec<FeatureRef> = index
            .intersecting(&polygon)
            .into_iter()
            .filter(|feature| is_candidate_building(feature) && eligible(feature))
            .map(ExistingFeature::feature_ref)
            .collect();
        for building in &buildings {
            hits.by_building
                .entry(*building)
                .or_default()
                .push(record.import_id);
        }
        if !buildings.is_empty() {
            hits.by_record.insert(record.import_id, buildings);
        }
    }
    for records in hits.by_building.values_mut() {
        records.sort_unstable();
    }
    hits.invalid.sort_unstable();
    hits
}

/// Whether an addressed feature lies within `radius` metres of `building`.
#[must_use]
pub fn has_addressed_neighbour(
    index: &SpatialIndex,
    building: &ExistingFeature,
    radius: f64,
) -> bool {
    let own = building.feature_ref();
    index
        .within_distance(&building.geometry, radius, None)
        .iter()
        .any(|hit| hit.feature.feature_ref() != own && hit.feature.is_addressed())
}

/// Merge pending records into the buildings they unambiguously fall inside.
///
/// Returns the number of modifications recorded.
pub fn match_buildings(
    index: &SpatialIndex,
    radius: f64,
    buffer: f64,
    builder: &mut ChangesetBuilder<'_>,
) -> usize {
    let hits = find_hits(builder.pending_records(), index, buffer, |feature| {
        !builder.is_modified(feature.feature_ref())
    });

    for (building, records) in &hits.by_building {
        if records.len() > 1 {
            debug!(
                "Building {building} is hit by {} import records; leaving it unmatched",
                records.len()
            );
        }
    }

    let mut matched = 0;
    for (import_id, target) in hits.unambiguous_pairs() {
        let Some(building) = index.get(target) else {
            continue;
        };
        if has_addressed_neighbour(index, building, radius) {
            debug!("Building {target} has an addressed neighbour within {radius} m");
            continue;
        }
        if builder.record_match(import_id, building) {
            matched += 1;
        }
    }
    matched
}
