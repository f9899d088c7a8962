//! Matching of records to nearby features sharing a street address.
//!
//! City is ignored here: a record with house number and street matches any
//! node, way or relation carrying the same pair within range. Each element
//! kind is searched independently, so one record may update up to three
//! features.

use geo::Geometry;
use log::debug;

use crate::batch::AddressRecord;
use crate::changeset::ChangesetBuilder;
use crate::feature::{FeatureKind, FeatureRef};
use crate::index::SpatialIndex;

/// Ranked candidates for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityCandidates {
    /// The record the candidates were found for.
    pub import_id: i64,
    /// Candidates per kind, nearest first, ties broken by identity.
    pub ranked: Vec<(FeatureKind, Vec<FeatureRef>)>,
}

/// Rank the features each record could merge into.
///
/// A candidate shares the record's house number and street and lies within
/// `buffer + nocity` metres of the record. Records without a house number or
/// street have no candidates.
#[expect(
    clippy::float_arithmetic,
    reason = "the search radius adds the buffer to the no-city radius"
)]
pub fn find_candidates<'a, I>(
    records: I,
    index: &SpatialIndex,
    nocity: f64,
    buffer: f64,
) -> Vec<ProximityCandidates>
where
    I: IntoIterator<Item = &'a AddressRecord>,
{
    let radius = buffer + nocity;
    records
        .into_iter()
        .filter(|record| record.address().street_address().is_some())
        .map(|record| {
            let address = record.address();
            let query = Geometry::Point(record.location);
            let ranked = FeatureKind::ALL
                .iter()
                .map(|kind| {
                    let refs = index
                        .within_distance(&query, radius, Some(*kind))
                        .into_iter()
                        .filter(|hit| hit.feature.address().matches_ignoring_city(&address))
                        .map(|hit| hit.feature.feature_ref())
                        .collect();
                    (*kind, refs)
                })
                .collect();
            ProximityCandidates {
                import_id: record.import_id,
                ranked,
            }
        })
        .collect()
}

/// Merge pending records into their nearest unmodified candidate per kind.
///
/// Returns the number of modifications recorded.
pub fn match_nearby(
    index: &SpatialIndex,
    nocity: f64,
    buffer: f64,
    builder: &mut ChangesetBuilder<'_>,
) -> usize {
    let candidates = find_candidates(builder.pending_records(), index, nocity, buffer);
    let mut matched = 0;
    for candidate in candidates {
        for (kind, refs) in &candidate.ranked {
            let chosen = refs
                .iter()
                .find(|feature| !builder.is_modified(**feature))
                .and_then(|feature| index.get(*feature));
            if let Some(feature) = chosen {
                if builder.record_match(candidate.import_id, feature) {
                    matched += 1;
                }
            } else if !refs.is_empty() {
                debug!(
                    "Every {kind} candidate of import record {} is already modified",
                    candidate.import_id
                );
            }
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ImportBatch;
    use crate::feature::{CITY_KEY, HOUSENUMBER_KEY, STREET_KEY, Tags};
    use crate::test_support::{FeatureBuilder, offset};
    use geo::Point;
    use rstest::rstest;

    fn street(housenumber: &str) -> Tags {
        Tags::from([
            (HOUSENUMBER_KEY.to_owned(), housenumber.to_owned()),
            (STREET_KEY.to_owned(), "Main St".to_owned()),
        ])
    }

    fn record(import_id: i64, east: f64, housenumber: &str) -> AddressRecord {
        let mut tags = street(housenumber);
        tags.insert(CITY_KEY.to_owned(), "Springfield".to_owned());
        AddressRecord::new(import_id, Point::from(offset(east, 0.0)), tags)
    }

    #[rstest]
    fn nearby_feature_without_city_is_matched() {
        let index = SpatialIndex::new([FeatureBuilder::node(99, offset(3.0, 0.0))
            .tags(street("12"))
            .version(2)
            .build()]);
        let batch = ImportBatch::new([record(1, 0.0, "12")]).expect("valid batch");
        let mut builder = ChangesetBuilder::new(&batch);
        assert_eq!(match_nearby(&index, 5.0, 0.5, &mut builder), 1);
        let conflation = builder.finish();
        assert_eq!(conflation.modifications[0].new_version, 3);
        assert_eq!(
            conflation.modifications[0].merged_tags.get(CITY_KEY).map(String::as_str),
            Some("Springfield")
        );
    }

    #[rstest]
    #[case(4.0, true)]
    #[case(6.0, false)]
    fn range_includes_the_buffer(#[case] east: f64, #[case] matched: bool) {
        let index = SpatialIndex::new([FeatureBuilder::node(99, offset(east, 0.0))
            .tags(street("12"))
            .build()]);
        let batch = ImportBatch::new([record(1, 0.0, "12")]).expect("valid batch");
        let mut builder = ChangesetBuilder::new(&batch);
        assert_eq!(match_nearby(&index, 4.0, 0.5, &mut builder) == 1, matched);
    }

    #[rstest]
    fn different_house_numbers_never_match() {
        let index = SpatialIndex::new([FeatureBuilder::node(99, offset(1.0, 0.0))
            .tags(street("14"))
            .build()]);
        let batch = ImportBatch::new([record(1, 0.0, "12")]).expect("valid batch");
        let mut builder = ChangesetBuilder::new(&batch);
        assert_eq!(match_nearby(&index, 5.0, 0.5, &mut builder), 0);
        assert!(builder.is_pending(1));
    }

    #[rstest]
    fn nearest_candidate_wins_and_each_kind_is_matched() {
        let index = SpatialIndex::new([
            FeatureBuilder::node(1, offset(4.0, 0.0)).tags(street("12")).build(),
            FeatureBuilder::node(2, offset(2.0, 0.0)).tags(street("12")).build(),
            FeatureBuilder::square_way(3, offset(1.0, -1.0), 2.0)
                .tags(street("12"))
                .build(),
        ]);
        let batch = ImportBatch::new([record(1, 0.0, "12")]).expect("valid batch");
        let mut builder = ChangesetBuilder::new(&batch);
        assert_eq!(match_nearby(&index, 5.0, 0.5, &mut builder), 2);
        let targets: Vec<FeatureRef> = builder
            .finish()
            .modifications
            .iter()
            .map(|modification| modification.feature)
            .collect();
        assert_eq!(
            targets,
            vec![
                FeatureRef::new(FeatureKind::Node, 2),
                FeatureRef::new(FeatureKind::Way, 3)
            ]
        );
    }

    #[rstest]
    fn one_record_updates_a_feature_of_every_kind() {
        let index = SpatialIndex::new([
            FeatureBuilder::node(1, offset(2.0, 0.0)).tags(street("12")).build(),
            FeatureBuilder::square_way(3, offset(1.0, -1.0), 2.0)
                .tags(street("12"))
                .build(),
            FeatureBuilder::square_relation(4, offset(-3.0, -1.0), 2.0)
                .tags(street("12"))
                .build(),
        ]);
        let batch = ImportBatch::new([record(1, 0.0, "12")]).expect("valid batch");
        let mut builder = ChangesetBuilder::new(&batch);
        assert_eq!(match_nearby(&index, 5.0, 0.5, &mut builder), 3);
        let conflation = builder.finish();
        let targets: Vec<FeatureRef> = conflation
            .modifications
            .iter()
            .map(|modification| modification.feature)
            .collect();
        assert_eq!(
            targets,
            vec![
                FeatureRef::new(FeatureKind::Node, 1),
                FeatureRef::new(FeatureKind::Way, 3),
                FeatureRef::new(FeatureKind::Relation, 4)
            ]
        );
        assert!(conflation.modifications.iter().all(|modification| {
            modification.merged_tags.get(CITY_KEY).map(String::as_str) == Some("Springfield")
        }));
    }

    #[rstest]
    fn later_records_fall_back_to_unmodified_candidates() {
        let index = SpatialIndex::new([
            FeatureBuilder::node(1, offset(1.0, 0.0)).tags(street("12")).build(),
            FeatureBuilder::node(2, offset(3.0, 0.0)).tags(street("12")).build(),
        ]);
        let batch = ImportBatch::new([record(5, 0.0, "12"), record(6, 0.5, "12")])
            .expect("valid batch");
        let mut builder = ChangesetBuilder::new(&batch);
        assert_eq!(match_nearby(&index, 5.0, 0.5, &mut builder), 2);
        let conflation = builder.finish();
        assert_eq!(conflation.outcome.consumed.len(), 2);
        assert_eq!(conflation.modifications.len(), 2);
    }
}
