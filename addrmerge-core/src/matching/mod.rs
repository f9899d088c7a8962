//! The conflation pipeline.
//!
//! Passes run in a fixed order: exact duplicates are removed first, then the
//! optional proximity and building matchers see whatever is still pending.
//! Each pass discovers candidates against the read-only index before feeding
//! its decisions to the [`ChangesetBuilder`] in ascending import-id order, so
//! the result depends only on the batch, the snapshot and the options.

pub mod building;
pub mod exact;
pub mod proximity;

use log::info;

use crate::batch::ImportBatch;
use crate::changeset::{ChangesetBuilder, Conflation};
use crate::index::SpatialIndex;
use crate::options::MatchOptions;
use crate::sanitize::TagSanitizer;

/// Partition `batch` against `index` and build the resulting changeset.
///
/// # Examples
/// ```
/// use geo::{Coord, Geometry, Point};
/// use addrmerge_core::{
///     AddressRecord, ExistingFeature, ImportBatch, MatchOptions, SpatialIndex, Structure, Tags,
///     conflate,
/// };
///
/// let address = Tags::from([
///     ("addr:housenumber".to_owned(), "12".to_owned()),
///     ("addr:street".to_owned(), "Main St".to_owned()),
///     ("addr:city".to_owned(), "Springfield".to_owned()),
/// ]);
/// let existing = ExistingFeature {
///     id: 99,
///     geometry: Geometry::Point(Point::new(0.0, 0.0)),
///     tags: address.clone(),
///     version: 1,
///     structure: Structure::Node(Coord { x: 0.0, y: 0.0 }),
/// };
/// let batch = ImportBatch::new([AddressRecord::new(1, Point::new(0.1, 0.1), address)])
///     .expect("valid batch");
/// let conflation = conflate(&batch, &SpatialIndex::new([existing]), &MatchOptions::default());
/// assert!(conflation.outcome.duplicates.contains(&1));
/// assert!(conflation.modifications.is_empty());
/// ```
#[must_use]
pub fn conflate(batch: &ImportBatch, index: &SpatialIndex, options: &MatchOptions) -> Conflation {
    let mut builder = ChangesetBuilder::new(batch);

    let duplicates = exact::remove_duplicates(index, &mut builder);
    info!("Exact-tag pass removed {duplicates} duplicate(s)");

    if let Some(nocity) = options.nocity() {
        let matched = proximity::match_nearby(index, nocity, options.buffer(), &mut builder);
        info!("Proximity pass recorded {matched} modification(s) within {nocity} m");
    }

    if let Some(radius) = options.building() {
        let matched = building::match_buildings(index, radius, options.buffer(), &mut builder);
        info!("Building pass recorded {matched} modification(s)");
    }

    let mut conflation = builder.finish();
    let stripped = TagSanitizer::from_options(options).sanitize(&mut conflation.modifications);
    info!(
        "Conflated {} record(s): {} duplicate(s), {} consumed, {} new; {} modification(s), {stripped} tag(s) stripped",
        batch.len(),
        conflation.outcome.duplicates.len(),
        conflation.outcome.consumed.len(),
        conflation.outcome.unmatched.len(),
        conflation.modifications.len(),
    );
    conflation
}
