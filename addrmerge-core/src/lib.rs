//! Core conflation engine for surveyed address imports.
//!
//! A run takes an [`ImportBatch`] of surveyed address points and a snapshot of
//! existing map features, and partitions the batch three ways: exact
//! duplicates are dropped, matched records become [`ModificationRecord`]s on
//! existing features, and the rest are emitted as new features.
//!
//! ```
//! use geo::{Coord, Geometry, Point};
//! use addrmerge_core::{
//!     AddressRecord, ExistingFeature, ImportBatch, MatchOptions, SpatialIndex, Structure, Tags,
//!     conflate,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let existing = ExistingFeature {
//!     id: 99,
//!     geometry: Geometry::Point(Point::new(0.0, 0.0)),
//!     tags: Tags::from([
//!         ("addr:housenumber".to_owned(), "12".to_owned()),
//!         ("addr:street".to_owned(), "Main St".to_owned()),
//!     ]),
//!     version: 4,
//!     structure: Structure::Node(Coord { x: 0.0, y: 0.0 }),
//! };
//! let record = AddressRecord::new(
//!     1,
//!     Point::new(0.00002, 0.0),
//!     Tags::from([
//!         ("addr:housenumber".to_owned(), "12".to_owned()),
//!         ("addr:street".to_owned(), "Main St".to_owned()),
//!         ("addr:city".to_owned(), "Springfield".to_owned()),
//!     ]),
//! );
//! let batch = ImportBatch::new([record])?;
//! let options = MatchOptions::default().with_nocity(5.0)?;
//! let conflation = conflate(&batch, &SpatialIndex::new([existing]), &options);
//! assert_eq!(conflation.modifications[0].new_version, 5);
//! # Ok(())
//! # }
//! ```

pub mod area;
pub mod batch;
pub mod changeset;
pub mod feature;
pub mod geometry;
pub mod index;
pub mod matching;
pub mod options;
pub mod sanitize;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use area::{AreaOfInterest, AreaOfInterestError};
pub use batch::{AddressRecord, ImportBatch, ImportBatchError};
pub use changeset::{
    ChangesetBuilder, Conflation, MatchOutcome, ModificationRecord, merge_tags,
};
pub use feature::{
    AddressKey, ExistingFeature, FeatureKind, FeatureRef, RelationMember, Structure, Tags,
};
pub use index::{Nearby, SpatialIndex};
pub use matching::conflate;
pub use options::{MatchOptions, MatchOptionsError};
pub use sanitize::TagSanitizer;
pub use store::{ChangesetSink, FeatureStore};
#[cfg(feature = "store-sqlite")]
pub use store::{FEATURE_SCHEMA, SqliteFeatureStore, SqliteFeatureStoreError};
