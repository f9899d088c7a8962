//! Test-only, in-memory `FeatureStore` implementation and feature builders
//! used by unit and behaviour tests.

use std::collections::BTreeMap;

use geo::{BoundingRect, Coord, Geometry, Intersects, LineString, Point, Polygon};
use thiserror::Error;

use crate::{
    AreaOfInterest, ChangesetSink, Conflation, ExistingFeature, FeatureKind, FeatureRef,
    FeatureStore, RelationMember, Structure, Tags,
};

/// Latitude and longitude that [`offset`] measures from.
pub const ORIGIN: Coord<f64> = Coord {
    x: -123.1,
    y: 49.25,
};

const METRES_PER_DEGREE: f64 = 111_320.0;

/// Offset [`ORIGIN`] by metres east and north.
///
/// The conversion is a local equirectangular approximation, accurate to well
/// under a percent over the few hundred metres tests work with.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    reason = "metre offsets convert to degrees around the origin"
)]
pub fn offset(east: f64, north: f64) -> Coord<f64> {
    Coord {
        x: ORIGIN.x + east / (METRES_PER_DEGREE * ORIGIN.y.to_radians().cos()),
        y: ORIGIN.y + north / METRES_PER_DEGREE,
    }
}

/// Fluent constructor for [`ExistingFeature`] values.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    feature: ExistingFeature,
}

impl FeatureBuilder {
    /// A version 1 node at `location`.
    #[must_use]
    pub fn node(id: i64, location: Coord<f64>) -> Self {
        Self::from_parts(
            id,
            Geometry::Point(Point::from(location)),
            Structure::Node(location),
        )
    }

    /// A version 1 closed way tracing a square `size` metres on a side whose
    /// south-west corner is `corner`.
    ///
    /// Node references are `id * 10 + 1..=4`, closed on the first.
    #[must_use]
    pub fn square_way(id: i64, corner: Coord<f64>, size: f64) -> Self {
        let refs: Vec<i64> = [1, 2, 3, 4, 1].iter().map(|n| id * 10 + n).collect();
        Self::from_parts(
            id,
            Geometry::Polygon(square(corner, size)),
            Structure::Way(refs),
        )
    }

    /// A version 1 multipolygon relation over the same square as
    /// [`FeatureBuilder::square_way`], with one outer member way `id * 10`.
    #[must_use]
    pub fn square_relation(id: i64, corner: Coord<f64>, size: f64) -> Self {
        Self::from_parts(
            id,
            Geometry::Polygon(square(corner, size)),
            Structure::Relation(vec![RelationMember {
                kind: FeatureKind::Way,
                id: id * 10,
                role: "outer".to_owned(),
            }]),
        )
        .tag("type", "multipolygon")
    }

    fn from_parts(id: i64, geometry: Geometry<f64>, structure: Structure) -> Self {
        Self {
            feature: ExistingFeature {
                id,
                geometry,
                tags: Tags::new(),
                version: 1,
                structure,
            },
        }
    }

    /// Set one tag.
    #[must_use]
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.feature.tags.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Add every tag in `tags`.
    #[must_use]
    pub fn tags(mut self, tags: Tags) -> Self {
        self.feature.tags.extend(tags);
        self
    }

    /// Set the stored version.
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.feature.version = version;
        self
    }

    /// Finish the feature.
    #[must_use]
    pub fn build(self) -> ExistingFeature {
        self.feature
    }
}

#[expect(
    clippy::float_arithmetic,
    reason = "square corners are offset from the south-west corner"
)]
fn square(corner: Coord<f64>, size: f64) -> Polygon<f64> {
    let east = offset(size, 0.0).x - ORIGIN.x;
    let north = offset(0.0, size).y - ORIGIN.y;
    Polygon::new(
        LineString::from(vec![
            corner,
            Coord {
                x: corner.x + east,
                y: corner.y,
            },
            Coord {
                x: corner.x + east,
                y: corner.y + north,
            },
            Coord {
                x: corner.x,
                y: corner.y + north,
            },
            corner,
        ]),
        Vec::new(),
    )
}

/// Errors raised by [`MemoryFeatureStore::apply_changeset`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryStoreError {
    /// A modification referenced a feature the store does not hold.
    #[error("{feature} is not in the store")]
    MissingFeature {
        /// The absent feature.
        feature: FeatureRef,
    },
    /// The stored version was not the one the modification was built from.
    #[error("{feature} is at version {stored}, expected {expected}")]
    VersionConflict {
        /// The conflicting feature.
        feature: FeatureRef,
        /// Version held by the store.
        stored: u32,
        /// Version the modification expected.
        expected: u32,
    },
}

/// In-memory `FeatureStore` implementation used in tests.
///
/// The store performs a linear scan and is intended only for small datasets.
#[derive(Default, Debug, Clone)]
pub struct MemoryFeatureStore {
    features: BTreeMap<FeatureRef, ExistingFeature>,
}

impl MemoryFeatureStore {
    /// Create a store containing a single feature.
    #[must_use]
    pub fn with_feature(feature: ExistingFeature) -> Self {
        Self::with_features(std::iter::once(feature))
    }

    /// Create a store from a collection of features.
    #[must_use]
    pub fn with_features<I>(features: I) -> Self
    where
        I: IntoIterator<Item = ExistingFeature>,
    {
        Self {
            features: features
                .into_iter()
                .map(|feature| (feature.feature_ref(), feature))
                .collect(),
        }
    }

    /// Look up a stored feature.
    #[must_use]
    pub fn get(&self, feature: FeatureRef) -> Option<&ExistingFeature> {
        self.features.get(&feature)
    }

    /// Number of stored features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FeatureStore for MemoryFeatureStore {
    type Error = std::convert::Infallible;

    fn features_in_area(&self, area: &AreaOfInterest) -> Result<Vec<ExistingFeature>, Self::Error> {
        let bounds = area.bounds();
        Ok(self
            .features
            .values()
            // `Intersects` treats boundary points as inside the rectangle.
            .filter(|feature| {
                feature
                    .geometry
                    .bounding_rect()
                    .is_some_and(|rect| rect.intersects(&bounds))
            })
            .cloned()
            .collect())
    }
}

impl ChangesetSink for MemoryFeatureStore {
    type Error = MemoryStoreError;

    fn apply_changeset(&mut self, conflation: &Conflation) -> Result<(), Self::Error> {
        let mut staged = self.features.clone();
        for modification in &conflation.modifications {
            let stored = staged
                .get_mut(&modification.feature)
                .ok_or(MemoryStoreError::MissingFeature {
                    feature: modification.feature,
                })?;
            let expected = modification.new_version.saturating_sub(1);
            if stored.version != expected {
                return Err(MemoryStoreError::VersionConflict {
                    feature: modification.feature,
                    stored: stored.version,
                    expected,
                });
            }
            stored.version = modification.new_version;
            stored.tags.clone_from(&modification.merged_tags);
        }

        let mut next_id = staged
            .keys()
            .filter(|feature| feature.kind == FeatureKind::Node)
            .map(|feature| feature.id)
            .max()
            .unwrap_or(0)
            .max(0);
        for record in &conflation.new_records {
            next_id += 1;
            let location = record.location.0;
            let feature = FeatureBuilder::node(next_id, location)
                .tags(record.tags.clone())
                .build();
            staged.insert(feature.feature_ref(), feature);
        }

        self.features = staged;
        Ok(())
    }
}
