//! Data access traits for existing features and changeset application.
//!
//! The [`FeatureStore`] trait defines a read-only interface for retrieving a
//! snapshot of [`ExistingFeature`] values inside an [`AreaOfInterest`].
//! [`ChangesetSink`] is its write-side counterpart: it applies a finished
//! [`Conflation`] atomically.

use crate::{AreaOfInterest, Conflation, ExistingFeature};

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::{FEATURE_SCHEMA, SqliteFeatureStore, SqliteFeatureStoreError};

/// Read-only access to existing features.
///
/// Implementations return a consistent snapshot: every feature whose geometry
/// touches the area, with ways and multipolygon relations already turned
/// into geometries. The area uses WGS84 coordinates (`x = longitude`,
/// `y = latitude`) and never crosses the antimeridian.
///
/// # Examples
///
/// ```rust
/// use geo::{BoundingRect, Coord, Geometry, Intersects, Point};
/// use addrmerge_core::{AreaOfInterest, ExistingFeature, FeatureStore, Structure, Tags};
///
/// struct VecStore {
///     features: Vec<ExistingFeature>,
/// }
///
/// impl FeatureStore for VecStore {
///     type Error = std::convert::Infallible;
///
///     fn features_in_area(
///         &self,
///         area: &AreaOfInterest,
///     ) -> Result<Vec<ExistingFeature>, Self::Error> {
///         Ok(self
///             .features
///             .iter()
///             .filter(|f| {
///                 f.geometry
///                     .bounding_rect()
///                     .is_some_and(|rect| rect.intersects(&area.bounds()))
///             })
///             .cloned()
///             .collect())
///     }
/// }
///
/// let node = ExistingFeature {
///     id: 1,
///     geometry: Geometry::Point(Point::new(0.0, 0.0)),
///     tags: Tags::new(),
///     version: 1,
///     structure: Structure::Node(Coord { x: 0.0, y: 0.0 }),
/// };
/// let store = VecStore { features: vec![node.clone()] };
/// let area = AreaOfInterest::from_bounds(-1.0, -1.0, 1.0, 1.0).expect("valid area");
/// assert_eq!(store.features_in_area(&area).expect("infallible"), vec![node]);
/// ```
pub trait FeatureStore {
    /// Failure raised when the snapshot cannot be read.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Return every feature whose geometry touches `area`.
    ///
    /// Containment includes boundary points.
    fn features_in_area(&self, area: &AreaOfInterest) -> Result<Vec<ExistingFeature>, Self::Error>;
}

/// Destination for a finished changeset.
///
/// Implementations must be atomic: on error, nothing of the changeset is
/// visible afterwards.
pub trait ChangesetSink {
    /// Failure raised when the changeset cannot be applied.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Apply every modification and create every new record.
    fn apply_changeset(&mut self, conflation: &Conflation) -> Result<(), Self::Error>;
}
