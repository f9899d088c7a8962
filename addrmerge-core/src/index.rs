//! In-memory spatial index over existing features.
//!
//! Features are held in an R\*-tree keyed by their bounding boxes, which
//! prefilters every geometric query; exact geodesic tests then run on the
//! survivors. A hash index over complete address triples serves the
//! exact-tag lookup.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use geo::{BoundingRect, Contains, Geometry, Intersects, Point, Polygon, Rect};
use log::warn;
use rstar::{AABB, RTree, RTreeObject};

use crate::feature::{AddressKey, ExistingFeature, FeatureKind, FeatureRef};
use crate::geometry::{degree_padding, geometry_distance};

type AddressTriple = (String, String, String);

/// Entry stored inside the R\*-tree: a slot into the feature list.
#[derive(Debug, Clone)]
struct IndexedFeature {
    slot: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A feature found by a range query, with its geodesic distance in metres.
#[derive(Debug, Clone, Copy)]
pub struct Nearby<'a> {
    /// The matching feature.
    pub feature: &'a ExistingFeature,
    /// Geodesic distance from the query geometry.
    pub distance: f64,
}

/// Read-only index over a snapshot of existing features.
pub struct SpatialIndex {
    features: Vec<ExistingFeature>,
    slots: HashMap<FeatureRef, usize>,
    addresses: HashMap<AddressTriple, Vec<usize>>,
    tree: RTree<IndexedFeature>,
}

impl fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("features", &self.features.len())
            .field("addresses", &self.addresses.len())
            .finish_non_exhaustive()
    }
}

impl SpatialIndex {
    /// Index a snapshot of features.
    ///
    /// A feature repeating an earlier `(kind, id)` is dropped with a warning;
    /// the store is expected to hand over each feature once.
    ///
    /// # Examples
    /// ```
    /// use geo::{Coord, Geometry, Point};
    /// use addrmerge_core::{ExistingFeature, FeatureKind, FeatureRef, SpatialIndex, Structure, Tags};
    ///
    /// let node = ExistingFeature {
    ///     id: 99,
    ///     geometry: Geometry::Point(Point::new(0.0, 0.0)),
    ///     tags: Tags::new(),
    ///     version: 3,
    ///     structure: Structure::Node(Coord { x: 0.0, y: 0.0 }),
    /// };
    /// let index = SpatialIndex::new([node]);
    /// assert!(index.get(FeatureRef::new(FeatureKind::Node, 99)).is_some());
    /// ```
    pub fn new<I>(features: I) -> Self
    where
        I: IntoIterator<Item = ExistingFeature>,
    {
        let mut stored = Vec::new();
        let mut slots = HashMap::new();
        for feature in features {
            match slots.entry(feature.feature_ref()) {
                Entry::Occupied(_) => {
                    warn!("Skipped duplicate feature {}", feature.feature_ref());
                }
                Entry::Vacant(entry) => {
                    entry.insert(stored.len());
                    stored.push(feature);
                }
            }
        }

        let mut addresses: HashMap<AddressTriple, Vec<usize>> = HashMap::new();
        let mut entries = Vec::with_capacity(stored.len());
        for (slot, feature) in stored.iter().enumerate() {
            if let Some((housenumber, street, city)) = feature.address().complete() {
                addresses
                    .entry((housenumber.to_owned(), street.to_owned(), city.to_owned()))
                    .or_default()
                    .push(slot);
            }
            if let Some(rect) = feature.geometry.bounding_rect() {
                entries.push(IndexedFeature {
                    slot,
                    envelope: envelope(rect),
                });
            }
        }

        Self {
            features: stored,
            slots,
            addresses,
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the index holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Look up a feature by identity.
    #[must_use]
    pub fn get(&self, feature: FeatureRef) -> Option<&ExistingFeature> {
        self.slots
            .get(&feature)
            .and_then(|slot| self.features.get(*slot))
    }

    /// Every indexed feature, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ExistingFeature> + '_ {
        self.features.iter()
    }

    /// Features whose complete address triple equals `key`.
    ///
    /// Returns nothing when `key` lacks any part; partial addresses never
    /// match.
    #[must_use]
    pub fn exact_address(&self, key: &AddressKey<'_>) -> Vec<&ExistingFeature> {
        let Some((housenumber, street, city)) = key.complete() else {
            return Vec::new();
        };
        let triple = (housenumber.to_owned(), street.to_owned(), city.to_owned());
        self.addresses
            .get(&triple)
            .map(|slots| {
                slots
                    .iter()
                    .filter_map(|slot| self.features.get(*slot))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Features within `metres` of `geometry`, optionally of one kind.
    ///
    /// Results are ordered by distance, then by feature identity.
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        reason = "the query envelope is padded by the search distance"
    )]
    pub fn within_distance(
        &self,
        geometry: &Geometry<f64>,
        metres: f64,
        kind: Option<FeatureKind>,
    ) -> Vec<Nearby<'_>> {
        let Some(rect) = geometry.bounding_rect() else {
            return Vec::new();
        };
        let latitude = rect.max().y.abs().max(rect.min().y.abs());
        let (lon_pad, lat_pad) = degree_padding(metres, latitude);
        let query = AABB::from_corners(
            [rect.min().x - lon_pad, rect.min().y - lat_pad],
            [rect.max().x + lon_pad, rect.max().y + lat_pad],
        );

        let mut found: Vec<Nearby<'_>> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .filter_map(|entry| self.features.get(entry.slot))
            .filter(|feature| kind.is_none_or(|wanted| feature.kind() == wanted))
            .filter_map(|feature| {
                let distance = geometry_distance(geometry, &feature.geometry);
                (distance <= metres).then_some(Nearby { feature, distance })
            })
            .collect();
        found.sort_by(|lhs, rhs| {
            lhs.distance
                .total_cmp(&rhs.distance)
                .then_with(|| lhs.feature.feature_ref().cmp(&rhs.feature.feature_ref()))
        });
        found
    }

    /// Polygonal features that contain `point`, ordered by identity.
    #[must_use]
    pub fn containing(&self, point: Point<f64>) -> Vec<&ExistingFeature> {
        let query = AABB::from_point([point.x(), point.y()]);
        let mut found: Vec<&ExistingFeature> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .filter_map(|entry| self.features.get(entry.slot))
            .filter(|feature| match &feature.geometry {
                Geometry::Polygon(polygon) => polygon.contains(&point),
                Geometry::MultiPolygon(polygons) => polygons.contains(&point),
                _ => false,
            })
            .collect();
        found.sort_by_key(|feature| feature.feature_ref());
        found
    }

    /// Features whose geometry intersects `polygon`, ordered by identity.
    ///
    /// The envelope overlap only prefilters; each survivor is tested exactly.
    #[must_use]
    pub fn intersecting(&self, polygon: &Polygon<f64>) -> Vec<&ExistingFeature> {
        let Some(rect) = polygon.bounding_rect() else {
            return Vec::new();
        };
        let mut found: Vec<&ExistingFeature> = self
            .tree
            .locate_in_envelope_intersecting(&envelope(rect))
            .filter_map(|entry| self.features.get(entry.slot))
            .filter(|feature| feature.geometry.intersects(polygon))
            .collect();
        found.sort_by_key(|feature| feature.feature_ref());
        found
    }
}

fn envelope(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}
