//! Existing features and the OSM-style tags they carry.

use std::collections::BTreeMap;
use std::fmt;

use geo::{Coord, Geometry};

/// Free-form key/value tags, ordered by key so emitted documents are stable.
pub type Tags = BTreeMap<String, String>;

/// Tag holding the house number of an address.
pub const HOUSENUMBER_KEY: &str = "addr:housenumber";
/// Tag holding the street name of an address.
pub const STREET_KEY: &str = "addr:street";
/// Tag holding the city of an address.
pub const CITY_KEY: &str = "addr:city";
/// Tag marking a feature as a building.
pub const BUILDING_KEY: &str = "building";

/// The three element types an existing feature may have.
///
/// Relations are always multipolygon relations; other relation types are not
/// loaded by the feature store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FeatureKind {
    /// A single node.
    Node,
    /// An ordered list of nodes, polygonal when closed.
    Way,
    /// A multipolygon relation built from member ways.
    Relation,
}

impl FeatureKind {
    /// Every kind, in the order matchers visit them.
    pub const ALL: [Self; 3] = [Self::Node, Self::Way, Self::Relation];

    /// Lower-case OSM element name (`node`, `way`, `relation`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }

    /// Parse an OSM element name.
    #[must_use]
    pub fn from_osm_name(name: &str) -> Option<Self> {
        match name {
            "node" => Some(Self::Node),
            "way" => Some(Self::Way),
            "relation" => Some(Self::Relation),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an existing feature: OSM ids are only unique per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureRef {
    /// Element type.
    pub kind: FeatureKind,
    /// Identifier within `kind`.
    pub id: i64,
}

impl FeatureRef {
    /// Build a reference from its parts.
    #[must_use]
    pub const fn new(kind: FeatureKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for FeatureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Member of a multipolygon relation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelationMember {
    /// Element type of the member.
    pub kind: FeatureKind,
    /// Member identifier.
    pub id: i64,
    /// Role within the relation, usually `outer` or `inner`.
    pub role: String,
}

/// Structural payload carried through modifications untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    /// Node position (`x = longitude`, `y = latitude`).
    Node(Coord<f64>),
    /// Ordered node references of a way.
    Way(Vec<i64>),
    /// Ordered members of a relation.
    Relation(Vec<RelationMember>),
}

impl Structure {
    /// Element type implied by the payload.
    #[must_use]
    pub const fn kind(&self) -> FeatureKind {
        match self {
            Self::Node(_) => FeatureKind::Node,
            Self::Way(_) => FeatureKind::Way,
            Self::Relation(_) => FeatureKind::Relation,
        }
    }
}

/// A feature from the pre-existing dataset.
///
/// Geometry is already reconstructed: a point for nodes, a polygon for closed
/// ways and closed multipolygon relations, a linestring otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingFeature {
    /// Stable external identifier, unique per kind.
    pub id: i64,
    /// Reconstructed WGS84 geometry.
    pub geometry: Geometry<f64>,
    /// Current tags.
    pub tags: Tags,
    /// Current version, starting at 1.
    pub version: u32,
    /// Node position, way node list or relation member list.
    pub structure: Structure,
}

impl ExistingFeature {
    /// Element type of this feature.
    #[must_use]
    pub const fn kind(&self) -> FeatureKind {
        self.structure.kind()
    }

    /// Identity of this feature.
    #[must_use]
    pub const fn feature_ref(&self) -> FeatureRef {
        FeatureRef::new(self.kind(), self.id)
    }

    /// The feature's address triple.
    #[must_use]
    pub fn address(&self) -> AddressKey<'_> {
        AddressKey::from_tags(&self.tags)
    }

    /// Whether the feature carries a house number.
    #[must_use]
    pub fn is_addressed(&self) -> bool {
        self.tags.contains_key(HOUSENUMBER_KEY)
    }

    /// Whether the feature is tagged as a building (`building=no` is not).
    #[must_use]
    pub fn is_building(&self) -> bool {
        self.tags
            .get(BUILDING_KEY)
            .is_some_and(|value| value != "no")
    }
}

/// Borrowed view of the address tags of a record or feature.
///
/// Missing tags are `None`, and comparisons treat `None` like SQL `NULL`: it
/// never equals anything, including another `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressKey<'a> {
    /// `addr:housenumber`.
    pub housenumber: Option<&'a str>,
    /// `addr:street`.
    pub street: Option<&'a str>,
    /// `addr:city`.
    pub city: Option<&'a str>,
}

impl<'a> AddressKey<'a> {
    /// Extract the address triple from a tag map.
    #[must_use]
    pub fn from_tags(tags: &'a Tags) -> Self {
        Self {
            housenumber: tags.get(HOUSENUMBER_KEY).map(String::as_str),
            street: tags.get(STREET_KEY).map(String::as_str),
            city: tags.get(CITY_KEY).map(String::as_str),
        }
    }

    /// The full triple, when every part is present.
    #[must_use]
    pub fn complete(&self) -> Option<(&'a str, &'a str, &'a str)> {
        Some((self.housenumber?, self.street?, self.city?))
    }

    /// House number and street, when both are present.
    #[must_use]
    pub fn street_address(&self) -> Option<(&'a str, &'a str)> {
        Some((self.housenumber?, self.street?))
    }

    /// All three parts present and equal on both sides.
    #[must_use]
    pub fn matches_exactly(&self, other: &AddressKey<'_>) -> bool {
        match (self.complete(), other.complete()) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => false,
        }
    }

    /// House number and street present and equal on both sides; city ignored.
    #[must_use]
    pub fn matches_ignoring_city(&self, other: &AddressKey<'_>) -> bool {
        match (self.street_address(), other.street_address()) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}
