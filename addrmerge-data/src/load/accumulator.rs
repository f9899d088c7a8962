//! Internal accumulator for OSM PBF loading.
//!
//! Collects every node, way and relation as a raw row ready for SQLite while
//! building the element summary.

use addrmerge_core::{FeatureKind, RelationMember, Tags};
use geo::Coord;
use osmpbf::{Element, RelMemberType};

use super::OsmLoadSummary;
use super::tags::collect_tags;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct NodeRow {
    pub(super) id: i64,
    pub(super) version: u32,
    pub(super) location: Coord<f64>,
    pub(super) tags: Tags,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct WayRow {
    pub(super) id: i64,
    pub(super) version: u32,
    pub(super) refs: Vec<i64>,
    pub(super) tags: Tags,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct RelationRow {
    pub(super) id: i64,
    pub(super) version: u32,
    pub(super) members: Vec<RelationMember>,
    pub(super) tags: Tags,
}

#[derive(Debug, Default)]
pub(super) struct ElementAccumulator {
    pub(super) summary: OsmLoadSummary,
    pub(super) nodes: Vec<NodeRow>,
    pub(super) ways: Vec<WayRow>,
    pub(super) relations: Vec<RelationRow>,
}

impl ElementAccumulator {
    pub(super) fn process_element(&mut self, element: Element<'_>) {
        match element {
            Element::Node(node) => self.process_node(
                node.id(),
                node.info().version(),
                node.lon(),
                node.lat(),
                node.tags(),
            ),
            Element::DenseNode(node) => self.process_node(
                node.id(),
                node.info().map(|info| info.version()),
                node.lon(),
                node.lat(),
                node.tags(),
            ),
            Element::Way(way) => {
                self.summary.record_way();
                self.ways.push(WayRow {
                    id: way.id(),
                    version: element_version(way.info().version()),
                    refs: way.refs().collect(),
                    tags: collect_tags(way.tags()),
                });
            }
            Element::Relation(relation) => {
                self.summary.record_relation();
                let members = relation
                    .members()
                    .map(|member| RelationMember {
                        kind: member_kind(&member.member_type),
                        id: member.member_id,
                        role: member.role().unwrap_or_default().to_owned(),
                    })
                    .collect();
                self.relations.push(RelationRow {
                    id: relation.id(),
                    version: element_version(relation.info().version()),
                    members,
                    tags: collect_tags(relation.tags()),
                });
            }
        }
    }

    fn process_node<'a, T>(&mut self, id: i64, version: Option<i32>, lon: f64, lat: f64, tags: T)
    where
        T: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let Some(location) = validated_coord(lon, lat) else {
            self.summary.skipped_nodes += 1;
            return;
        };
        self.summary.record_node(location);
        self.nodes.push(NodeRow {
            id,
            version: element_version(version),
            location,
            tags: collect_tags(tags),
        });
    }

    pub(super) fn combine(mut self, other: Self) -> Self {
        self.summary = self.summary.combine(other.summary);
        self.nodes.extend(other.nodes);
        self.ways.extend(other.ways);
        self.relations.extend(other.relations);
        self
    }

    /// Order rows by id so repeated loads write identical databases.
    pub(super) fn sort(&mut self) {
        self.nodes.sort_by_key(|row| row.id);
        self.ways.sort_by_key(|row| row.id);
        self.relations.sort_by_key(|row| row.id);
    }
}

/// Versions absent from the extract, or non-positive, load as version 1.
fn element_version(version: Option<i32>) -> u32 {
    version
        .and_then(|raw| u32::try_from(raw).ok())
        .filter(|parsed| *parsed > 0)
        .unwrap_or(1)
}

fn member_kind(member_type: &RelMemberType) -> FeatureKind {
    match member_type {
        RelMemberType::Node => FeatureKind::Node,
        RelMemberType::Way => FeatureKind::Way,
        RelMemberType::Relation => FeatureKind::Relation,
    }
}

pub(super) fn validated_coord(lon: f64, lat: f64) -> Option<Coord<f64>> {
    (lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat))
    .then_some(Coord { x: lon, y: lat })
}
