//! Test helpers for writing survey documents and seeding feature stores.

use std::fs;

use addrmerge_core::{
    ExistingFeature,
    test_support::{FeatureBuilder, MemoryFeatureStore, ORIGIN, offset},
};
use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use tempfile::TempDir;

/// A surveyed address to render into an OSM XML document.
pub(super) struct SurveyNode {
    pub(super) id: i64,
    pub(super) location: Coord<f64>,
    pub(super) housenumber: &'static str,
    pub(super) street: &'static str,
    pub(super) city: &'static str,
}

/// The survey used across CLI tests: one record two metres from node 1, one
/// exact repeat of node 2 and one address nobody has mapped yet.
pub(super) fn standard_survey() -> Vec<SurveyNode> {
    vec![
        SurveyNode {
            id: -1,
            location: offset(2.0, 0.0),
            housenumber: "12",
            street: "Main St",
            city: "Springfield",
        },
        SurveyNode {
            id: -2,
            location: offset(50.0, 0.0),
            housenumber: "14",
            street: "Main St",
            city: "Springfield",
        },
        SurveyNode {
            id: -3,
            location: offset(120.0, 0.0),
            housenumber: "99",
            street: "Elm St",
            city: "Springfield",
        },
    ]
}

/// Existing features matching [`standard_survey`]: node 1 lacks a city and
/// node 2 carries the full address.
pub(super) fn standard_features() -> Vec<ExistingFeature> {
    vec![
        FeatureBuilder::node(1, ORIGIN)
            .tag("addr:housenumber", "12")
            .tag("addr:street", "Main St")
            .version(3)
            .build(),
        FeatureBuilder::node(2, offset(50.0, 0.0))
            .tag("addr:housenumber", "14")
            .tag("addr:street", "Main St")
            .tag("addr:city", "Springfield")
            .build(),
    ]
}

pub(super) fn standard_store() -> MemoryFeatureStore {
    MemoryFeatureStore::with_features(standard_features())
}

pub(super) fn survey_xml(nodes: &[SurveyNode]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<osm version=\"0.6\" generator=\"survey\">\n",
    );
    for node in nodes {
        xml.push_str(&format!(
            "  <node id=\"{}\" lat=\"{:.7}\" lon=\"{:.7}\">\n    \
             <tag k=\"addr:housenumber\" v=\"{}\"/>\n    \
             <tag k=\"addr:street\" v=\"{}\"/>\n    \
             <tag k=\"addr:city\" v=\"{}\"/>\n  </node>\n",
            node.id, node.location.y, node.location.x, node.housenumber, node.street, node.city,
        ));
    }
    xml.push_str("</osm>\n");
    xml
}

/// A temporary directory addressed through UTF-8 paths.
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    /// Write the survey to `survey.osm` and return its path.
    pub(super) fn write_survey(&self, nodes: &[SurveyNode]) -> Utf8PathBuf {
        let path = self.path("survey.osm");
        write_utf8(&path, survey_xml(nodes).as_bytes());
        path
    }

    /// Create an empty placeholder for the feature database.
    pub(super) fn touch_database(&self) -> Utf8PathBuf {
        let path = self.path("features.db");
        write_utf8(&path, b"");
        path
    }
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    fs::write(path.as_std_path(), contents).expect("write test file");
}
