//! Loading OSM PBF extracts into the SQLite feature schema.
//!
//! Every node, way and relation is stored raw, with its version, so that the
//! [`SqliteFeatureStore`](addrmerge_core::SqliteFeatureStore) can rebuild
//! geometries and check versions when a changeset is applied.

use std::io;

use addrmerge_core::FeatureRef;
use camino::{Utf8Path, Utf8PathBuf};
use geo::{Coord, Rect};
use log::{info, warn};
use osmpbf::ElementReader;
use thiserror::Error;

mod accumulator;
mod sqlite;
mod tags;

use accumulator::ElementAccumulator;
pub(crate) use tags::collect_tags;

/// Summary of the elements written by [`load_osm_pbf`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OsmLoadSummary {
    /// Number of nodes stored, including dense-node entries.
    pub nodes: u64,
    /// Number of ways stored.
    pub ways: u64,
    /// Number of relations stored.
    pub relations: u64,
    /// Nodes dropped because their coordinates were unusable.
    pub skipped_nodes: u64,
    /// Bounding box covering all stored nodes, if any.
    /// Coordinates are WGS84 with `x = longitude`, `y = latitude`.
    pub bounds: Option<Rect<f64>>,
}

impl OsmLoadSummary {
    fn combine(mut self, other: Self) -> Self {
        self.nodes += other.nodes;
        self.ways += other.ways;
        self.relations += other.relations;
        self.skipped_nodes += other.skipped_nodes;
        if let Some(bounds) = other.bounds {
            self.include_bounds(bounds);
        }
        self
    }

    fn include_bounds(&mut self, bounds: Rect<f64>) {
        match &mut self.bounds {
            Some(existing) => {
                let min = Coord {
                    x: existing.min().x.min(bounds.min().x),
                    y: existing.min().y.min(bounds.min().y),
                };
                let max = Coord {
                    x: existing.max().x.max(bounds.max().x),
                    y: existing.max().y.max(bounds.max().y),
                };
                *existing = Rect::new(min, max);
            }
            None => self.bounds = Some(bounds),
        }
    }

    fn record_node(&mut self, location: Coord<f64>) {
        self.nodes += 1;
        self.include_bounds(Rect::new(location, location));
    }

    fn record_way(&mut self) {
        self.ways += 1;
    }

    fn record_relation(&mut self) {
        self.relations += 1;
    }
}

/// Errors returned when loading an OSM PBF file into SQLite.
#[derive(Debug, Error)]
pub enum OsmLoadError {
    /// The PBF file could not be opened.
    #[error("failed to open OSM PBF file at {path}")]
    Open {
        /// Location of the PBF file.
        path: Utf8PathBuf,
        /// Source error from `osmpbf`.
        #[source]
        source: osmpbf::Error,
    },
    /// The PBF file could not be decoded.
    #[error("failed to decode OSM PBF data at {path}")]
    Decode {
        /// Location of the PBF file.
        path: Utf8PathBuf,
        /// Source error from `osmpbf`.
        #[source]
        source: osmpbf::Error,
    },
    /// Failed to create the parent directory for the database.
    #[error("failed to create parent directory for {path}")]
    CreateDirectory {
        /// Database path whose parent could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}")]
    OpenDatabase {
        /// Destination database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Beginning the load transaction failed.
    #[error("failed to begin load transaction")]
    BeginTransaction {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Creating the element tables failed.
    #[error("failed to create feature schema")]
    CreateSchema {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Preparing an insert statement failed.
    #[error("failed to prepare load statement")]
    PrepareStatement {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Serialising element tags to JSON failed.
    #[error("failed to serialise tags for {feature}")]
    SerializeTags {
        /// Element whose tags failed to serialise.
        feature: FeatureRef,
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// Writing an element row failed.
    #[error("failed to persist {feature}")]
    PersistRow {
        /// Element being written.
        feature: FeatureRef,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Committing the load transaction failed.
    #[error("failed to commit load transaction")]
    Commit {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
}

/// Decode an OSM PBF extract and store its elements in a SQLite database.
///
/// The database is created if missing, together with its parent
/// directories. Loading is atomic: either every element is written or the
/// database is left untouched.
///
/// # Examples
/// ```no_run
/// use addrmerge_data::load_osm_pbf;
/// use camino::Utf8Path;
///
/// # fn main() -> Result<(), addrmerge_data::OsmLoadError> {
/// let summary = load_osm_pbf(Utf8Path::new("vancouver.osm.pbf"), Utf8Path::new("osm.db"))?;
/// assert!(summary.nodes >= summary.skipped_nodes);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Returns [`OsmLoadError`] when the extract cannot be read or when any
/// database step fails.
pub fn load_osm_pbf(pbf: &Utf8Path, database: &Utf8Path) -> Result<OsmLoadSummary, OsmLoadError> {
    let reader =
        ElementReader::from_path(pbf.as_std_path()).map_err(|source| OsmLoadError::Open {
            path: pbf.to_path_buf(),
            source,
        })?;

    let mut elements = reader
        .par_map_reduce(
            |element| {
                let mut accumulator = ElementAccumulator::default();
                accumulator.process_element(element);
                accumulator
            },
            ElementAccumulator::default,
            ElementAccumulator::combine,
        )
        .map_err(|source| OsmLoadError::Decode {
            path: pbf.to_path_buf(),
            source,
        })?;
    elements.sort();

    if elements.summary.skipped_nodes > 0 {
        warn!(
            "Skipped {} nodes with unusable coordinates",
            elements.summary.skipped_nodes
        );
    }

    sqlite::persist_elements(database, &elements)?;

    let summary = elements.summary;
    info!(
        "Loaded {} nodes, {} ways and {} relations from {pbf} into {database}",
        summary.nodes, summary.ways, summary.relations
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::decode_fixture;
    use addrmerge_core::{AreaOfInterest, FeatureKind, FeatureStore, SqliteFeatureStore};
    use rstest::rstest;
    use tempfile::TempDir;

    fn database(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("osm.db")).expect("utf-8 path")
    }

    #[rstest]
    #[expect(
        clippy::float_arithmetic,
        reason = "test compares fixture bounds within a tolerance"
    )]
    fn loads_fixture_into_sqlite() {
        let fixture = decode_fixture("springfield");
        let dir = TempDir::new().expect("create temp dir");
        let path = database(&dir);

        let summary = load_osm_pbf(&fixture.path, &path).expect("load fixture");

        assert_eq!(
            (summary.nodes, summary.ways, summary.relations, summary.skipped_nodes),
            (5, 1, 1, 0)
        );
        let bounds = summary.bounds.expect("bounds");
        assert!((bounds.min().x - 11.575).abs() < 1.0e-7);
        assert!((bounds.max().y - 48.1372).abs() < 1.0e-7);

        let store = SqliteFeatureStore::open(path.as_std_path()).expect("open store");
        let area = AreaOfInterest::from_bounds(11.57, 48.13, 11.58, 48.14).expect("area");
        let features = store.features_in_area(&area).expect("snapshot");
        let refs: Vec<_> = features
            .iter()
            .map(|feature| (feature.kind(), feature.id, feature.version))
            .collect();
        assert_eq!(
            refs,
            vec![
                (FeatureKind::Node, 1, 3),
                (FeatureKind::Way, 10, 2),
                (FeatureKind::Relation, 30, 1),
            ]
        );
    }

    #[rstest]
    fn invalid_payloads_leave_no_database() {
        let fixture = decode_fixture("invalid");
        let dir = TempDir::new().expect("create temp dir");
        let path = database(&dir);

        let err = load_osm_pbf(&fixture.path, &path).expect_err("invalid data");
        assert!(matches!(err, OsmLoadError::Decode { .. }));
        assert!(!path.exists());
    }

    #[rstest]
    fn summaries_combine_counts_and_bounds() {
        let mut left = OsmLoadSummary::default();
        left.record_node(Coord { x: 1.0, y: 1.0 });
        left.record_way();
        let mut right = OsmLoadSummary::default();
        right.record_node(Coord { x: -1.0, y: 2.0 });
        right.record_relation();
        right.skipped_nodes = 2;

        let combined = left.combine(right);
        assert_eq!(
            (combined.nodes, combined.ways, combined.relations, combined.skipped_nodes),
            (2, 1, 1, 2)
        );
        assert_eq!(
            combined.bounds,
            Some(Rect::new(Coord { x: -1.0, y: 1.0 }, Coord { x: 1.0, y: 2.0 }))
        );
    }
}
