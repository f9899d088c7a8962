//! SQLite-backed feature store and changeset sink.
//!
//! The database holds raw OSM elements: nodes with coordinates, ways as
//! ordered node lists and relations as ordered member lists. Tags are stored
//! as JSON objects. Geometries are rebuilt on every snapshot.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::{Path, PathBuf},
};

use geo::{Coord, Geometry, LineString, Point};
use log::{debug, warn};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, params_from_iter};
use thiserror::Error;

use crate::feature::{ExistingFeature, FeatureKind, FeatureRef, RelationMember, Structure, Tags};
use crate::geometry::{relation_geometry, way_geometry};
use crate::{AreaOfInterest, Conflation};

use super::{ChangesetSink, FeatureStore};

/// SQLite limits bound parameters per statement to 999 by default. The store
/// chunks `IN` queries to remain below that ceiling.
const SQLITE_MAX_VARIABLE_NUMBER: usize = 999;

/// Tables holding raw OSM elements.
pub const FEATURE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS nodes (
        id INTEGER PRIMARY KEY,
        version INTEGER NOT NULL,
        lon REAL NOT NULL,
        lat REAL NOT NULL,
        tags TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS nodes_lon_lat ON nodes (lon, lat);
    CREATE TABLE IF NOT EXISTS ways (
        id INTEGER PRIMARY KEY,
        version INTEGER NOT NULL,
        tags TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS way_nodes (
        way_id INTEGER NOT NULL,
        node_id INTEGER NOT NULL,
        sequence_id INTEGER NOT NULL,
        PRIMARY KEY (way_id, sequence_id)
    );
    CREATE INDEX IF NOT EXISTS way_nodes_node ON way_nodes (node_id);
    CREATE TABLE IF NOT EXISTS relations (
        id INTEGER PRIMARY KEY,
        version INTEGER NOT NULL,
        tags TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS relation_members (
        relation_id INTEGER NOT NULL,
        member_type TEXT NOT NULL,
        member_id INTEGER NOT NULL,
        member_role TEXT NOT NULL,
        sequence_id INTEGER NOT NULL,
        PRIMARY KEY (relation_id, sequence_id)
    );
    CREATE INDEX IF NOT EXISTS relation_members_member
        ON relation_members (member_type, member_id);
";

/// Error raised when reading features from, or writing changesets to, SQLite.
#[derive(Debug, Error)]
pub enum SqliteFeatureStoreError {
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}: {source}")]
    OpenDatabase {
        /// Location of the SQLite database on disk.
        path: PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Creating the element tables failed.
    #[error("failed to create feature schema: {source}")]
    CreateSchema {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// The stored tag payload was not valid JSON.
    #[error("failed to parse tags for {feature}: {source}")]
    InvalidTags {
        /// Element whose tags failed to parse.
        feature: FeatureRef,
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// Serialising merged tags to JSON failed.
    #[error("failed to serialise tags for {feature}: {source}")]
    SerializeTags {
        /// Element whose tags failed to serialise.
        feature: FeatureRef,
        /// JSON encoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// A relation member carried an unknown element type.
    #[error("relation {relation_id} has a member of unknown type {member_type:?}")]
    InvalidMemberType {
        /// Relation holding the member.
        relation_id: i64,
        /// Type as stored.
        member_type: String,
    },
    /// A modification referenced an element the database does not hold.
    #[error("{feature} is not in the database")]
    MissingFeature {
        /// The absent element.
        feature: FeatureRef,
    },
    /// The stored version differs from the one the modification was built on.
    #[error("{feature} is at version {stored}, expected {expected}")]
    VersionConflict {
        /// The conflicting element.
        feature: FeatureRef,
        /// Version held by the database.
        stored: u32,
        /// Version the modification expected.
        expected: u32,
    },
    /// Beginning the changeset transaction failed.
    #[error("failed to begin changeset transaction: {source}")]
    BeginTransaction {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Committing the changeset transaction failed.
    #[error("failed to commit changeset transaction: {source}")]
    Commit {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Generic SQLite error when reading or writing element rows.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

/// Feature store backed by an SQLite database of raw OSM elements.
pub struct SqliteFeatureStore {
    connection: Connection,
    path: PathBuf,
}

impl fmt::Debug for SqliteFeatureStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteFeatureStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteFeatureStore {
    /// Open an existing database for reading only.
    ///
    /// # Errors
    /// Fails when the file cannot be opened as an SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SqliteFeatureStoreError> {
        Self::open_with_flags(path.as_ref(), OpenFlags::SQLITE_OPEN_READ_ONLY)
    }

    /// Open an existing database for reading and changeset application.
    ///
    /// # Errors
    /// Fails when the file cannot be opened as an SQLite database.
    pub fn open_writable<P: AsRef<Path>>(path: P) -> Result<Self, SqliteFeatureStoreError> {
        Self::open_with_flags(path.as_ref(), OpenFlags::SQLITE_OPEN_READ_WRITE)
    }

    /// Open or create a database and initialise its tables.
    ///
    /// # Errors
    /// Fails when the database cannot be opened or the schema cannot be
    /// created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SqliteFeatureStoreError> {
        let store = Self::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        store
            .connection
            .execute_batch(FEATURE_SCHEMA)
            .map_err(|source| SqliteFeatureStoreError::CreateSchema { source })?;
        Ok(store)
    }

    fn open_with_flags(path: &Path, flags: OpenFlags) -> Result<Self, SqliteFeatureStoreError> {
        let connection = Connection::open_with_flags(path, flags).map_err(|source| {
            SqliteFeatureStoreError::OpenDatabase {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    /// Location of the database on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeatureStore for SqliteFeatureStore {
    type Error = SqliteFeatureStoreError;

    /// Read the snapshot inside one deferred transaction so every query
    /// sees the same database state.
    fn features_in_area(&self, area: &AreaOfInterest) -> Result<Vec<ExistingFeature>, Self::Error> {
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(|source| SqliteFeatureStoreError::BeginTransaction { source })?;
        let features = read_snapshot(&transaction, area)?;
        transaction
            .commit()
            .map_err(|source| SqliteFeatureStoreError::Commit { source })?;
        debug!(
            "Loaded {} feature(s) from {}",
            features.len(),
            self.path.display()
        );
        Ok(features)
    }
}

impl ChangesetSink for SqliteFeatureStore {
    type Error = SqliteFeatureStoreError;

    /// Apply a conflation inside one transaction.
    ///
    /// Every modification is checked against the stored version first; a
    /// mismatch aborts the whole changeset. New records become version 1
    /// nodes numbered after the highest existing node id.
    fn apply_changeset(&mut self, conflation: &Conflation) -> Result<(), Self::Error> {
        let transaction = self
            .connection
            .transaction()
            .map_err(|source| SqliteFeatureStoreError::BeginTransaction { source })?;

        apply_modifications(&transaction, conflation)?;
        let created = insert_new_records(&transaction, conflation)?;

        transaction
            .commit()
            .map_err(|source| SqliteFeatureStoreError::Commit { source })?;
        debug!(
            "Applied {} modification(s) and {created} new node(s) to {}",
            conflation.modifications.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[derive(Debug)]
struct WayRow {
    version: u32,
    tags: Tags,
    refs: Vec<i64>,
}

#[derive(Debug)]
struct RelationRow {
    version: u32,
    tags: Tags,
    members: Vec<RelationMember>,
}

/// Elements loaded so far, used to resolve way and relation geometries.
#[derive(Debug, Default)]
struct Snapshot {
    coords: HashMap<i64, Coord<f64>>,
    ways: BTreeMap<i64, WayRow>,
}

impl Snapshot {
    fn way_line(&self, way_id: i64) -> Option<LineString<f64>> {
        let way = self.ways.get(&way_id)?;
        let coords = way
            .refs
            .iter()
            .map(|node_id| self.coords.get(node_id).copied())
            .collect::<Option<Vec<_>>>()?;
        Some(LineString::from(coords))
    }

    fn way_feature(&self, way_id: i64) -> Option<ExistingFeature> {
        let way = self.ways.get(&way_id)?;
        if way.tags.is_empty() {
            return None;
        }
        let Some(geometry) = way_geometry(&way.refs, |node_id| self.coords.get(&node_id).copied())
        else {
            warn!("Skipped way {way_id} with unresolved node references");
            return None;
        };
        Some(ExistingFeature {
            id: way_id,
            geometry,
            tags: way.tags.clone(),
            version: way.version,
            structure: Structure::Way(way.refs.clone()),
        })
    }

    fn relation_feature(&self, id: i64, relation: RelationRow) -> Option<ExistingFeature> {
        let lines = relation
            .members
            .iter()
            .filter(|member| member.kind == FeatureKind::Way)
            .map(|member| self.way_line(member.id))
            .collect::<Option<Vec<_>>>();
        let Some(geometry) = lines.and_then(|lines| relation_geometry(lines.iter())) else {
            warn!("Skipped relation {id} with unresolved member ways");
            return None;
        };
        Some(ExistingFeature {
            id,
            geometry,
            tags: relation.tags,
            version: relation.version,
            structure: Structure::Relation(relation.members),
        })
    }
}

fn read_snapshot(
    connection: &Connection,
    area: &AreaOfInterest,
) -> Result<Vec<ExistingFeature>, SqliteFeatureStoreError> {
    let mut snapshot = Snapshot::default();
    let bounds = area.bounds();
    let corners = [
        bounds.min().x,
        bounds.min().y,
        bounds.max().x,
        bounds.max().y,
    ];

    let mut features = load_nodes_in_area(connection, corners, &mut snapshot)?;

    let way_ids = way_ids_in_area(connection, corners)?;
    load_ways(connection, &way_ids, &mut snapshot)?;
    for way_id in &way_ids {
        if let Some(feature) = snapshot.way_feature(*way_id) {
            features.push(feature);
        }
    }

    let relation_ids = multipolygons_with_ways(connection, &way_ids)?;
    let relations = load_relations(connection, &relation_ids)?;
    let member_ways: Vec<i64> = relations
        .values()
        .flat_map(|relation| relation.members.iter())
        .filter(|member| member.kind == FeatureKind::Way)
        .map(|member| member.id)
        .filter(|id| !snapshot.ways.contains_key(id))
        .collect();
    load_ways(connection, &member_ways, &mut snapshot)?;
    for (id, relation) in relations {
        if let Some(feature) = snapshot.relation_feature(id, relation) {
            features.push(feature);
        }
    }

    features.sort_by_key(ExistingFeature::feature_ref);
    Ok(features)
}

fn parse_tags(feature: FeatureRef, json: &str) -> Result<Tags, SqliteFeatureStoreError> {
    serde_json::from_str(json)
        .map_err(|source| SqliteFeatureStoreError::InvalidTags { feature, source })
}

fn load_nodes_in_area(
    connection: &Connection,
    corners: [f64; 4],
    snapshot: &mut Snapshot,
) -> Result<Vec<ExistingFeature>, SqliteFeatureStoreError> {
    let mut statement = connection.prepare(
        "SELECT id, version, lon, lat, tags FROM nodes
         WHERE lon BETWEEN ?1 AND ?3 AND lat BETWEEN ?2 AND ?4",
    )?;
    let mut rows = statement.query(params_from_iter(corners.iter()))?;
    let mut features = Vec::new();
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let version: u32 = row.get(1)?;
        let location = Coord {
            x: row.get(2)?,
            y: row.get(3)?,
        };
        let tags_json: String = row.get(4)?;
        snapshot.coords.insert(id, location);
        let tags = parse_tags(FeatureRef::new(FeatureKind::Node, id), &tags_json)?;
        if tags.is_empty() {
            continue;
        }
        features.push(ExistingFeature {
            id,
            geometry: Geometry::Point(Point::from(location)),
            tags,
            version,
            structure: Structure::Node(location),
        });
    }
    Ok(features)
}

fn way_ids_in_area(
    connection: &Connection,
    corners: [f64; 4],
) -> Result<Vec<i64>, SqliteFeatureStoreError> {
    let mut statement = connection.prepare(
        "SELECT DISTINCT way_nodes.way_id FROM way_nodes
         JOIN nodes ON nodes.id = way_nodes.node_id
         WHERE nodes.lon BETWEEN ?1 AND ?3 AND nodes.lat BETWEEN ?2 AND ?4
         ORDER BY way_nodes.way_id",
    )?;
    let ids = statement
        .query_map(params_from_iter(corners.iter()), |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn load_ways(
    connection: &Connection,
    ids: &[i64],
    snapshot: &mut Snapshot,
) -> Result<(), SqliteFeatureStoreError> {
    for chunk in ids.chunks(SQLITE_MAX_VARIABLE_NUMBER) {
        let query = format!(
            "SELECT id, version, tags FROM ways WHERE id IN ({})",
            placeholders(chunk.len())
        );
        let mut statement = connection.prepare(&query)?;
        let mut rows = statement.query(params_from_iter(chunk.iter()))?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let version: u32 = row.get(1)?;
            let tags_json: String = row.get(2)?;
            let tags = parse_tags(FeatureRef::new(FeatureKind::Way, id), &tags_json)?;
            snapshot.ways.insert(
                id,
                WayRow {
                    version,
                    tags,
                    refs: Vec::new(),
                },
            );
        }

        let query = format!(
            "SELECT way_id, node_id FROM way_nodes WHERE way_id IN ({})
             ORDER BY way_id, sequence_id",
            placeholders(chunk.len())
        );
        let mut statement = connection.prepare(&query)?;
        let mut rows = statement.query(params_from_iter(chunk.iter()))?;
        while let Some(row) = rows.next()? {
            let way_id: i64 = row.get(0)?;
            let node_id: i64 = row.get(1)?;
            if let Some(way) = snapshot.ways.get_mut(&way_id) {
                way.refs.push(node_id);
            }
        }
    }

    let missing: Vec<i64> = ids
        .iter()
        .filter_map(|id| snapshot.ways.get(id))
        .flat_map(|way| way.refs.iter().copied())
        .filter(|node_id| !snapshot.coords.contains_key(node_id))
        .collect();
    load_coords(connection, &missing, snapshot)
}

fn load_coords(
    connection: &Connection,
    ids: &[i64],
    snapshot: &mut Snapshot,
) -> Result<(), SqliteFeatureStoreError> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    for chunk in ids.chunks(SQLITE_MAX_VARIABLE_NUMBER) {
        let query = format!(
            "SELECT id, lon, lat FROM nodes WHERE id IN ({})",
            placeholders(chunk.len())
        );
        let mut statement = connection.prepare(&query)?;
        let mut rows = statement.query(params_from_iter(chunk.iter()))?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            snapshot.coords.insert(
                id,
                Coord {
                    x: row.get(1)?,
                    y: row.get(2)?,
                },
            );
        }
    }
    Ok(())
}

fn multipolygons_with_ways(
    connection: &Connection,
    way_ids: &[i64],
) -> Result<Vec<i64>, SqliteFeatureStoreError> {
    let mut ids = Vec::new();
    for chunk in way_ids.chunks(SQLITE_MAX_VARIABLE_NUMBER) {
        let query = format!(
            "SELECT DISTINCT relation_id FROM relation_members
             WHERE member_type = 'way' AND member_id IN ({})",
            placeholders(chunk.len())
        );
        let mut statement = connection.prepare(&query)?;
        let found = statement
            .query_map(params_from_iter(chunk.iter()), |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids.extend(found);
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn load_relations(
    connection: &Connection,
    ids: &[i64],
) -> Result<BTreeMap<i64, RelationRow>, SqliteFeatureStoreError> {
    let mut relations = BTreeMap::new();
    for chunk in ids.chunks(SQLITE_MAX_VARIABLE_NUMBER) {
        let query = format!(
            "SELECT id, version, tags FROM relations WHERE id IN ({})",
            placeholders(chunk.len())
        );
        let mut statement = connection.prepare(&query)?;
        let mut rows = statement.query(params_from_iter(chunk.iter()))?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let version: u32 = row.get(1)?;
            let tags_json: String = row.get(2)?;
            let tags = parse_tags(FeatureRef::new(FeatureKind::Relation, id), &tags_json)?;
            if tags.get("type").map(String::as_str) != Some("multipolygon") {
                continue;
            }
            relations.insert(
                id,
                RelationRow {
                    version,
                    tags,
                    members: Vec::new(),
                },
            );
        }

        let query = format!(
            "SELECT relation_id, member_type, member_id, member_role FROM relation_members
             WHERE relation_id IN ({}) ORDER BY relation_id, sequence_id",
            placeholders(chunk.len())
        );
        let mut statement = connection.prepare(&query)?;
        let mut rows = statement.query(params_from_iter(chunk.iter()))?;
        while let Some(row) = rows.next()? {
            let relation_id: i64 = row.get(0)?;
            let member_type: String = row.get(1)?;
            let Some(relation) = relations.get_mut(&relation_id) else {
                continue;
            };
            let kind = FeatureKind::from_osm_name(&member_type).ok_or(
                SqliteFeatureStoreError::InvalidMemberType {
                    relation_id,
                    member_type: member_type.clone(),
                },
            )?;
            relation.members.push(RelationMember {
                kind,
                id: row.get(2)?,
                role: row.get(3)?,
            });
        }
    }
    Ok(relations)
}

const fn table_for(kind: FeatureKind) -> &'static str {
    match kind {
        FeatureKind::Node => "nodes",
        FeatureKind::Way => "ways",
        FeatureKind::Relation => "relations",
    }
}

fn apply_modifications(
    transaction: &Transaction<'_>,
    conflation: &Conflation,
) -> Result<(), SqliteFeatureStoreError> {
    for modification in &conflation.modifications {
        let feature = modification.feature;
        let table = table_for(feature.kind);
        let stored: Option<u32> = transaction
            .query_row(
                &format!("SELECT version FROM {table} WHERE id = ?1"),
                [feature.id],
                |row| row.get(0),
            )
            .optional()?;
        let stored = stored.ok_or(SqliteFeatureStoreError::MissingFeature { feature })?;
        let expected = modification.new_version.saturating_sub(1);
        if stored != expected {
            return Err(SqliteFeatureStoreError::VersionConflict {
                feature,
                stored,
                expected,
            });
        }
        let tags = serde_json::to_string(&modification.merged_tags)
            .map_err(|source| SqliteFeatureStoreError::SerializeTags { feature, source })?;
        transaction.execute(
            &format!("UPDATE {table} SET version = ?1, tags = ?2 WHERE id = ?3"),
            (modification.new_version, tags, feature.id),
        )?;
    }
    Ok(())
}

fn insert_new_records(
    transaction: &Transaction<'_>,
    conflation: &Conflation,
) -> Result<usize, SqliteFeatureStoreError> {
    if conflation.new_records.is_empty() {
        return Ok(0);
    }
    let highest: i64 = transaction.query_row(
        "SELECT COALESCE(MAX(id), 0) FROM nodes",
        [],
        |row| row.get(0),
    )?;
    let mut statement = transaction.prepare(
        "INSERT INTO nodes (id, version, lon, lat, tags) VALUES (?1, 1, ?2, ?3, ?4)",
    )?;
    let mut next_id = highest.max(0);
    for record in &conflation.new_records {
        next_id += 1;
        let feature = FeatureRef::new(FeatureKind::Node, next_id);
        let tags = serde_json::to_string(&record.tags)
            .map_err(|source| SqliteFeatureStoreError::SerializeTags { feature, source })?;
        statement.execute((next_id, record.location.x(), record.location.y(), tags))?;
    }
    Ok(conflation.new_records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::offset;
    use crate::{AddressRecord, ImportBatch, MatchOptions, SpatialIndex, conflate};
    use rstest::{fixture, rstest};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn insert_node(connection: &Connection, id: i64, location: Coord<f64>, tags: &str) {
        connection
            .execute(
                "INSERT INTO nodes (id, version, lon, lat, tags) VALUES (?1, 1, ?2, ?3, ?4)",
                (id, location.x, location.y, tags),
            )
            .expect("insert node");
    }

    fn insert_way(connection: &Connection, id: i64, refs: &[i64], tags: &str) {
        connection
            .execute(
                "INSERT INTO ways (id, version, tags) VALUES (?1, 3, ?2)",
                (id, tags),
            )
            .expect("insert way");
        for (sequence, node_id) in refs.iter().enumerate() {
            connection
                .execute(
                    "INSERT INTO way_nodes (way_id, node_id, sequence_id) VALUES (?1, ?2, ?3)",
                    (id, node_id, i64::try_from(sequence).expect("small sequence")),
                )
                .expect("insert way node");
        }
    }

    /// A tagged node, a closed building way, and a multipolygon relation whose
    /// single member way sits partly outside the query area.
    #[fixture]
    fn database() -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("features.db");
        let store = SqliteFeatureStore::create(&path).expect("create store");
        let connection = &store.connection;

        insert_node(
            connection,
            1,
            offset(0.0, 0.0),
            r#"{"addr:housenumber":"12","addr:street":"Main St"}"#,
        );
        for (id, east, north) in [(11, 20.0, 0.0), (12, 40.0, 0.0), (13, 40.0, 20.0), (14, 20.0, 20.0)] {
            insert_node(connection, id, offset(east, north), "{}");
        }
        insert_way(connection, 10, &[11, 12, 13, 14, 11], r#"{"building":"yes"}"#);

        for (id, east, north) in [(21, 60.0, 0.0), (22, 5_000.0, 0.0), (23, 5_000.0, 20.0), (24, 60.0, 20.0)] {
            insert_node(connection, id, offset(east, north), "{}");
        }
        insert_way(connection, 20, &[21, 22, 23, 24, 21], "{}");
        connection
            .execute(
                "INSERT INTO relations (id, version, tags) VALUES (30, 2, ?1)",
                [r#"{"type":"multipolygon","building":"yes"}"#],
            )
            .expect("insert relation");
        connection
            .execute(
                "INSERT INTO relation_members
                 (relation_id, member_type, member_id, member_role, sequence_id)
                 VALUES (30, 'way', 20, 'outer', 0)",
                [],
            )
            .expect("insert member");
        (dir, path)
    }

    fn area() -> AreaOfInterest {
        let min = offset(-100.0, -100.0);
        let max = offset(100.0, 100.0);
        AreaOfInterest::from_bounds(min.x, min.y, max.x, max.y).expect("valid area")
    }

    #[rstest]
    fn snapshot_rebuilds_every_kind(database: (TempDir, PathBuf)) {
        let (_dir, path) = database;
        let store = SqliteFeatureStore::open(&path).expect("open store");
        let features = store.features_in_area(&area()).expect("load features");

        let refs: Vec<FeatureRef> = features.iter().map(ExistingFeature::feature_ref).collect();
        assert_eq!(
            refs,
            vec![
                FeatureRef::new(FeatureKind::Node, 1),
                FeatureRef::new(FeatureKind::Way, 10),
                FeatureRef::new(FeatureKind::Relation, 30),
            ]
        );
        assert!(matches!(features[1].geometry, Geometry::Polygon(_)));
        assert!(matches!(features[2].geometry, Geometry::Polygon(_)));
        assert_eq!(features[1].version, 3);
        assert!(matches!(
            &features[2].structure,
            Structure::Relation(members) if members.len() == 1 && members[0].role == "outer"
        ));
    }

    #[rstest]
    fn snapshot_reads_run_in_their_own_transaction(database: (TempDir, PathBuf)) {
        let (_dir, path) = database;
        let store = SqliteFeatureStore::open(&path).expect("open store");

        store.features_in_area(&area()).expect("load features");
        assert!(store.connection.is_autocommit(), "read transaction left open");

        store.connection.execute_batch("BEGIN").expect("begin outer transaction");
        let error = store
            .features_in_area(&area())
            .expect_err("a snapshot cannot nest inside another transaction");
        assert!(matches!(error, SqliteFeatureStoreError::BeginTransaction { .. }));
    }

    #[rstest]
    fn ways_with_missing_nodes_are_skipped(database: (TempDir, PathBuf)) {
        let (_dir, path) = database;
        {
            let store = SqliteFeatureStore::open_writable(&path).expect("open store");
            store
                .connection
                .execute("DELETE FROM nodes WHERE id = 13", [])
                .expect("delete node");
        }
        let store = SqliteFeatureStore::open(&path).expect("open store");
        let features = store.features_in_area(&area()).expect("load features");
        assert!(
            features
                .iter()
                .all(|feature| feature.feature_ref() != FeatureRef::new(FeatureKind::Way, 10))
        );
    }

    #[rstest]
    fn invalid_tags_are_reported(database: (TempDir, PathBuf)) {
        let (_dir, path) = database;
        {
            let store = SqliteFeatureStore::open_writable(&path).expect("open store");
            store
                .connection
                .execute("UPDATE nodes SET tags = 'not-json' WHERE id = 1", [])
                .expect("corrupt tags");
        }
        let store = SqliteFeatureStore::open(&path).expect("open store");
        let error = store
            .features_in_area(&area())
            .expect_err("invalid tags should fail");
        assert!(matches!(
            error,
            SqliteFeatureStoreError::InvalidTags { feature, .. }
                if feature == FeatureRef::new(FeatureKind::Node, 1)
        ));
    }

    #[rstest]
    fn opening_a_missing_database_fails() {
        let dir = TempDir::new().expect("create temp dir");
        let error = SqliteFeatureStore::open(dir.path().join("absent.db"))
            .expect_err("missing database should fail");
        assert!(matches!(error, SqliteFeatureStoreError::OpenDatabase { .. }));
    }

    fn conflation_for(path: &Path) -> Conflation {
        let store = SqliteFeatureStore::open(path).expect("open store");
        let features = store.features_in_area(&area()).expect("load features");
        let batch = ImportBatch::new([
            AddressRecord::new(
                -1,
                Point::from(offset(2.0, 0.0)),
                Tags::from([
                    ("addr:housenumber".to_owned(), "12".to_owned()),
                    ("addr:street".to_owned(), "Main St".to_owned()),
                    ("addr:city".to_owned(), "Springfield".to_owned()),
                ]),
            ),
            AddressRecord::new(
                -2,
                Point::from(offset(70.0, 70.0)),
                Tags::from([("addr:housenumber".to_owned(), "99".to_owned())]),
            ),
        ])
        .expect("valid batch");
        let options = MatchOptions::default().with_nocity(5.0).expect("valid radius");
        conflate(&batch, &SpatialIndex::new(features), &options)
    }

    #[rstest]
    fn changesets_update_versions_and_insert_nodes(database: (TempDir, PathBuf)) {
        let (_dir, path) = database;
        let conflation = conflation_for(&path);
        assert_eq!(conflation.outcome.consumed, BTreeSet::from([-1]));

        let mut store = SqliteFeatureStore::open_writable(&path).expect("open store");
        store.apply_changeset(&conflation).expect("apply changeset");

        let (version, tags): (u32, String) = store
            .connection
            .query_row("SELECT version, tags FROM nodes WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .expect("read node");
        assert_eq!(version, 2);
        assert!(tags.contains("Springfield"));

        let created: (i64, u32) = store
            .connection
            .query_row("SELECT id, version FROM nodes ORDER BY id DESC LIMIT 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .expect("read created node");
        assert_eq!(created, (25, 1));
    }

    #[rstest]
    fn version_conflicts_roll_back_everything(database: (TempDir, PathBuf)) {
        let (_dir, path) = database;
        let conflation = conflation_for(&path);
        let mut store = SqliteFeatureStore::open_writable(&path).expect("open store");
        store
            .connection
            .execute("UPDATE nodes SET version = 7 WHERE id = 1", [])
            .expect("bump version");

        let error = store
            .apply_changeset(&conflation)
            .expect_err("stale version should fail");
        assert!(matches!(
            error,
            SqliteFeatureStoreError::VersionConflict { stored: 7, expected: 1, .. }
        ));
        let count: i64 = store
            .connection
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .expect("count nodes");
        assert_eq!(count, 9);
    }
}
