//! SQLite persistence for loaded OSM elements.

use addrmerge_core::{FEATURE_SCHEMA, FeatureKind, FeatureRef, Tags};
use camino::Utf8Path;
use rusqlite::{Connection, Transaction, params};

use super::OsmLoadError;
use super::accumulator::ElementAccumulator;
use crate::fs::ensure_parent_dir;

/// Write every row in one transaction.
///
/// Rows replace earlier copies with the same id. Way node lists and relation
/// member lists are rewritten in full.
pub(super) fn persist_elements(
    path: &Utf8Path,
    elements: &ElementAccumulator,
) -> Result<(), OsmLoadError> {
    ensure_parent_dir(path).map_err(|source| OsmLoadError::CreateDirectory {
        path: path.to_path_buf(),
        source,
    })?;
    let mut connection =
        Connection::open(path.as_std_path()).map_err(|source| OsmLoadError::OpenDatabase {
            path: path.to_path_buf(),
            source,
        })?;

    let transaction = connection
        .transaction()
        .map_err(|source| OsmLoadError::BeginTransaction { source })?;
    transaction
        .execute_batch(FEATURE_SCHEMA)
        .map_err(|source| OsmLoadError::CreateSchema { source })?;

    persist_nodes(&transaction, elements)?;
    persist_ways(&transaction, elements)?;
    persist_relations(&transaction, elements)?;

    transaction
        .commit()
        .map_err(|source| OsmLoadError::Commit { source })
}

fn persist_nodes(
    transaction: &Transaction<'_>,
    elements: &ElementAccumulator,
) -> Result<(), OsmLoadError> {
    let mut insert = transaction
        .prepare(
            "INSERT OR REPLACE INTO nodes (id, version, lon, lat, tags) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(|source| OsmLoadError::PrepareStatement { source })?;
    for node in &elements.nodes {
        let feature = FeatureRef::new(FeatureKind::Node, node.id);
        let tags = tags_json(feature, &node.tags)?;
        insert
            .execute(params![
                node.id,
                node.version,
                node.location.x,
                node.location.y,
                tags
            ])
            .map_err(|source| OsmLoadError::PersistRow { feature, source })?;
    }
    Ok(())
}

fn persist_ways(
    transaction: &Transaction<'_>,
    elements: &ElementAccumulator,
) -> Result<(), OsmLoadError> {
    let prepare = |sql: &str| {
        transaction
            .prepare(sql)
            .map_err(|source| OsmLoadError::PrepareStatement { source })
    };
    let mut insert_way =
        prepare("INSERT OR REPLACE INTO ways (id, version, tags) VALUES (?1, ?2, ?3)")?;
    let mut clear_nodes = prepare("DELETE FROM way_nodes WHERE way_id = ?1")?;
    let mut insert_node = prepare(
        "INSERT INTO way_nodes (way_id, node_id, sequence_id) VALUES (?1, ?2, ?3)",
    )?;

    for way in &elements.ways {
        let feature = FeatureRef::new(FeatureKind::Way, way.id);
        let tags = tags_json(feature, &way.tags)?;
        let persist_row = |source| OsmLoadError::PersistRow { feature, source };
        insert_way
            .execute(params![way.id, way.version, tags])
            .map_err(persist_row)?;
        clear_nodes.execute(params![way.id]).map_err(persist_row)?;
        for (sequence, node_id) in (0_i64..).zip(&way.refs) {
            insert_node
                .execute(params![way.id, node_id, sequence])
                .map_err(persist_row)?;
        }
    }
    Ok(())
}

fn persist_relations(
    transaction: &Transaction<'_>,
    elements: &ElementAccumulator,
) -> Result<(), OsmLoadError> {
    let prepare = |sql: &str| {
        transaction
            .prepare(sql)
            .map_err(|source| OsmLoadError::PrepareStatement { source })
    };
    let mut insert_relation =
        prepare("INSERT OR REPLACE INTO relations (id, version, tags) VALUES (?1, ?2, ?3)")?;
    let mut clear_members = prepare("DELETE FROM relation_members WHERE relation_id = ?1")?;
    let mut insert_member = prepare(
        "INSERT INTO relation_members \
         (relation_id, member_type, member_id, member_role, sequence_id) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    for relation in &elements.relations {
        let feature = FeatureRef::new(FeatureKind::Relation, relation.id);
        let tags = tags_json(feature, &relation.tags)?;
        let persist_row = |source| OsmLoadError::PersistRow { feature, source };
        insert_relation
            .execute(params![relation.id, relation.version, tags])
            .map_err(persist_row)?;
        clear_members
            .execute(params![relation.id])
            .map_err(persist_row)?;
        for (sequence, member) in (0_i64..).zip(&relation.members) {
            insert_member
                .execute(params![
                    relation.id,
                    member.kind.as_str(),
                    member.id,
                    member.role,
                    sequence
                ])
                .map_err(persist_row)?;
        }
    }
    Ok(())
}

fn tags_json(feature: FeatureRef, tags: &Tags) -> Result<String, OsmLoadError> {
    serde_json::to_string(tags).map_err(|source| OsmLoadError::SerializeTags { feature, source })
}
