//! OSM PBF import reader.

use addrmerge_core::{AddressRecord, ImportBatch};
use camino::Utf8Path;
use geo::Point;
use osmpbf::{Element, ElementReader};

use super::DocumentError;
use crate::load::collect_tags;

/// Read the tagged nodes of a PBF file into an import batch.
///
/// Blocks are decoded in parallel; the batch is keyed by node id so the
/// decode order does not matter.
///
/// # Errors
/// Returns [`DocumentError::Pbf`] when the file cannot be opened or decoded
/// and [`DocumentError::Batch`] when the records do not form a valid batch.
pub fn read_pbf_batch(path: &Utf8Path) -> Result<ImportBatch, DocumentError> {
    let reader =
        ElementReader::from_path(path.as_std_path()).map_err(|source| DocumentError::Pbf {
            path: path.to_path_buf(),
            source,
        })?;

    let records = reader
        .par_map_reduce(
            |element| match element {
                Element::Node(node) => {
                    tagged_record(node.id(), node.lon(), node.lat(), node.tags())
                }
                Element::DenseNode(node) => {
                    tagged_record(node.id(), node.lon(), node.lat(), node.tags())
                }
                Element::Way(_) | Element::Relation(_) => Vec::new(),
            },
            Vec::new,
            |mut left, right| {
                left.extend(right);
                left
            },
        )
        .map_err(|source| DocumentError::Pbf {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(ImportBatch::new(records)?)
}

fn tagged_record<'a, T>(id: i64, lon: f64, lat: f64, tags: T) -> Vec<AddressRecord>
where
    T: IntoIterator<Item = (&'a str, &'a str)>,
{
    let tags = collect_tags(tags);
    if tags.is_empty() {
        return Vec::new();
    }
    vec![AddressRecord::new(id, Point::new(lon, lat), tags)]
}
