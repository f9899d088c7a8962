//! Document and database adapters for the address conflation engine.
//!
//! Responsibilities:
//! - Read import batches from OSM XML and OSM PBF documents.
//! - Write conflation results as osmChange documents.
//! - Load OSM PBF extracts into the SQLite feature schema.
//!
//! Boundaries:
//! - Do not encode matching rules (they live in `addrmerge-core`).
//! - Keep file access capability-based through `cap-std`.
//!
//! Invariants:
//! - Malformed input fails the whole document; no partial batch is returned.
//! - Database loads are atomic.

pub mod document;
mod fs;
pub mod load;

#[cfg(test)]
mod test_support;

pub use document::{
    DocumentError, DocumentFormat, parse_osm_xml, read_import_batch, read_pbf_batch,
    write_change_document, write_osm_change,
};
pub use load::{OsmLoadError, OsmLoadSummary, load_osm_pbf};
