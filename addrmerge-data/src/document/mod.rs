//! Reading import batches and writing osmChange documents.
//!
//! An import document is either OSM XML (`.osm`, `.xml`) or OSM PBF
//! (`.pbf`). Every tagged node becomes an [`AddressRecord`] keyed by its node
//! id; untagged nodes are way vertices and are ignored, as are ways and
//! relations. The result of a run is written back out as osmChange XML.
//!
//! [`AddressRecord`]: addrmerge_core::AddressRecord

use std::io::{self, BufReader, BufWriter, Write};

use addrmerge_core::{Conflation, ImportBatch, ImportBatchError};
use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use thiserror::Error;

use crate::fs::{create_document, open_document};

mod change;
mod pbf;
mod xml;

pub use change::write_osm_change;
pub use pbf::read_pbf_batch;
pub use xml::parse_osm_xml;

/// Errors raised while reading import documents or writing change documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The import document could not be opened.
    #[error("failed to open document at {path}: {source}")]
    Open {
        /// Location of the document.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The change document could not be created.
    #[error("failed to create document at {path}: {source}")]
    Create {
        /// Location of the document.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file extension names no supported format.
    #[error("unsupported document format for {path}; expected .osm, .xml or .pbf")]
    UnsupportedFormat {
        /// Location of the document.
        path: Utf8PathBuf,
    },
    /// The XML was malformed.
    #[error("malformed OSM XML: {source}")]
    Xml {
        /// Parser error from `quick-xml`.
        #[source]
        source: quick_xml::Error,
    },
    /// The PBF file could not be decoded.
    #[error("failed to decode OSM PBF data at {path}: {source}")]
    Pbf {
        /// Location of the document.
        path: Utf8PathBuf,
        /// Decoder error from `osmpbf`.
        #[source]
        source: osmpbf::Error,
    },
    /// A node omitted a required attribute.
    #[error("<{element}> element is missing the {attribute:?} attribute")]
    MissingAttribute {
        /// Element name.
        element: &'static str,
        /// Attribute name.
        attribute: &'static str,
    },
    /// A node carried no coordinates.
    #[error("node {id} has no coordinates")]
    MissingCoordinates {
        /// Offending node id.
        id: i64,
    },
    /// An attribute value could not be parsed.
    #[error("invalid value {value:?} for attribute {attribute:?}")]
    InvalidAttribute {
        /// Attribute name.
        attribute: &'static str,
        /// Value as found in the document.
        value: String,
    },
    /// The records did not form a valid batch.
    #[error(transparent)]
    Batch(#[from] ImportBatchError),
    /// Writing the change document failed.
    #[error("failed to write change document: {source}")]
    Write {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Supported import document encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// OSM XML.
    Xml,
    /// OSM protocol buffer binary.
    Pbf,
}

impl DocumentFormat {
    /// Guess the format from the file extension.
    ///
    /// # Examples
    /// ```
    /// use addrmerge_data::DocumentFormat;
    /// use camino::Utf8Path;
    ///
    /// assert_eq!(
    ///     DocumentFormat::from_path(Utf8Path::new("survey.osm.pbf")),
    ///     Some(DocumentFormat::Pbf)
    /// );
    /// assert_eq!(DocumentFormat::from_path(Utf8Path::new("survey.csv")), None);
    /// ```
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        match path.extension()?.to_ascii_lowercase().as_str() {
            "osm" | "xml" => Some(Self::Xml),
            "pbf" => Some(Self::Pbf),
            _ => None,
        }
    }
}

/// Read an import batch from disk, dispatching on the file extension.
///
/// # Errors
/// Returns [`DocumentError`] when the file cannot be opened or decoded, when
/// a node lacks coordinates, or when the records do not form a valid batch.
pub fn read_import_batch(path: &Utf8Path) -> Result<ImportBatch, DocumentError> {
    let batch = match DocumentFormat::from_path(path) {
        Some(DocumentFormat::Xml) => {
            let file = open_document(path).map_err(|source| DocumentError::Open {
                path: path.to_path_buf(),
                source,
            })?;
            parse_osm_xml(BufReader::new(file))?
        }
        Some(DocumentFormat::Pbf) => read_pbf_batch(path)?,
        None => {
            return Err(DocumentError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }
    };
    info!("Read {} address records from {path}", batch.len());
    Ok(batch)
}

/// Write a conflation result to an osmChange file, creating parent
/// directories as needed.
///
/// # Errors
/// Returns [`DocumentError::Create`] when the file cannot be created and
/// [`DocumentError::Write`] when writing fails.
pub fn write_change_document(path: &Utf8Path, conflation: &Conflation) -> Result<(), DocumentError> {
    let file = create_document(path).map_err(|source| DocumentError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = write_osm_change(BufWriter::new(file), conflation)?;
    writer
        .flush()
        .map_err(|source| DocumentError::Write { source })?;
    info!(
        "Wrote {} new and {} modified features to {path}",
        conflation.new_records.len(),
        conflation.modifications.len()
    );
    Ok(())
}
