//! Error types emitted by the addrmerge CLI.

use std::sync::Arc;

use addrmerge_core::{AreaOfInterestError, MatchOptionsError, SqliteFeatureStoreError};
use addrmerge_data::{DocumentError, OsmLoadError};
use camino::Utf8PathBuf;
use thiserror::Error;

/// Boxed error raised by a feature store or changeset sink.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Errors emitted by the addrmerge CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Flag name.
        field: &'static str,
        /// Environment variable that can supply the value.
        env: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        /// Flag name.
        field: &'static str,
        /// Path as configured.
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        /// Flag name.
        field: &'static str,
        /// Path as configured.
        path: Utf8PathBuf,
    },
    /// The run would produce no output: no change document and no `--apply`.
    #[error("nothing to do: pass --output to write an osmChange document or --apply to update the database")]
    MissingDestination,
    /// A matching distance was rejected.
    #[error(transparent)]
    InvalidOptions(#[from] MatchOptionsError),
    /// The `--bbox` value is not four comma-separated numbers.
    #[error("invalid bounding box {value:?}; expected minlon,minlat,maxlon,maxlat")]
    InvalidBoundingBox {
        /// Value as supplied.
        value: String,
    },
    /// The area of interest is invalid.
    #[error(transparent)]
    InvalidArea(#[from] AreaOfInterestError),
    /// Reading the import batch or writing the change document failed.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// Opening the feature database failed.
    #[error(transparent)]
    OpenStore(#[from] SqliteFeatureStoreError),
    /// Reading existing features failed.
    #[error("failed to read existing features: {source}")]
    ReadFeatures {
        /// Store error.
        #[source]
        source: StoreError,
    },
    /// Applying the changeset failed; the store is unchanged.
    #[error("failed to apply changeset: {source}")]
    ApplyChangeset {
        /// Sink error.
        #[source]
        source: StoreError,
    },
    /// Loading an OSM extract failed.
    #[error("failed to load OSM data: {0}")]
    Load(#[from] OsmLoadError),
}
