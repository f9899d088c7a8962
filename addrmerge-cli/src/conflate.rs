//! Conflate command implementation for the addrmerge CLI.

use addrmerge_core::{
    AreaOfInterest, AreaOfInterestError, ChangesetSink, Conflation, FeatureStore, ImportBatch,
    MatchOptions, SpatialIndex, SqliteFeatureStore, conflate,
};
use addrmerge_data::{read_import_batch, write_change_document};
use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_DATABASE, ARG_INPUT, CliError, ENV_CONFLATE_DATABASE, ENV_CONFLATE_INPUT,
    require_existing,
};

/// Margin, in metres, added around the batch when no `--bbox` is given.
pub(crate) const DEFAULT_MARGIN: f64 = 100.0;

/// CLI arguments for the `conflate` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default, PartialEq)]
#[command(
    long_about = "Match an import document of surveyed addresses against the \
                 existing features in a database. Exact duplicates are \
                 dropped, matched addresses are merged into existing \
                 features and the rest become new nodes. The result is \
                 written as osmChange and/or applied to the database.",
    about = "Conflate an import document with existing features"
)]
#[ortho_config(prefix = "ADDRMERGE")]
pub(crate) struct ConflateArgs {
    /// Import document (.osm, .xml or .osm.pbf).
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) input: Option<Utf8PathBuf>,
    /// SQLite feature database produced by `addrmerge load`.
    #[arg(long = ARG_DATABASE, short = 'd', value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Write the result as an osmChange document.
    #[arg(long, short = 'o', value_name = "path")]
    #[serde(default)]
    pub(crate) output: Option<Utf8PathBuf>,
    /// Apply the result to the database in one transaction.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) apply: Option<bool>,
    /// Match records to nearby features lacking a city within this many metres.
    #[arg(long, value_name = "metres")]
    #[serde(default)]
    pub(crate) nocity: Option<f64>,
    /// Match records to unaddressed buildings within this many metres.
    #[arg(long, value_name = "metres")]
    #[serde(default)]
    pub(crate) building: Option<f64>,
    /// Buffer radius around each record, in metres (default 0.5).
    #[arg(long, value_name = "metres")]
    #[serde(default)]
    pub(crate) buffer: Option<f64>,
    /// Extra tag keys to strip from modified features.
    #[arg(long = "strip", value_name = "key")]
    #[serde(default)]
    pub(crate) strip: Vec<String>,
    /// Area of interest as minlon,minlat,maxlon,maxlat.
    #[arg(long, value_name = "bbox", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) bbox: Option<String>,
    /// Margin around the batch bounds when no bbox is given, in metres.
    #[arg(long, value_name = "metres")]
    #[serde(default)]
    pub(crate) margin: Option<f64>,
}

impl ConflateArgs {
    pub(crate) fn into_config(self) -> Result<ConflateConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ConflateConfig::try_from(merged)
    }
}

/// How the area of interest is chosen.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AreaSelection {
    /// A bounding box given on the command line.
    Explicit(AreaOfInterest),
    /// The batch bounds grown by a margin in metres, widened to the matchers'
    /// reach when that is larger.
    AroundBatch {
        /// Margin in metres.
        margin: f64,
    },
}

impl AreaSelection {
    pub(crate) fn resolve(
        &self,
        batch: &ImportBatch,
        options: &MatchOptions,
    ) -> Result<AreaOfInterest, CliError> {
        match self {
            Self::Explicit(area) => Ok(*area),
            Self::AroundBatch { margin } => {
                let padding = margin.max(options.snapshot_reach());
                Ok(AreaOfInterest::around_batch(batch, padding)?)
            }
        }
    }
}

/// Resolved `conflate` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConflateConfig {
    /// Import document.
    pub(crate) input: Utf8PathBuf,
    /// Feature database.
    pub(crate) database: Utf8PathBuf,
    /// Optional osmChange destination.
    pub(crate) output: Option<Utf8PathBuf>,
    /// Whether to apply the changeset to the database.
    pub(crate) apply: bool,
    /// Matching configuration.
    pub(crate) options: MatchOptions,
    /// Area of interest selection.
    pub(crate) area: AreaSelection,
}

impl ConflateConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.input, ARG_INPUT)?;
        require_existing(&self.database, ARG_DATABASE)?;
        Ok(())
    }
}

impl TryFrom<ConflateArgs> for ConflateConfig {
    type Error = CliError;

    fn try_from(args: ConflateArgs) -> Result<Self, Self::Error> {
        let input = args.input.ok_or(CliError::MissingArgument {
            field: ARG_INPUT,
            env: ENV_CONFLATE_INPUT,
        })?;
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_CONFLATE_DATABASE,
        })?;
        let apply = args.apply.unwrap_or(false);
        if args.output.is_none() && !apply {
            return Err(CliError::MissingDestination);
        }

        let mut options = MatchOptions::default();
        if let Some(radius) = args.nocity {
            options = options.with_nocity(radius)?;
        }
        if let Some(radius) = args.building {
            options = options.with_building(radius)?;
        }
        if let Some(buffer) = args.buffer {
            options = options.with_buffer(buffer)?;
        }
        options = options.with_strip_keys(args.strip);

        let area = match args.bbox {
            Some(bbox) => AreaSelection::Explicit(parse_bbox(&bbox)?),
            None => {
                let margin = args.margin.unwrap_or(DEFAULT_MARGIN);
                if !margin.is_finite() || margin < 0.0 {
                    return Err(AreaOfInterestError::InvalidMargin(margin).into());
                }
                AreaSelection::AroundBatch { margin }
            }
        };

        Ok(Self {
            input,
            database,
            output: args.output,
            apply,
            options,
            area,
        })
    }
}

/// Parse `minlon,minlat,maxlon,maxlat` into an area of interest.
pub(crate) fn parse_bbox(value: &str) -> Result<AreaOfInterest, CliError> {
    let invalid = || CliError::InvalidBoundingBox {
        value: value.to_owned(),
    };
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    let [min_lon, min_lat, max_lon, max_lat] = parts.as_slice() else {
        return Err(invalid());
    };
    Ok(AreaOfInterest::from_bounds(
        *min_lon, *min_lat, *max_lon, *max_lat,
    )?)
}

pub(crate) fn run_conflate(args: ConflateArgs) -> Result<Conflation, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    let mut store = if config.apply {
        SqliteFeatureStore::open_writable(config.database.as_std_path())?
    } else {
        SqliteFeatureStore::open(config.database.as_std_path())?
    };
    execute_conflate(&config, &mut store)
}

/// Run one conflation against any store that can both read and apply.
pub(crate) fn execute_conflate<S>(
    config: &ConflateConfig,
    store: &mut S,
) -> Result<Conflation, CliError>
where
    S: FeatureStore + ChangesetSink,
{
    let batch = read_import_batch(&config.input)?;
    let index = if batch.is_empty() {
        info!("Import batch is empty; nothing to match");
        SpatialIndex::new(Vec::new())
    } else {
        let area = config.area.resolve(&batch, &config.options)?;
        let features = store
            .features_in_area(&area)
            .map_err(|source| CliError::ReadFeatures {
                source: Box::new(source),
            })?;
        info!("Loaded {} existing features", features.len());
        SpatialIndex::new(features)
    };

    let conflation = conflate(&batch, &index, &config.options);

    if let Some(output) = &config.output {
        write_change_document(output, &conflation)?;
    }
    if config.apply {
        store
            .apply_changeset(&conflation)
            .map_err(|source| CliError::ApplyChangeset {
                source: Box::new(source),
            })?;
        info!("Applied changeset to {}", config.database);
    }
    Ok(conflation)
}
