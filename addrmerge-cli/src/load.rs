//! Load command implementation for the addrmerge CLI.

use addrmerge_data::{OsmLoadSummary, load_osm_pbf};
use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_DATABASE, ARG_OSM_PBF, CliError, ENV_LOAD_DATABASE, ENV_LOAD_OSM_PBF, require_existing,
};

/// CLI arguments for the `load` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default, PartialEq, Eq)]
#[command(
    long_about = "Load every node, way and relation of an OSM PBF extract \
                 into a SQLite feature database that `addrmerge conflate` \
                 can match against. Existing rows with the same id are \
                 replaced.",
    about = "Load an OSM PBF extract into a feature database"
)]
#[ortho_config(prefix = "ADDRMERGE")]
pub(crate) struct LoadArgs {
    /// Path to the `.osm.pbf` extract.
    #[arg(long = ARG_OSM_PBF, value_name = "path")]
    #[serde(default)]
    pub(crate) osm_pbf: Option<Utf8PathBuf>,
    /// SQLite feature database to create or update.
    #[arg(long = ARG_DATABASE, short = 'd', value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
}

impl LoadArgs {
    pub(crate) fn into_config(self) -> Result<LoadConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        LoadConfig::try_from(merged)
    }
}

/// Resolved `load` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadConfig {
    /// Extract to read.
    pub(crate) osm_pbf: Utf8PathBuf,
    /// Database to write.
    pub(crate) database: Utf8PathBuf,
}

impl TryFrom<LoadArgs> for LoadConfig {
    type Error = CliError;

    fn try_from(args: LoadArgs) -> Result<Self, Self::Error> {
        let osm_pbf = args.osm_pbf.ok_or(CliError::MissingArgument {
            field: ARG_OSM_PBF,
            env: ENV_LOAD_OSM_PBF,
        })?;
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_LOAD_DATABASE,
        })?;
        Ok(Self { osm_pbf, database })
    }
}

pub(crate) fn run_load(args: LoadArgs) -> Result<OsmLoadSummary, CliError> {
    let config = args.into_config()?;
    execute_load(&config)
}

pub(crate) fn execute_load(config: &LoadConfig) -> Result<OsmLoadSummary, CliError> {
    require_existing(&config.osm_pbf, ARG_OSM_PBF)?;
    Ok(load_osm_pbf(&config.osm_pbf, &config.database)?)
}
