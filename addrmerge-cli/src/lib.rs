//! Command-line interface for the address conflation engine.
#![forbid(unsafe_code)]

use camino::Utf8Path;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;

mod conflate;
mod error;
mod load;

pub use error::{CliError, StoreError};

use conflate::{ConflateArgs, run_conflate};
use load::{LoadArgs, run_load};

pub(crate) const ARG_INPUT: &str = "input";
pub(crate) const ARG_DATABASE: &str = "database";
pub(crate) const ARG_OSM_PBF: &str = "osm-pbf";
pub(crate) const ENV_CONFLATE_INPUT: &str = "ADDRMERGE_CMDS_CONFLATE_INPUT";
pub(crate) const ENV_CONFLATE_DATABASE: &str = "ADDRMERGE_CMDS_CONFLATE_DATABASE";
pub(crate) const ENV_LOAD_OSM_PBF: &str = "ADDRMERGE_CMDS_LOAD_OSM_PBF";
pub(crate) const ENV_LOAD_DATABASE: &str = "ADDRMERGE_CMDS_LOAD_DATABASE";

/// Run the addrmerge CLI with the current process arguments and environment.
///
/// # Errors
/// Returns [`CliError`] when argument parsing, configuration or any stage of
/// the selected command fails.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    init_logging(cli.verbosity.level_filter());
    match cli.command {
        Command::Conflate(args) => run_conflate(args).map(|_| ()),
        Command::Load(args) => run_load(args).map(|_| ()),
    }
}

fn init_logging(level: LevelFilter) {
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if installed.is_err() {
        log::debug!("a global logger is already installed");
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "addrmerge",
    about = "Conflate surveyed address points with existing OpenStreetMap data",
    version
)]
struct Cli {
    #[command(flatten)]
    verbosity: Verbosity,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, Default, Args)]
struct Verbosity {
    /// Log per-match decisions.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

impl Verbosity {
    const fn level_filter(self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else if self.quiet {
            LevelFilter::WARN
        } else {
            LevelFilter::INFO
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Conflate an import document with the features in a database.
    Conflate(ConflateArgs),
    /// Load an OSM PBF extract into a feature database.
    Load(LoadArgs),
}

/// Check that a configured input exists and is a regular file.
pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    if path.is_file() {
        Ok(())
    } else if path.exists() {
        Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        })
    } else {
        Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests;
