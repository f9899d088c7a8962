//! Focused unit tests covering argument parsing and shared validation.

use super::helpers::{Workspace, write_utf8};
use super::*;
use rstest::rstest;

#[rstest]
#[case(&["addrmerge", "load"], LevelFilter::INFO)]
#[case(&["addrmerge", "-v", "load"], LevelFilter::DEBUG)]
#[case(&["addrmerge", "load", "--quiet"], LevelFilter::WARN)]
fn verbosity_selects_log_level(#[case] argv: &[&str], #[case] expected: LevelFilter) {
    let cli = Cli::try_parse_from(argv).expect("arguments should parse");
    assert_eq!(cli.verbosity.level_filter(), expected);
}

#[rstest]
fn verbose_and_quiet_conflict() {
    let err = Cli::try_parse_from(["addrmerge", "-v", "-q", "load"])
        .expect_err("conflicting flags should be rejected");
    assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
}

#[rstest]
fn missing_subcommand_is_a_parse_error() {
    let err = Cli::try_parse_from(["addrmerge"]).expect_err("a subcommand is required");
    assert!(matches!(
        CliError::from(err),
        CliError::ArgumentParsing(_)
    ));
}

#[rstest]
fn conflate_flags_parse_into_arguments() {
    let cli = Cli::try_parse_from([
        "addrmerge",
        "conflate",
        "survey.osm",
        "--database",
        "features.db",
        "--apply",
        "--nocity",
        "5",
        "--strip",
        "source",
        "--strip",
        "note",
        "--bbox",
        "-123.2,49.2,-123.0,49.3",
    ])
    .expect("arguments should parse");
    let Command::Conflate(args) = cli.command else {
        panic!("expected the conflate command");
    };
    assert_eq!(args.input.as_deref(), Some(Utf8Path::new("survey.osm")));
    assert_eq!(args.database.as_deref(), Some(Utf8Path::new("features.db")));
    assert_eq!(args.apply, Some(true));
    assert_eq!(args.nocity, Some(5.0));
    assert_eq!(args.strip, vec!["source".to_owned(), "note".to_owned()]);
    assert_eq!(args.bbox.as_deref(), Some("-123.2,49.2,-123.0,49.3"));
}

#[rstest]
fn apply_accepts_an_explicit_value() {
    let cli = Cli::try_parse_from(["addrmerge", "conflate", "survey.osm", "--apply=false"])
        .expect("arguments should parse");
    let Command::Conflate(args) = cli.command else {
        panic!("expected the conflate command");
    };
    assert_eq!(args.apply, Some(false));
}

#[rstest]
fn require_existing_accepts_files() {
    let workspace = Workspace::new();
    let path = workspace.path("present.osm");
    write_utf8(&path, b"<osm/>");
    require_existing(&path, ARG_INPUT).expect("file should be accepted");
}

#[rstest]
fn require_existing_reports_missing_files() {
    let workspace = Workspace::new();
    let err = require_existing(&workspace.path("absent.osm"), ARG_INPUT)
        .expect_err("missing file should be rejected");
    match err {
        CliError::MissingSourceFile { field, path } => {
            assert_eq!(field, ARG_INPUT);
            assert!(path.ends_with("absent.osm"));
        }
        other => panic!("expected MissingSourceFile, found {other:?}"),
    }
}

#[rstest]
fn require_existing_rejects_directories() {
    let workspace = Workspace::new();
    let err = require_existing(&workspace.path(""), ARG_DATABASE)
        .expect_err("directory should be rejected");
    match err {
        CliError::SourcePathNotFile { field, .. } => assert_eq!(field, ARG_DATABASE),
        other => panic!("expected SourcePathNotFile, found {other:?}"),
    }
}
