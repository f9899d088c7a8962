//! Fixture helpers shared by the unit and behaviour tests.

use std::{fs, io::Write, path::PathBuf};

use base64::{Engine as _, engine::general_purpose};
use camino::Utf8PathBuf;
use tempfile::{Builder, TempPath};

/// A decoded fixture that is removed when dropped.
pub(crate) struct DecodedFixture {
    pub(crate) path: Utf8PathBuf,
    _file: TempPath,
}

/// Decode `tests/fixtures/<stem>.osm.pbf.b64` into a temporary PBF file.
pub(crate) fn decode_fixture(stem: &str) -> DecodedFixture {
    let encoded_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(format!("{stem}.osm.pbf.b64"));
    let encoded = fs::read_to_string(&encoded_path).unwrap_or_else(|err| {
        panic!("failed to read base64 fixture {encoded_path:?}: {err}");
    });
    let cleaned: String = encoded
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let decoded = general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .unwrap_or_else(|err| panic!("failed to decode base64 fixture {encoded_path:?}: {err}"));
    let mut tempfile = Builder::new()
        .prefix(stem)
        .suffix(".osm.pbf")
        .tempfile()
        .unwrap_or_else(|err| panic!("failed to create temporary fixture for {stem}: {err}"));
    tempfile
        .write_all(&decoded)
        .unwrap_or_else(|err| panic!("failed to write decoded fixture for {stem}: {err}"));
    let file = tempfile.into_temp_path();
    let path = Utf8PathBuf::from_path_buf(file.to_path_buf()).unwrap_or_else(|path| {
        panic!("temporary fixture path {path:?} is not UTF-8");
    });
    DecodedFixture { path, _file: file }
}
