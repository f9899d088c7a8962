//! osmChange writer.
//!
//! New records are written as nodes in a `<create>` block with placeholder
//! ids `-1`, `-2`, ... assigned in ascending import-id order. Modified
//! features go to a `<modify>` block carrying their bumped version, merged
//! tags and unchanged structure.

use std::io::Write;

use addrmerge_core::{AddressRecord, Conflation, ModificationRecord, Structure, Tags};
use geo::Coord;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

use super::DocumentError;

const GENERATOR: &str = "addrmerge";

/// Serialise a conflation result as osmChange XML.
///
/// Empty blocks are omitted. The writer is handed back once the document is
/// complete so callers can flush it.
///
/// # Examples
/// ```
/// use addrmerge_core::Conflation;
/// use addrmerge_data::write_osm_change;
///
/// let bytes = write_osm_change(Vec::new(), &Conflation::default())?;
/// let text = String::from_utf8(bytes).expect("utf-8 output");
/// assert!(text.contains("<osmChange version=\"0.6\""));
/// assert!(!text.contains("<create>"));
/// # Ok::<(), addrmerge_data::DocumentError>(())
/// ```
///
/// # Errors
/// Returns [`DocumentError::Write`] when the underlying writer fails.
pub fn write_osm_change<W: Write>(writer: W, conflation: &Conflation) -> Result<W, DocumentError> {
    let mut xml = Writer::new_with_indent(writer, b' ', 2);
    emit(
        &mut xml,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    emit(
        &mut xml,
        Event::Start(
            BytesStart::new("osmChange")
                .with_attributes([("version", "0.6"), ("generator", GENERATOR)]),
        ),
    )?;

    if !conflation.new_records.is_empty() {
        emit(&mut xml, Event::Start(BytesStart::new("create")))?;
        let mut records: Vec<&AddressRecord> = conflation.new_records.iter().collect();
        records.sort_by_key(|record| record.import_id);
        for (placeholder, record) in (1_i64..).map(|n| -n).zip(records) {
            let location = Coord::from(record.location);
            let id = placeholder.to_string();
            let (lat, lon) = format_coord(location);
            let start = BytesStart::new("node").with_attributes([
                ("id", id.as_str()),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
            ]);
            write_element(&mut xml, "node", start, tag_elements(&record.tags))?;
        }
        emit(&mut xml, Event::End(BytesEnd::new("create")))?;
    }

    if !conflation.modifications.is_empty() {
        emit(&mut xml, Event::Start(BytesStart::new("modify")))?;
        for modification in &conflation.modifications {
            write_modification(&mut xml, modification)?;
        }
        emit(&mut xml, Event::End(BytesEnd::new("modify")))?;
    }

    emit(&mut xml, Event::End(BytesEnd::new("osmChange")))?;
    Ok(xml.into_inner())
}

fn write_modification<W: Write>(
    xml: &mut Writer<W>,
    modification: &ModificationRecord,
) -> Result<(), DocumentError> {
    let name = modification.feature.kind.as_str();
    let id = modification.feature.id.to_string();
    let version = modification.new_version.to_string();
    let mut start = BytesStart::new(name)
        .with_attributes([("id", id.as_str()), ("version", version.as_str())]);
    let mut children = Vec::new();

    match &modification.structure {
        Structure::Node(location) => {
            let (lat, lon) = format_coord(*location);
            start.push_attribute(("lat", lat.as_str()));
            start.push_attribute(("lon", lon.as_str()));
        }
        Structure::Way(refs) => {
            children.extend(refs.iter().map(|node_id| {
                let reference = node_id.to_string();
                BytesStart::new("nd").with_attributes([("ref", reference.as_str())])
            }));
        }
        Structure::Relation(members) => {
            children.extend(members.iter().map(|member| {
                let reference = member.id.to_string();
                BytesStart::new("member").with_attributes([
                    ("type", member.kind.as_str()),
                    ("ref", reference.as_str()),
                    ("role", member.role.as_str()),
                ])
            }));
        }
    }

    children.extend(tag_elements(&modification.merged_tags));
    write_element(xml, name, start, children)
}

fn tag_elements(tags: &Tags) -> Vec<BytesStart<'static>> {
    tags.iter()
        .map(|(key, value)| {
            BytesStart::new("tag").with_attributes([("k", key.as_str()), ("v", value.as_str())])
        })
        .collect()
}

fn write_element<W: Write>(
    xml: &mut Writer<W>,
    name: &str,
    start: BytesStart<'_>,
    children: Vec<BytesStart<'_>>,
) -> Result<(), DocumentError> {
    if children.is_empty() {
        return emit(xml, Event::Empty(start));
    }
    emit(xml, Event::Start(start))?;
    for child in children {
        emit(xml, Event::Empty(child))?;
    }
    emit(xml, Event::End(BytesEnd::new(name)))
}

fn format_coord(location: Coord<f64>) -> (String, String) {
    (format!("{:.7}", location.y), format!("{:.7}", location.x))
}

fn emit<W: Write>(xml: &mut Writer<W>, event: Event<'_>) -> Result<(), DocumentError> {
    xml.write_event(event)
        .map_err(|source| DocumentError::Write { source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use addrmerge_core::{
        FeatureKind, FeatureRef, MatchOutcome, RelationMember, test_support::ORIGIN,
    };
    use geo::Point;
    use rstest::{fixture, rstest};

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[fixture]
    fn conflation() -> Conflation {
        Conflation {
            outcome: MatchOutcome::default(),
            new_records: vec![
                AddressRecord::new(
                    9,
                    Point::from(ORIGIN),
                    tags(&[("addr:housenumber", "9"), ("addr:street", "Oak & Elm")]),
                ),
                AddressRecord::new(4, Point::new(-123.2, 49.3), tags(&[("addr:housenumber", "4")])),
            ],
            modifications: vec![
                ModificationRecord {
                    feature: FeatureRef::new(FeatureKind::Node, 99),
                    new_version: 5,
                    merged_tags: tags(&[("addr:city", "Springfield")]),
                    structure: Structure::Node(Coord { x: 1.5, y: 2.25 }),
                },
                ModificationRecord {
                    feature: FeatureRef::new(FeatureKind::Way, 70),
                    new_version: 3,
                    merged_tags: tags(&[("building", "house")]),
                    structure: Structure::Way(vec![1, 2, 3, 1]),
                },
                ModificationRecord {
                    feature: FeatureRef::new(FeatureKind::Relation, 30),
                    new_version: 2,
                    merged_tags: tags(&[("type", "multipolygon")]),
                    structure: Structure::Relation(vec![RelationMember {
                        kind: FeatureKind::Way,
                        id: 70,
                        role: "outer".to_owned(),
                    }]),
                },
            ],
        }
    }

    fn render(conflation: &Conflation) -> String {
        let bytes = write_osm_change(Vec::new(), conflation).expect("write change");
        String::from_utf8(bytes).expect("utf-8 output")
    }

    #[rstest]
    fn new_records_get_negative_ids_in_import_order(conflation: Conflation) {
        let text = render(&conflation);
        let first = text.find(r#"<node id="-1" lat="49.3000000" lon="-123.2000000">"#);
        let second = text.find(r#"<node id="-2" lat="49.2500000" lon="-123.1000000">"#);
        assert!(first.is_some(), "import 4 becomes -1:\n{text}");
        assert!(second.is_some(), "import 9 becomes -2:\n{text}");
        assert!(first < second);
        assert!(text.contains(r#"<tag k="addr:street" v="Oak &amp; Elm"/>"#));
    }

    #[rstest]
    fn modifications_keep_structure_and_bump_versions(conflation: Conflation) {
        let text = render(&conflation);
        assert!(text.contains(r#"<node id="99" version="5" lat="2.2500000" lon="1.5000000">"#));
        assert!(text.contains(r#"<way id="70" version="3">"#));
        assert!(text.contains(r#"<nd ref="2"/>"#));
        assert!(text.contains(r#"<relation id="30" version="2">"#));
        assert!(text.contains(r#"<member type="way" ref="70" role="outer"/>"#));
        assert!(text.contains(r#"<tag k="building" v="house"/>"#));
    }

    #[rstest]
    fn blocks_appear_create_then_modify(conflation: Conflation) {
        let text = render(&conflation);
        let create = text.find("<create>").expect("create block");
        let modify = text.find("<modify>").expect("modify block");
        assert!(create < modify);
        assert!(text.trim_end().ends_with("</osmChange>"));
    }

    #[rstest]
    fn untagged_nodes_are_empty_elements() {
        let conflation = Conflation {
            modifications: vec![ModificationRecord {
                feature: FeatureRef::new(FeatureKind::Node, 1),
                new_version: 2,
                merged_tags: Tags::new(),
                structure: Structure::Node(Coord { x: 0.0, y: 0.0 }),
            }],
            ..Conflation::default()
        };
        let text = render(&conflation);
        assert!(text.contains(r#"<node id="1" version="2" lat="0.0000000" lon="0.0000000"/>"#));
        assert!(!text.contains("<create>"));
    }
}
