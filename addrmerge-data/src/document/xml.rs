//! OSM XML import reader.

use std::io::BufRead;

use addrmerge_core::{AddressRecord, ImportBatch, Tags};
use geo::Point;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::DocumentError;

/// Parse OSM XML into an import batch.
///
/// Nodes marked `action="delete"` are skipped. Only node tags are read.
///
/// # Examples
/// ```
/// use addrmerge_data::parse_osm_xml;
///
/// let xml = r#"<osm version="0.6">
///   <node id="-1" lat="49.25" lon="-123.1">
///     <tag k="addr:housenumber" v="12"/>
///     <tag k="addr:street" v="Main St"/>
///   </node>
///   <node id="-2" lat="49.26" lon="-123.1"/>
/// </osm>"#;
/// let batch = parse_osm_xml(xml.as_bytes())?;
/// assert_eq!(batch.ids().collect::<Vec<_>>(), vec![-1]);
/// # Ok::<(), addrmerge_data::DocumentError>(())
/// ```
///
/// # Errors
/// Returns [`DocumentError`] for malformed XML, nodes missing an id or
/// coordinates, unparsable attribute values, and invalid batches.
pub fn parse_osm_xml<R: BufRead>(input: R) -> Result<ImportBatch, DocumentError> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut records = Vec::new();
    let mut current: Option<PendingNode> = None;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|source| DocumentError::Xml { source })?
        {
            Event::Start(ref e) if e.name().as_ref() == b"node" => {
                current = Some(PendingNode::from_element(e)?);
            }
            Event::Empty(ref e) if e.name().as_ref() == b"node" => {
                PendingNode::from_element(e)?.finish(&mut records);
            }
            Event::Empty(ref e) if e.name().as_ref() == b"tag" => {
                if let Some(node) = current.as_mut() {
                    node.push_tag(e)?;
                }
            }
            Event::End(ref e) if e.name().as_ref() == b"node" => {
                if let Some(node) = current.take() {
                    node.finish(&mut records);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(ImportBatch::new(records)?)
}

#[derive(Debug)]
struct PendingNode {
    id: i64,
    location: Point<f64>,
    tags: Tags,
    deleted: bool,
}

impl PendingNode {
    fn from_element(element: &BytesStart<'_>) -> Result<Self, DocumentError> {
        let mut id = None;
        let mut lat = None;
        let mut lon = None;
        let mut deleted = false;
        for (key, value) in attributes(element)? {
            match key.as_slice() {
                b"id" => id = Some(parse_attribute::<i64>("id", value)?),
                b"lat" => lat = Some(parse_attribute::<f64>("lat", value)?),
                b"lon" => lon = Some(parse_attribute::<f64>("lon", value)?),
                b"action" => deleted = value == "delete",
                _ => {}
            }
        }
        let id = id.ok_or(DocumentError::MissingAttribute {
            element: "node",
            attribute: "id",
        })?;
        let (Some(lat), Some(lon)) = (lat, lon) else {
            return Err(DocumentError::MissingCoordinates { id });
        };
        Ok(Self {
            id,
            location: Point::new(lon, lat),
            tags: Tags::new(),
            deleted,
        })
    }

    fn push_tag(&mut self, element: &BytesStart<'_>) -> Result<(), DocumentError> {
        let mut key = None;
        let mut value = None;
        for (name, text) in attributes(element)? {
            match name.as_slice() {
                b"k" => key = Some(text),
                b"v" => value = Some(text),
                _ => {}
            }
        }
        let key = key.ok_or(DocumentError::MissingAttribute {
            element: "tag",
            attribute: "k",
        })?;
        let value = value.ok_or(DocumentError::MissingAttribute {
            element: "tag",
            attribute: "v",
        })?;
        self.tags.insert(key, value);
        Ok(())
    }

    fn finish(self, records: &mut Vec<AddressRecord>) {
        if self.deleted || self.tags.is_empty() {
            return;
        }
        records.push(AddressRecord::new(self.id, self.location, self.tags));
    }
}

fn attributes(element: &BytesStart<'_>) -> Result<Vec<(Vec<u8>, String)>, DocumentError> {
    let mut collected = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute
            .map_err(quick_xml::Error::from)
            .map_err(|source| DocumentError::Xml { source })?;
        let value = attribute
            .unescape_value()
            .map_err(quick_xml::Error::from)
            .map_err(|source| DocumentError::Xml { source })?;
        collected.push((attribute.key.as_ref().to_vec(), value.into_owned()));
    }
    Ok(collected)
}

fn parse_attribute<T: std::str::FromStr>(
    attribute: &'static str,
    value: String,
) -> Result<T, DocumentError> {
    value
        .parse()
        .map_err(|_| DocumentError::InvalidAttribute { attribute, value })
}
