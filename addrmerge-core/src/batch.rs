//! The batch of surveyed address records submitted for one conflation run.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use geo::{Point, Rect};
use thiserror::Error;

use crate::feature::{AddressKey, Tags};

/// A newly surveyed address.
///
/// Coordinates are WGS84 with `x = longitude` and `y = latitude`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressRecord {
    /// Identifier from the import document, unique within a batch.
    pub import_id: i64,
    /// Surveyed position.
    pub location: Point<f64>,
    /// Tags to merge onto a matched feature or emit on a new one.
    pub tags: Tags,
}

impl AddressRecord {
    /// Construct a record.
    ///
    /// # Examples
    /// ```
    /// use geo::Point;
    /// use addrmerge_core::{AddressRecord, Tags};
    ///
    /// let record = AddressRecord::new(-1, Point::new(-123.1, 49.2), Tags::new());
    /// assert_eq!(record.import_id, -1);
    /// ```
    #[must_use]
    pub const fn new(import_id: i64, location: Point<f64>, tags: Tags) -> Self {
        Self {
            import_id,
            location,
            tags,
        }
    }

    /// The record's address triple.
    #[must_use]
    pub fn address(&self) -> AddressKey<'_> {
        AddressKey::from_tags(&self.tags)
    }
}

/// Errors returned by [`ImportBatch::new`].
#[derive(Debug, Error, PartialEq)]
pub enum ImportBatchError {
    /// Two records share an import identifier.
    #[error("import id {import_id} appears more than once in the batch")]
    DuplicateImportId {
        /// The repeated identifier.
        import_id: i64,
    },
    /// A record's coordinates are not a usable WGS84 position.
    #[error("import record {import_id} has invalid coordinates ({lon}, {lat})")]
    InvalidLocation {
        /// Identifier of the offending record.
        import_id: i64,
        /// Longitude as supplied.
        lon: f64,
        /// Latitude as supplied.
        lat: f64,
    },
}

/// Address records keyed by import identifier.
///
/// A batch is built once per run and owned by the caller; matching borrows it
/// and never mutates it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportBatch {
    records: BTreeMap<i64, AddressRecord>,
}

impl ImportBatch {
    /// Validate and collect records.
    ///
    /// # Errors
    /// Fails on the first duplicate identifier or out-of-range coordinate; a
    /// partially valid batch is never returned.
    pub fn new<I>(records: I) -> Result<Self, ImportBatchError>
    where
        I: IntoIterator<Item = AddressRecord>,
    {
        let mut collected = BTreeMap::new();
        for record in records {
            validate_location(&record)?;
            match collected.entry(record.import_id) {
                Entry::Occupied(_) => {
                    return Err(ImportBatchError::DuplicateImportId {
                        import_id: record.import_id,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
            }
        }
        Ok(Self { records: collected })
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by import identifier.
    #[must_use]
    pub fn get(&self, import_id: i64) -> Option<&AddressRecord> {
        self.records.get(&import_id)
    }

    /// Records in ascending import-id order.
    pub fn iter(&self) -> impl Iterator<Item = &AddressRecord> + '_ {
        self.records.values()
    }

    /// Import identifiers in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.records.keys().copied()
    }

    /// Bounding box of every record location, or `None` for an empty batch.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        let mut locations = self.records.values().map(|record| record.location);
        let first = locations.next()?;
        Some(locations.fold(Rect::new(first.0, first.0), |bounds, point| {
            Rect::new(
                geo::Coord {
                    x: bounds.min().x.min(point.x()),
                    y: bounds.min().y.min(point.y()),
                },
                geo::Coord {
                    x: bounds.max().x.max(point.x()),
                    y: bounds.max().y.max(point.y()),
                },
            )
        }))
    }
}

fn validate_location(record: &AddressRecord) -> Result<(), ImportBatchError> {
    let lon = record.location.x();
    let lat = record.location.y();
    let valid = lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat);
    if valid {
        Ok(())
    } else {
        Err(ImportBatchError::InvalidLocation {
            import_id: record.import_id,
            lon,
            lat,
        })
    }
}
