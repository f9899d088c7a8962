//! Accumulation of matches into a partition and a set of modifications.
//!
//! [`ChangesetBuilder`] is the only place where matcher decisions become
//! state. Matchers discover candidates against the read-only snapshot and then
//! hand their decisions to the builder in ascending import-id order.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::batch::{AddressRecord, ImportBatch};
use crate::feature::{ExistingFeature, FeatureRef, Structure, Tags};

/// A pending update to an existing feature.
#[derive(Debug, Clone, PartialEq)]
pub struct ModificationRecord {
    /// The feature being updated.
    pub feature: FeatureRef,
    /// The stored version plus one.
    pub new_version: u32,
    /// Import tags overlaid by the feature's own tags.
    pub merged_tags: Tags,
    /// Structural payload copied from the feature.
    pub structure: Structure,
}

/// The three-way partition of a batch's import identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Records that repeat an existing address exactly.
    pub duplicates: BTreeSet<i64>,
    /// Records merged into at least one existing feature.
    pub consumed: BTreeSet<i64>,
    /// Records emitted as new features.
    pub unmatched: BTreeSet<i64>,
}

impl MatchOutcome {
    /// Total number of partitioned identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.duplicates.len() + self.consumed.len() + self.unmatched.len()
    }

    /// Whether the partition is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The result of one conflation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conflation {
    /// Partition of the batch.
    pub outcome: MatchOutcome,
    /// Unmatched records in ascending import-id order.
    pub new_records: Vec<AddressRecord>,
    /// Modifications in ascending feature order, one per feature.
    pub modifications: Vec<ModificationRecord>,
}

/// Merge import tags with an existing feature's tags.
///
/// Keys unique to either side are kept; on a shared key the existing value
/// wins.
///
/// # Examples
/// ```
/// use addrmerge_core::{Tags, merge_tags};
///
/// let import = Tags::from([
///     ("addr:city".to_owned(), "Springfield".to_owned()),
///     ("name".to_owned(), "Imported".to_owned()),
/// ]);
/// let existing = Tags::from([("name".to_owned(), "Mapped".to_owned())]);
/// let merged = merge_tags(&import, &existing);
/// assert_eq!(merged.get("name").map(String::as_str), Some("Mapped"));
/// assert_eq!(merged.get("addr:city").map(String::as_str), Some("Springfield"));
/// ```
#[must_use]
pub fn merge_tags(import: &Tags, existing: &Tags) -> Tags {
    let mut merged = import.clone();
    merged.extend(
        existing
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    merged
}

/// Single-writer accumulator for one batch.
#[derive(Debug)]
pub struct ChangesetBuilder<'b> {
    batch: &'b ImportBatch,
    pending: BTreeSet<i64>,
    duplicates: BTreeSet<i64>,
    consumed: BTreeSet<i64>,
    modifications: BTreeMap<FeatureRef, ModificationRecord>,
}

impl<'b> ChangesetBuilder<'b> {
    /// Start with every record of `batch` pending.
    #[must_use]
    pub fn new(batch: &'b ImportBatch) -> Self {
        Self {
            batch,
            pending: batch.ids().collect(),
            duplicates: BTreeSet::new(),
            consumed: BTreeSet::new(),
            modifications: BTreeMap::new(),
        }
    }

    /// The batch being partitioned.
    #[must_use]
    pub const fn batch(&self) -> &'b ImportBatch {
        self.batch
    }

    /// Whether `import_id` has not yet been classified.
    #[must_use]
    pub fn is_pending(&self, import_id: i64) -> bool {
        self.pending.contains(&import_id)
    }

    /// Pending records in ascending import-id order.
    pub fn pending_records(&self) -> impl Iterator<Item = &'b AddressRecord> + '_ {
        let batch = self.batch;
        self.pending.iter().filter_map(move |id| batch.get(*id))
    }

    /// Whether `feature` already holds a modification.
    #[must_use]
    pub fn is_modified(&self, feature: FeatureRef) -> bool {
        self.modifications.contains_key(&feature)
    }

    /// Classify a pending record as a duplicate.
    ///
    /// Returns `false` when the record is not pending.
    pub fn mark_duplicate(&mut self, import_id: i64) -> bool {
        if !self.pending.remove(&import_id) {
            return false;
        }
        debug!("Import record {import_id} duplicates an existing address");
        self.duplicates.insert(import_id);
        true
    }

    /// Merge a record into `feature` and mark the record consumed.
    ///
    /// The record must be pending or already consumed, so one record may
    /// update several features. Returns `false`, changing nothing, when the
    /// feature already holds a modification or the record is unknown or a
    /// duplicate.
    pub fn record_match(&mut self, import_id: i64, feature: &ExistingFeature) -> bool {
        let target = feature.feature_ref();
        if self.is_modified(target) {
            return false;
        }
        if !self.pending.contains(&import_id) && !self.consumed.contains(&import_id) {
            return false;
        }
        let Some(record) = self.batch.get(import_id) else {
            return false;
        };

        self.modifications.insert(
            target,
            ModificationRecord {
                feature: target,
                new_version: feature.version.saturating_add(1),
                merged_tags: merge_tags(&record.tags, &feature.tags),
                structure: feature.structure.clone(),
            },
        );
        self.pending.remove(&import_id);
        self.consumed.insert(import_id);
        debug!("Import record {import_id} merged into {target}");
        true
    }

    /// Close the run: every record still pending becomes unmatched.
    #[must_use]
    pub fn finish(self) -> Conflation {
        let new_records = self
            .pending
            .iter()
            .filter_map(|id| self.batch.get(*id))
            .cloned()
            .collect();
        Conflation {
            outcome: MatchOutcome {
                duplicates: self.duplicates,
                consumed: self.consumed,
                unmatched: self.pending,
            },
            new_records,
            modifications: self.modifications.into_values().collect(),
        }
    }
}
