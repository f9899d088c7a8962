//! Removal of records that repeat an existing address verbatim.

use log::debug;

use crate::batch::AddressRecord;
use crate::changeset::ChangesetBuilder;
use crate::index::SpatialIndex;

/// Import ids of `records` whose full address triple already exists.
///
/// A record lacking any part of the triple is never a duplicate.
pub fn find_duplicates<'a, I>(records: I, index: &SpatialIndex) -> Vec<i64>
where
    I: IntoIterator<Item = &'a AddressRecord>,
{
    records
        .into_iter()
        .filter(|record| {
            let existing = index.exact_address(&record.address());
            if let Some(feature) = existing.first() {
                debug!(
                    "Import record {} repeats the address of {}",
                    record.import_id,
                    feature.feature_ref()
                );
            }
            !existing.is_empty()
        })
        .map(|record| record.import_id)
        .collect()
}

/// Mark every pending exact duplicate, returning how many were found.
pub fn remove_duplicates(index: &SpatialIndex, builder: &mut ChangesetBuilder<'_>) -> usize {
    let duplicates = find_duplicates(builder.pending_records(), index);
    duplicates
        .into_iter()
        .filter(|import_id| builder.mark_duplicate(*import_id))
        .count()
}
