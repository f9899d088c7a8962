//! Tag collection for decoded OSM elements.

use addrmerge_core::Tags;

/// Copy borrowed key/value pairs into an owned tag map.
pub(crate) fn collect_tags<'a, T>(tags: T) -> Tags
where
    T: IntoIterator<Item = (&'a str, &'a str)>,
{
    tags.into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}
