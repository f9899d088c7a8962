//! Removal of unwanted tag keys from modifications.

use std::collections::BTreeSet;

use log::debug;

use crate::changeset::ModificationRecord;
use crate::options::{DEFAULT_STRIP_KEYS, MatchOptions};

/// Strips a stoplist of keys from modification records.
///
/// New records are never sanitised; only tags merged onto existing features
/// pass through here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSanitizer {
    stoplist: BTreeSet<String>,
}

impl Default for TagSanitizer {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl TagSanitizer {
    /// The default stoplist extended by `keys`.
    ///
    /// # Examples
    /// ```
    /// use addrmerge_core::TagSanitizer;
    ///
    /// let sanitizer = TagSanitizer::new(["source"]);
    /// assert!(sanitizer.stoplist().contains("source"));
    /// assert!(sanitizer.stoplist().contains("created_by"));
    /// ```
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut stoplist: BTreeSet<String> = DEFAULT_STRIP_KEYS
            .iter()
            .map(|key| (*key).to_owned())
            .collect();
        stoplist.extend(keys.into_iter().map(Into::into));
        Self { stoplist }
    }

    /// The stoplist configured in `options`.
    #[must_use]
    pub fn from_options(options: &MatchOptions) -> Self {
        Self::new(options.strip_keys().iter().cloned())
    }

    /// Keys this sanitizer removes.
    #[must_use]
    pub const fn stoplist(&self) -> &BTreeSet<String> {
        &self.stoplist
    }

    /// Remove stoplist keys from every record, returning how many tags went.
    pub fn sanitize(&self, modifications: &mut [ModificationRecord]) -> usize {
        let mut removed = 0;
        for modification in modifications {
            let before = modification.merged_tags.len();
            modification
                .merged_tags
                .retain(|key, _| !self.stoplist.contains(key));
            let stripped = before - modification.merged_tags.len();
            if stripped > 0 {
                debug!("Stripped {stripped} tag(s) from {}", modification.feature);
            }
            removed += stripped;
        }
        removed
    }
}
