//! Tunables for a conflation run.

use std::collections::BTreeSet;

use thiserror::Error;

/// Buffer radius applied to import records when none is configured.
pub const DEFAULT_BUFFER_METRES: f64 = 0.5;

/// Tag keys always stripped from modified features.
pub const DEFAULT_STRIP_KEYS: [&str; 3] = ["created_by", "odbl", "odbl:note"];

/// Errors returned by [`MatchOptions`] setters.
#[derive(Debug, Error, PartialEq)]
pub enum MatchOptionsError {
    /// A distance was negative, NaN or infinite.
    #[error("{option} must be a finite, non-negative distance in metres (got {value})")]
    InvalidDistance {
        /// Name of the offending option.
        option: &'static str,
        /// Value as supplied.
        value: f64,
    },
}

/// Options controlling which matchers run and how far they look.
///
/// # Examples
/// ```
/// use addrmerge_core::MatchOptions;
///
/// # fn main() -> Result<(), addrmerge_core::MatchOptionsError> {
/// let options = MatchOptions::default()
///     .with_nocity(5.0)?
///     .with_building(10.0)?
///     .with_strip_keys(["source"]);
/// assert_eq!(options.nocity(), Some(5.0));
/// assert!(options.strip_keys().contains("created_by"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchOptions {
    nocity: Option<f64>,
    building: Option<f64>,
    buffer: f64,
    strip: BTreeSet<String>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            nocity: None,
            building: None,
            buffer: DEFAULT_BUFFER_METRES,
            strip: DEFAULT_STRIP_KEYS.iter().map(|key| (*key).to_owned()).collect(),
        }
    }
}

impl MatchOptions {
    /// Enable the proximity matcher with the given radius.
    ///
    /// # Errors
    /// Rejects negative or non-finite distances.
    pub fn with_nocity(mut self, metres: f64) -> Result<Self, MatchOptionsError> {
        self.nocity = Some(validate("nocity", metres)?);
        Ok(self)
    }

    /// Enable the building matcher with the given radius.
    ///
    /// # Errors
    /// Rejects negative or non-finite distances.
    pub fn with_building(mut self, metres: f64) -> Result<Self, MatchOptionsError> {
        self.building = Some(validate("building", metres)?);
        Ok(self)
    }

    /// Override the buffer radius applied to each import record.
    ///
    /// # Errors
    /// Rejects negative or non-finite distances.
    pub fn with_buffer(mut self, metres: f64) -> Result<Self, MatchOptionsError> {
        self.buffer = validate("buffer", metres)?;
        Ok(self)
    }

    /// Add keys to the stoplist; the default keys always remain.
    #[must_use]
    pub fn with_strip_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strip.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Radius of the proximity matcher, if enabled.
    #[must_use]
    pub const fn nocity(&self) -> Option<f64> {
        self.nocity
    }

    /// Radius of the building matcher, if enabled.
    #[must_use]
    pub const fn building(&self) -> Option<f64> {
        self.building
    }

    /// Buffer radius applied to import records.
    #[must_use]
    pub const fn buffer(&self) -> f64 {
        self.buffer
    }

    /// Keys removed from modified features.
    #[must_use]
    pub const fn strip_keys(&self) -> &BTreeSet<String> {
        &self.strip
    }

    /// Largest distance any enabled matcher searches, including the buffer.
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        reason = "the search radius adds the buffer to the widest matcher"
    )]
    pub fn search_radius(&self) -> f64 {
        let widest = self
            .nocity
            .into_iter()
            .chain(self.building)
            .fold(0.0, f64::max);
        widest + self.buffer
    }

    /// Distance from a record beyond which no enabled matcher can see a
    /// feature.
    ///
    /// The building pass also inspects addressed features within `building`
    /// metres of a candidate building, so its radius counts twice.
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        reason = "the reach sums the search radius and the neighbour radius"
    )]
    pub fn snapshot_reach(&self) -> f64 {
        self.search_radius() + self.building.unwrap_or(0.0)
    }
}

fn validate(option: &'static str, value: f64) -> Result<f64, MatchOptionsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(MatchOptionsError::InvalidDistance { option, value })
    }
}
