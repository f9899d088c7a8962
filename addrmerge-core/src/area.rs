//! The area of interest a feature snapshot is restricted to.

use geo::{Coord, Rect};
use thiserror::Error;

use crate::batch::ImportBatch;
use crate::geometry::degree_padding;

/// Errors returned when constructing an [`AreaOfInterest`].
#[derive(Debug, Error, PartialEq)]
pub enum AreaOfInterestError {
    /// A corner was NaN, infinite or outside WGS84 bounds.
    #[error("area corner ({lon}, {lat}) is not a valid WGS84 coordinate")]
    InvalidCoordinate {
        /// Longitude as supplied.
        lon: f64,
        /// Latitude as supplied.
        lat: f64,
    },
    /// The minimum corner lies east or north of the maximum corner.
    #[error("area minimum corner must lie south-west of the maximum corner")]
    InvertedBounds,
    /// The batch was empty, so no area can be derived from it.
    #[error("cannot derive an area of interest from an empty import batch")]
    EmptyBatch,
    /// The margin was negative or not finite.
    #[error("area margin must be a finite, non-negative distance (got {0})")]
    InvalidMargin(f64),
}

/// A validated WGS84 bounding box (`x = longitude`, `y = latitude`).
///
/// Areas crossing the antimeridian are not modelled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaOfInterest {
    bounds: Rect<f64>,
}

impl AreaOfInterest {
    /// Validate explicit bounds.
    ///
    /// Unlike `Rect::new`, corners are not silently reordered: an inverted box
    /// is an error.
    ///
    /// # Errors
    /// Fails on non-finite or out-of-range corners and on inverted bounds.
    ///
    /// # Examples
    /// ```
    /// use addrmerge_core::AreaOfInterest;
    ///
    /// let area = AreaOfInterest::from_bounds(-123.2, 49.2, -123.0, 49.3).expect("valid area");
    /// assert!(area.contains(-123.1, 49.25));
    /// assert!(AreaOfInterest::from_bounds(0.0, 0.0, -1.0, 1.0).is_err());
    /// ```
    pub fn from_bounds(
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<Self, AreaOfInterestError> {
        validate_corner(min_lon, min_lat)?;
        validate_corner(max_lon, max_lat)?;
        if min_lon > max_lon || min_lat > max_lat {
            return Err(AreaOfInterestError::InvertedBounds);
        }
        Ok(Self {
            bounds: Rect::new(
                Coord {
                    x: min_lon,
                    y: min_lat,
                },
                Coord {
                    x: max_lon,
                    y: max_lat,
                },
            ),
        })
    }

    /// The bounds of every record in `batch`, grown by `margin` metres and
    /// clamped to WGS84 limits.
    ///
    /// # Errors
    /// Fails for an empty batch or an unusable margin.
    #[expect(
        clippy::float_arithmetic,
        reason = "the batch bounds are grown by the padding in degrees"
    )]
    pub fn around_batch(batch: &ImportBatch, margin: f64) -> Result<Self, AreaOfInterestError> {
        if !margin.is_finite() || margin < 0.0 {
            return Err(AreaOfInterestError::InvalidMargin(margin));
        }
        let bounds = batch.bounds().ok_or(AreaOfInterestError::EmptyBatch)?;
        let latitude = bounds.max().y.abs().max(bounds.min().y.abs());
        let (lon_pad, lat_pad) = degree_padding(margin, latitude);
        Self::from_bounds(
            (bounds.min().x - lon_pad).max(-180.0),
            (bounds.min().y - lat_pad).max(-90.0),
            (bounds.max().x + lon_pad).min(180.0),
            (bounds.max().y + lat_pad).min(90.0),
        )
    }

    /// The validated bounds.
    #[must_use]
    pub const fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    /// Whether a coordinate lies inside or on the boundary.
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.bounds.min().x..=self.bounds.max().x).contains(&lon)
            && (self.bounds.min().y..=self.bounds.max().y).contains(&lat)
    }
}

fn validate_corner(lon: f64, lat: f64) -> Result<(), AreaOfInterestError> {
    let valid = lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat);
    if valid {
        Ok(())
    } else {
        Err(AreaOfInterestError::InvalidCoordinate { lon, lat })
    }
}
