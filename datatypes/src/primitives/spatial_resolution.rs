use std::convert::TryFrom;
use std::fmt;

use crate::error;
use crate::util::Result;
use serde::{Deserialize, Serialize};
use snafu::ensure;

/// The spatial resolution in SRS units
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SpatialResolution {
    pub x: f64,
    pub y: f64,
}

impl SpatialResolution {
    /// Create a new `SpatialResolution` object without checking the values
    pub fn new_unchecked(x: f64, y: f64) -> Self {
        SpatialResolution { x, y }
    }

    /// Create a new `SpatialResolution` object
    ///
    /// # Errors
    ///
    /// Fails with `InvalidResolution` if one of the values is not strictly positive
    ///
    pub fn new(x: f64, y: f64) -> Result<Self> {
        ensure!(x > 0.0, error::InvalidResolution { value: x });
        ensure!(y > 0.0, error::InvalidResolution { value: y });
        Ok(Self::new_unchecked(x, y))
    }

    /// Re-checks a possibly unchecked value
    pub fn validated(self) -> Result<Self> {
        Self::new(self.x, self.y)
    }

    pub fn one() -> Self {
        SpatialResolution { x: 1., y: 1. }
    }

    pub fn equal_with_tolerance(&self, other: &Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

impl TryFrom<(f64, f64)> for SpatialResolution {
    type Error = crate::error::Error;

    fn try_from(value: (f64, f64)) -> Result<Self, Self::Error> {
        Self::new(value.0, value.1)
    }
}

impl fmt::Display for SpatialResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_values() {
        assert!(SpatialResolution::new(0.0, 1.0).is_err());
        assert!(SpatialResolution::new(1.0, -2.0).is_err());
        assert!(SpatialResolution::new(f64::NAN, 1.0).is_err());
        assert!(SpatialResolution::try_from((30.0, 30.0)).is_ok());
    }

    #[test]
    fn validated() {
        assert!(SpatialResolution::new_unchecked(0.0, 1.0).validated().is_err());
        assert!(SpatialResolution::one().validated().is_ok());
    }
}
