use super::Coordinate2D;
use crate::error;
use crate::util::Result;
use serde::{Deserialize, Serialize};
use snafu::ensure;

#[derive(Copy, Clone, Serialize, Deserialize, PartialEq, Debug)]
/// The extent of a grid in map coordinates.
/// Note: may degenerate to a point!
pub struct BoundingBox2D {
    lower_left_coordinate: Coordinate2D,
    upper_right_coordinate: Coordinate2D,
}

impl BoundingBox2D {
    /// Creates a new bounding box
    ///
    /// # Examples
    ///
    /// ```
    /// use applier_datatypes::primitives::{Coordinate2D, BoundingBox2D};
    ///
    /// let ll = Coordinate2D::new(1.0, 1.0);
    /// let ur = Coordinate2D::new(2.0, 2.0);
    /// let bbox = BoundingBox2D::new(ll, ur).unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// This constructor fails if the coordinate's values are not in order
    ///
    pub fn new(
        lower_left_coordinate: Coordinate2D,
        upper_right_coordinate: Coordinate2D,
    ) -> Result<Self> {
        ensure!(
            lower_left_coordinate.x <= upper_right_coordinate.x
                && lower_left_coordinate.y <= upper_right_coordinate.y,
            error::InvalidBoundingBox {
                lower_left_coordinate,
                upper_right_coordinate
            }
        );
        Ok(Self {
            lower_left_coordinate,
            upper_right_coordinate,
        })
    }

    pub fn new_unchecked(
        lower_left_coordinate: Coordinate2D,
        upper_right_coordinate: Coordinate2D,
    ) -> Self {
        Self {
            lower_left_coordinate,
            upper_right_coordinate,
        }
    }

    /// Creates a new bounding box with `upper_left` and `lower_right` coordinates
    /// This is usually used with raster data and matches with the geo transform
    ///
    /// # Examples
    ///
    /// ```
    /// use applier_datatypes::primitives::{Coordinate2D, BoundingBox2D};
    ///
    /// let ul = Coordinate2D::new(1.0, 2.0);
    /// let lr = Coordinate2D::new(2.0, 1.0);
    /// let bbox = BoundingBox2D::new_upper_left_lower_right(ul, lr).unwrap();
    /// ```
    ///
    pub fn new_upper_left_lower_right(
        upper_left_coordinate: Coordinate2D,
        lower_right_coordinate: Coordinate2D,
    ) -> Result<Self> {
        let lower_left_coordinate = (upper_left_coordinate.x, lower_right_coordinate.y).into();
        let upper_right_coordinate = (lower_right_coordinate.x, upper_left_coordinate.y).into();
        BoundingBox2D::new(lower_left_coordinate, upper_right_coordinate)
    }

    pub fn new_upper_left_lower_right_unchecked(
        upper_left_coordinate: Coordinate2D,
        lower_right_coordinate: Coordinate2D,
    ) -> Self {
        let lower_left_coordinate = (upper_left_coordinate.x, lower_right_coordinate.y).into();
        let upper_right_coordinate = (lower_right_coordinate.x, upper_left_coordinate.y).into();
        BoundingBox2D::new_unchecked(lower_left_coordinate, upper_right_coordinate)
    }

    pub fn lower_left(&self) -> Coordinate2D {
        self.lower_left_coordinate
    }

    pub fn upper_right(&self) -> Coordinate2D {
        self.upper_right_coordinate
    }

    pub fn upper_left(&self) -> Coordinate2D {
        (self.lower_left_coordinate.x, self.upper_right_coordinate.y).into()
    }

    pub fn lower_right(&self) -> Coordinate2D {
        (self.upper_right_coordinate.x, self.lower_left_coordinate.y).into()
    }

    pub fn size_x(&self) -> f64 {
        self.upper_right_coordinate.x - self.lower_left_coordinate.x
    }

    pub fn size_y(&self) -> f64 {
        self.upper_right_coordinate.y - self.lower_left_coordinate.y
    }

    /// Checks whether all corners differ by at most `tolerance`
    pub fn equal_with_tolerance(&self, other: &Self, tolerance: f64) -> bool {
        self.lower_left_coordinate
            .equal_with_tolerance(other.lower_left_coordinate, tolerance)
            && self
                .upper_right_coordinate
                .equal_with_tolerance(other.upper_right_coordinate, tolerance)
    }

    /// Checks whether `self` lies inside `other`, allowing `tolerance` at the edges
    ///
    /// # Examples
    ///
    /// ```
    /// use applier_datatypes::primitives::BoundingBox2D;
    ///
    /// let outer = BoundingBox2D::new((0.0, 0.0).into(), (10.0, 10.0).into()).unwrap();
    /// let inner = BoundingBox2D::new((0.0, 2.0).into(), (10.000001, 3.0).into()).unwrap();
    ///
    /// assert!(inner.within_with_tolerance(&outer, 1e-5));
    /// assert!(!outer.within_with_tolerance(&inner, 1e-5));
    /// ```
    pub fn within_with_tolerance(&self, other: &Self, tolerance: f64) -> bool {
        self.lower_left_coordinate.x >= other.lower_left_coordinate.x - tolerance
            && self.lower_left_coordinate.y >= other.lower_left_coordinate.y - tolerance
            && self.upper_right_coordinate.x <= other.upper_right_coordinate.x + tolerance
            && self.upper_right_coordinate.y <= other.upper_right_coordinate.y + tolerance
    }

    /// Checks whether the interiors of both boxes overlap
    pub fn intersects_bbox(&self, other: &Self) -> bool {
        self.lower_left_coordinate.x < other.upper_right_coordinate.x
            && other.lower_left_coordinate.x < self.upper_right_coordinate.x
            && self.lower_left_coordinate.y < other.upper_right_coordinate.y
            && other.lower_left_coordinate.y < self.upper_right_coordinate.y
    }

    /// Returns the intersection of both boxes or `None` if their interiors do not overlap
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if !self.intersects_bbox(other) {
            return None;
        }

        Some(Self::new_unchecked(
            self.lower_left_coordinate
                .max_elements(other.lower_left_coordinate),
            self.upper_right_coordinate
                .min_elements(other.upper_right_coordinate),
        ))
    }

    /// Returns the smallest box containing both boxes
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::new_unchecked(
            self.lower_left_coordinate
                .min_elements(other.lower_left_coordinate),
            self.upper_right_coordinate
                .max_elements(other.upper_right_coordinate),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_order() {
        assert!(BoundingBox2D::new((2.0, 0.0).into(), (1.0, 1.0).into()).is_err());
        assert!(
            BoundingBox2D::new_upper_left_lower_right((0.0, 0.0).into(), (1.0, 1.0).into())
                .is_err()
        );
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn corners() {
        let bbox =
            BoundingBox2D::new_upper_left_lower_right((0.0, 10.0).into(), (5.0, 4.0).into())
                .unwrap();

        assert_eq!(bbox.lower_left(), (0.0, 4.0).into());
        assert_eq!(bbox.upper_right(), (5.0, 10.0).into());
        assert_eq!(bbox.upper_left(), (0.0, 10.0).into());
        assert_eq!(bbox.lower_right(), (5.0, 4.0).into());
        assert_eq!(bbox.size_x(), 5.0);
        assert_eq!(bbox.size_y(), 6.0);
    }

    #[test]
    fn intersection() {
        let a = BoundingBox2D::new((0.0, 0.0).into(), (10.0, 10.0).into()).unwrap();
        let b = BoundingBox2D::new((5.0, -5.0).into(), (15.0, 5.0).into()).unwrap();

        assert_eq!(
            a.intersection(&b),
            Some(BoundingBox2D::new((5.0, 0.0).into(), (10.0, 5.0).into()).unwrap())
        );
    }

    #[test]
    fn touching_boxes_do_not_intersect() {
        let a = BoundingBox2D::new((0.0, 0.0).into(), (10.0, 10.0).into()).unwrap();
        let b = BoundingBox2D::new((10.0, 0.0).into(), (20.0, 10.0).into()).unwrap();

        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn union() {
        let a = BoundingBox2D::new((0.0, 0.0).into(), (10.0, 10.0).into()).unwrap();
        let b = BoundingBox2D::new((5.0, -5.0).into(), (15.0, 5.0).into()).unwrap();

        assert_eq!(
            a.union(&b),
            BoundingBox2D::new((0.0, -5.0).into(), (15.0, 10.0).into()).unwrap()
        );
    }

    #[test]
    fn equal_with_tolerance() {
        let a = BoundingBox2D::new((0.0, 0.0).into(), (10.0, 10.0).into()).unwrap();
        let b = BoundingBox2D::new((0.000_001, 0.0).into(), (10.0, 9.999_999).into()).unwrap();

        assert!(a.equal_with_tolerance(&b, 1e-5));
        assert!(!a.equal_with_tolerance(&b, 1e-7));
    }
}
