use crate::error;
use crate::util::Result;
use crate::util::ranges::intersect_half_open;
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt;

/// The shape of a two-dimensional pixel grid as `[rows, columns]` ~ `[y, x]`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape2D {
    pub shape_array: [usize; 2],
}

impl GridShape2D {
    /// Creates a shape with strictly positive axis sizes
    ///
    /// # Examples
    ///
    /// ```
    /// use applier_datatypes::raster::GridShape2D;
    ///
    /// let shape = GridShape2D::new([3, 5]).unwrap();
    /// assert_eq!(shape.number_of_elements(), 15);
    ///
    /// assert!(GridShape2D::new([0, 5]).is_err());
    /// ```
    pub fn new(shape_array: [usize; 2]) -> Result<Self> {
        let [rows, columns] = shape_array;
        ensure!(
            rows > 0 && columns > 0,
            error::InvalidGridShape { rows, columns }
        );
        Ok(Self { shape_array })
    }

    pub fn new_unchecked(shape_array: [usize; 2]) -> Self {
        Self { shape_array }
    }

    pub fn axis_size_y(&self) -> usize {
        self.shape_array[0]
    }

    pub fn axis_size_x(&self) -> usize {
        self.shape_array[1]
    }

    pub fn number_of_elements(&self) -> usize {
        self.shape_array[0] * self.shape_array[1]
    }

    /// The window covering the whole shape
    pub fn full_window(&self) -> PixelWindow {
        PixelWindow::new(GridIdx2D::new([0, 0]), *self)
    }
}

impl From<[usize; 2]> for GridShape2D {
    fn from(shape_array: [usize; 2]) -> Self {
        Self::new_unchecked(shape_array)
    }
}

impl fmt::Display for GridShape2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.shape_array[0], self.shape_array[1])
    }
}

/// A pixel index `[row, column]` ~ `[y, x]`, possibly outside of a grid
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridIdx2D(pub [isize; 2]);

impl GridIdx2D {
    pub fn new(index: [isize; 2]) -> Self {
        Self(index)
    }

    pub fn y(&self) -> isize {
        self.0[0]
    }

    pub fn x(&self) -> isize {
        self.0[1]
    }
}

impl From<[isize; 2]> for GridIdx2D {
    fn from(index: [isize; 2]) -> Self {
        Self(index)
    }
}

impl fmt::Display for GridIdx2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.0[0], self.0[1])
    }
}

/// A fractional pixel position, i.e. `(0.5, 0.5)` is the center of the upper left pixel
#[derive(Copy, Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelCoordinate {
    pub x: f64,
    pub y: f64,
}

impl PixelCoordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The index of the pixel containing this position
    pub fn containing_pixel(&self) -> GridIdx2D {
        GridIdx2D::new([self.y.floor() as isize, self.x.floor() as isize])
    }

    pub fn equal_with_tolerance(&self, other: &Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

/// A rectangular region of pixels, given by an offset and a shape
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelWindow {
    pub offset: GridIdx2D,
    pub shape: GridShape2D,
}

impl PixelWindow {
    pub fn new(offset: GridIdx2D, shape: GridShape2D) -> Self {
        Self { offset, shape }
    }

    /// The exclusive end row
    pub fn end_y(&self) -> isize {
        self.offset.y() + self.shape.axis_size_y() as isize
    }

    /// The exclusive end column
    pub fn end_x(&self) -> isize {
        self.offset.x() + self.shape.axis_size_x() as isize
    }

    pub fn contains(&self, index: GridIdx2D) -> bool {
        (self.offset.y()..self.end_y()).contains(&index.y())
            && (self.offset.x()..self.end_x()).contains(&index.x())
    }

    /// Checks whether the window lies completely inside a grid of the given shape
    pub fn is_inside(&self, shape: GridShape2D) -> bool {
        self.offset.y() >= 0
            && self.offset.x() >= 0
            && self.end_y() <= shape.axis_size_y() as isize
            && self.end_x() <= shape.axis_size_x() as isize
    }

    /// Returns the part of the window that lies inside `other`
    ///
    /// # Examples
    ///
    /// ```
    /// use applier_datatypes::raster::{GridIdx2D, GridShape2D, PixelWindow};
    ///
    /// let a = PixelWindow::new(GridIdx2D::new([-1, -1]), GridShape2D::new_unchecked([3, 3]));
    /// let b = GridShape2D::new_unchecked([5, 5]).full_window();
    ///
    /// assert_eq!(
    ///     a.intersection(&b),
    ///     Some(PixelWindow::new(GridIdx2D::new([0, 0]), GridShape2D::new_unchecked([2, 2])))
    /// );
    /// ```
    pub fn intersection(&self, other: &PixelWindow) -> Option<PixelWindow> {
        let (y_start, y_end) = intersect_half_open(
            (self.offset.y(), self.end_y()),
            (other.offset.y(), other.end_y()),
        )?;
        let (x_start, x_end) = intersect_half_open(
            (self.offset.x(), self.end_x()),
            (other.offset.x(), other.end_x()),
        )?;

        Some(PixelWindow::new(
            GridIdx2D::new([y_start, x_start]),
            GridShape2D::new_unchecked([(y_end - y_start) as usize, (x_end - x_start) as usize]),
        ))
    }

    /// Expresses `self` relative to the offset of `origin`
    #[must_use]
    pub fn relative_to(&self, origin: &PixelWindow) -> PixelWindow {
        PixelWindow::new(
            GridIdx2D::new([
                self.offset.y() - origin.offset.y(),
                self.offset.x() - origin.offset.x(),
            ]),
            self.shape,
        )
    }
}

impl fmt::Display for PixelWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{offset: {}, shape: {}}}", self.offset, self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_ends() {
        let window = PixelWindow::new([2, 3].into(), [4, 5].into());

        assert_eq!(window.end_y(), 6);
        assert_eq!(window.end_x(), 8);
        assert!(window.contains([2, 3].into()));
        assert!(window.contains([5, 7].into()));
        assert!(!window.contains([6, 7].into()));
    }

    #[test]
    fn inside() {
        let shape = GridShape2D::new([10, 10]).unwrap();

        assert!(PixelWindow::new([0, 0].into(), [10, 10].into()).is_inside(shape));
        assert!(!PixelWindow::new([1, 0].into(), [10, 10].into()).is_inside(shape));
        assert!(!PixelWindow::new([-1, 0].into(), [2, 2].into()).is_inside(shape));
    }

    #[test]
    fn disjoint_windows() {
        let a = PixelWindow::new([0, 0].into(), [2, 2].into());
        let b = PixelWindow::new([2, 0].into(), [2, 2].into());

        assert_eq!(a.intersection(&b), None);
    }

    #[test]
    fn relative() {
        let outer = PixelWindow::new([4, 4].into(), [6, 6].into());
        let inner = PixelWindow::new([5, 6].into(), [2, 2].into());

        assert_eq!(
            inner.relative_to(&outer),
            PixelWindow::new([1, 2].into(), [2, 2].into())
        );
    }

    #[test]
    fn containing_pixel() {
        assert_eq!(
            PixelCoordinate::new(0.5, 1.999).containing_pixel(),
            GridIdx2D::new([1, 0])
        );
        assert_eq!(
            PixelCoordinate::new(-0.5, 0.0).containing_pixel(),
            GridIdx2D::new([0, -1])
        );
    }
}
