use crate::error;
use crate::primitives::{BoundingBox2D, Coordinate2D, SpatialResolution};
use crate::raster::{
    BlockIter, BlockTiling, GeoTransform, GridIdx2D, GridShape2D, PixelCoordinate, PixelWindow,
};
use crate::spatial_reference::SpatialReference;
use crate::util::Result;
use serde::{Deserialize, Serialize};
use snafu::ensure;

/// The spatial reference frame of a raster: upper left location, pixel resolution,
/// raster shape and spatial reference.
///
/// A `Grid` is immutable, all transformations return new values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    geo_transform: GeoTransform,
    shape: GridShape2D,
    spatial_reference: SpatialReference,
}

impl Grid {
    /// Creates a grid from its upper left corner, resolution and shape
    ///
    /// # Examples
    ///
    /// ```
    /// use applier_datatypes::primitives::SpatialResolution;
    /// use applier_datatypes::raster::{Grid, GridShape2D};
    /// use applier_datatypes::spatial_reference::SpatialReference;
    ///
    /// let grid = Grid::new(
    ///     (0.0, 0.0).into(),
    ///     SpatialResolution::new(2.0, 2.0).unwrap(),
    ///     GridShape2D::new([3, 5]).unwrap(),
    ///     SpatialReference::wgs84(),
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(grid.lower_right(), (10.0, -6.0).into());
    /// ```
    pub fn new(
        upper_left: Coordinate2D,
        resolution: SpatialResolution,
        shape: GridShape2D,
        spatial_reference: SpatialReference,
    ) -> Result<Self> {
        let resolution = resolution.validated()?;
        let shape = GridShape2D::new(shape.shape_array)?;

        Ok(Self {
            geo_transform: GeoTransform::new(upper_left, resolution.x, -resolution.y),
            shape,
            spatial_reference,
        })
    }

    /// Creates a grid covering `extent`.
    /// The extent is snapped to a multiple of the resolution, keeping its lower left corner.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidResolution` if the resolution is not strictly positive and
    /// with `InvalidGridShape` if the extent is smaller than half a pixel
    ///
    pub fn from_extent_resolution(
        extent: BoundingBox2D,
        resolution: SpatialResolution,
        spatial_reference: SpatialReference,
    ) -> Result<Self> {
        let resolution = resolution.validated()?;

        let columns = (extent.size_x() / resolution.x).round() as usize;
        let rows = (extent.size_y() / resolution.y).round() as usize;
        let shape = GridShape2D::new([rows, columns])?;

        let lower_left = extent.lower_left();
        let upper_left = Coordinate2D::new(lower_left.x, lower_left.y + rows as f64 * resolution.y);

        Ok(Self {
            geo_transform: GeoTransform::new(upper_left, resolution.x, -resolution.y),
            shape,
            spatial_reference,
        })
    }

    /// Creates a grid from a (north-up) geo transform, e.g. from a dataset's metadata
    pub fn from_geo_transform(
        geo_transform: GeoTransform,
        shape: GridShape2D,
        spatial_reference: SpatialReference,
    ) -> Result<Self> {
        ensure!(
            geo_transform.x_pixel_size > 0.0 && geo_transform.y_pixel_size < 0.0,
            error::InvalidGeoTransform {
                x_pixel_size: geo_transform.x_pixel_size,
                y_pixel_size: geo_transform.y_pixel_size,
            }
        );
        let shape = GridShape2D::new(shape.shape_array)?;

        Ok(Self {
            geo_transform,
            shape,
            spatial_reference,
        })
    }

    pub fn geo_transform(&self) -> GeoTransform {
        self.geo_transform
    }

    pub fn shape(&self) -> GridShape2D {
        self.shape
    }

    pub fn spatial_reference(&self) -> &SpatialReference {
        &self.spatial_reference
    }

    pub fn resolution(&self) -> SpatialResolution {
        SpatialResolution::new_unchecked(
            self.geo_transform.x_pixel_size,
            -self.geo_transform.y_pixel_size,
        )
    }

    pub fn upper_left(&self) -> Coordinate2D {
        self.geo_transform.origin_coordinate
    }

    pub fn lower_right(&self) -> Coordinate2D {
        self.geo_transform.grid_idx_to_coordinate_2d(GridIdx2D::new([
            self.shape.axis_size_y() as isize,
            self.shape.axis_size_x() as isize,
        ]))
    }

    pub fn extent(&self) -> BoundingBox2D {
        BoundingBox2D::new_upper_left_lower_right_unchecked(self.upper_left(), self.lower_right())
    }

    /// Returns a grid with the same upper left corner and a new resolution.
    /// The shape is chosen to cover the current extent as close as possible.
    pub fn with_resolution(&self, resolution: SpatialResolution) -> Result<Self> {
        let resolution = resolution.validated()?;
        let extent = self.extent();

        let columns = (extent.size_x() / resolution.x).round() as usize;
        let rows = (extent.size_y() / resolution.y).round() as usize;

        Self::new(
            self.upper_left(),
            resolution,
            GridShape2D::new([rows, columns])?,
            self.spatial_reference.clone(),
        )
    }

    /// Returns a grid with the same extent and spatial reference, but a new resolution.
    /// The extent is snapped like in [`Grid::from_extent_resolution`].
    pub fn at_resolution(&self, resolution: SpatialResolution) -> Result<Self> {
        Self::from_extent_resolution(self.extent(), resolution, self.spatial_reference.clone())
    }

    #[must_use]
    pub fn with_spatial_reference(&self, spatial_reference: SpatialReference) -> Self {
        Self {
            spatial_reference,
            ..self.clone()
        }
    }

    /// Returns the part of the grid inside `extent`, aligned to the pixels of `self`
    pub fn clip(&self, extent: &BoundingBox2D) -> Result<Self> {
        let own_extent = self.extent();
        let clipped = own_extent.intersection(extent).ok_or_else(|| {
            error::Error::EmptyIntersection {
                a: own_extent,
                b: *extent,
            }
        })?;

        Ok(
            Self::from_extent_resolution(clipped, self.resolution(), self.spatial_reference.clone())?
                .anchor(self.upper_left()),
        )
    }

    /// Returns a grid whose pixel edges align to `point`.
    /// The grid is shifted by less than half a pixel in each direction.
    #[must_use]
    pub fn anchor(&self, point: Coordinate2D) -> Self {
        let resolution = self.resolution();
        let lower_left = self.extent().lower_left();

        let mut x_offset = (lower_left.x - point.x).rem_euclid(resolution.x);
        let mut y_offset = (lower_left.y - point.y).rem_euclid(resolution.y);

        if x_offset > resolution.x / 2. {
            x_offset -= resolution.x;
        }
        if y_offset > resolution.y / 2. {
            y_offset -= resolution.y;
        }

        let upper_left = self.upper_left();

        Self {
            geo_transform: GeoTransform::new(
                (upper_left.x - x_offset, upper_left.y - y_offset).into(),
                self.geo_transform.x_pixel_size,
                self.geo_transform.y_pixel_size,
            ),
            shape: self.shape,
            spatial_reference: self.spatial_reference.clone(),
        }
    }

    /// Grows (or shrinks, for negative values) the grid by `buffer` pixels on each side
    pub fn pixel_buffer(&self, buffer: isize) -> Result<Self> {
        let rows = self.shape.axis_size_y() as isize + 2 * buffer;
        let columns = self.shape.axis_size_x() as isize + 2 * buffer;

        ensure!(
            rows > 0 && columns > 0,
            error::InvalidGridShape {
                rows: rows.max(0) as usize,
                columns: columns.max(0) as usize,
            }
        );

        Ok(Self {
            geo_transform: GeoTransform::new(
                self.geo_transform
                    .grid_idx_to_coordinate_2d(GridIdx2D::new([-buffer, -buffer])),
                self.geo_transform.x_pixel_size,
                self.geo_transform.y_pixel_size,
            ),
            shape: GridShape2D::new_unchecked([rows as usize, columns as usize]),
            spatial_reference: self.spatial_reference.clone(),
        })
    }

    /// Returns the grid covering the pixel rectangle `window` of `self`.
    ///
    /// The window may partially exceed the grid, in this case the returned grid
    /// also exceeds `self` and callers have to clip it.
    ///
    /// # Errors
    ///
    /// Fails with `OutOfBounds` if the window lies fully outside of the grid
    /// and with `InvalidGridShape` for empty windows
    ///
    pub fn subgrid(&self, window: PixelWindow) -> Result<Self> {
        let shape = GridShape2D::new(window.shape.shape_array)?;

        ensure!(
            window.intersection(&self.shape.full_window()).is_some(),
            error::OutOfBounds {
                window,
                shape: self.shape,
            }
        );

        Ok(self.subgrid_unchecked(PixelWindow::new(window.offset, shape)))
    }

    fn subgrid_unchecked(&self, window: PixelWindow) -> Self {
        Self {
            geo_transform: GeoTransform::new(
                self.geo_transform.grid_idx_to_coordinate_2d(window.offset),
                self.geo_transform.x_pixel_size,
                self.geo_transform.y_pixel_size,
            ),
            shape: window.shape,
            spatial_reference: self.spatial_reference.clone(),
        }
    }

    /// Tiles the grid into non-overlapping windows in row-major order.
    /// Windows in the last row and column are truncated to fit the grid.
    ///
    /// # Examples
    ///
    /// ```
    /// use applier_datatypes::primitives::SpatialResolution;
    /// use applier_datatypes::raster::{Grid, GridShape2D};
    /// use applier_datatypes::spatial_reference::SpatialReference;
    ///
    /// let grid = Grid::new(
    ///     (0.0, 0.0).into(),
    ///     SpatialResolution::one(),
    ///     GridShape2D::new([3, 5]).unwrap(),
    ///     SpatialReference::wgs84(),
    /// )
    /// .unwrap();
    ///
    /// let shapes: Vec<_> = grid
    ///     .subgrids(GridShape2D::new([2, 2]).unwrap())
    ///     .map(|(window, _)| window.shape.shape_array)
    ///     .collect();
    ///
    /// assert_eq!(shapes, vec![[2, 2], [2, 2], [2, 1], [1, 2], [1, 2], [1, 1]]);
    /// ```
    pub fn subgrids(&self, block_shape: GridShape2D) -> Subgrids {
        Subgrids::new(self.clone(), block_shape)
    }

    /// Maps a location in SRS coordinates to a fractional pixel position
    pub fn pixel_coordinate(&self, location: Coordinate2D) -> PixelCoordinate {
        self.geo_transform.coordinate_to_pixel_coordinate(location)
    }

    /// Maps a fractional pixel position to a location in SRS coordinates
    pub fn location(&self, pixel_coordinate: PixelCoordinate) -> Coordinate2D {
        self.geo_transform
            .pixel_coordinate_to_coordinate(pixel_coordinate)
    }

    /// The index of the pixel containing `location`, possibly outside of the grid
    pub fn pixel_index(&self, location: Coordinate2D) -> GridIdx2D {
        self.geo_transform.coordinate_to_grid_idx_2d(location)
    }

    /// The x coordinates of the pixel centers
    pub fn x_map_coordinates(&self) -> Vec<f64> {
        let upper_left = self.upper_left();
        (0..self.shape.axis_size_x())
            .map(|x| upper_left.x + (x as f64 + 0.5) * self.geo_transform.x_pixel_size)
            .collect()
    }

    /// The y coordinates of the pixel centers
    pub fn y_map_coordinates(&self) -> Vec<f64> {
        let upper_left = self.upper_left();
        (0..self.shape.axis_size_y())
            .map(|y| upper_left.y + (y as f64 + 0.5) * self.geo_transform.y_pixel_size)
            .collect()
    }

    /// The column indices of `other` that contain the pixel centers of `self`
    pub fn x_pixel_coordinates(&self, other: &Self) -> Vec<isize> {
        let origin = other.upper_left().x;
        let size = other.geo_transform.x_pixel_size;
        self.x_map_coordinates()
            .into_iter()
            .map(|x| ((x - origin) / size).floor() as isize)
            .collect()
    }

    /// The row indices of `other` that contain the pixel centers of `self`
    pub fn y_pixel_coordinates(&self, other: &Self) -> Vec<isize> {
        let origin = other.upper_left().y;
        let size = other.geo_transform.y_pixel_size;
        self.y_map_coordinates()
            .into_iter()
            .map(|y| ((y - origin) / size).floor() as isize)
            .collect()
    }

    /// Checks for equal spatial reference, shape and (within `tolerance`) extent and resolution
    pub fn equal(&self, other: &Self, tolerance: f64) -> bool {
        self.spatial_reference == other.spatial_reference
            && self.shape == other.shape
            && self
                .resolution()
                .equal_with_tolerance(&other.resolution(), tolerance)
            && self.extent().equal_with_tolerance(&other.extent(), tolerance)
    }

    /// Checks whether the extent of `self` lies inside the extent of `other`
    pub fn within(&self, other: &Self, tolerance: f64) -> bool {
        self.spatial_reference == other.spatial_reference
            && self
                .extent()
                .within_with_tolerance(&other.extent(), tolerance)
    }

    /// Checks whether the pixels of both grids share the same size and edges
    pub fn is_aligned_with(&self, other: &Self, tolerance: f64) -> bool {
        if self.spatial_reference != other.spatial_reference
            || !self
                .resolution()
                .equal_with_tolerance(&other.resolution(), tolerance)
        {
            return false;
        }

        let offset = self.pixel_coordinate(other.upper_left());
        let resolution = self.resolution();

        (offset.x - offset.x.round()).abs() * resolution.x <= tolerance
            && (offset.y - offset.y.round()).abs() * resolution.y <= tolerance
    }

    /// The window of `other` in the pixel space of `self`.
    /// Only meaningful for aligned grids, see [`Grid::is_aligned_with`].
    pub fn pixel_window_of(&self, other: &Self) -> PixelWindow {
        let offset = self.pixel_coordinate(other.upper_left());
        PixelWindow::new(
            GridIdx2D::new([offset.y.round() as isize, offset.x.round() as isize]),
            other.shape,
        )
    }

    /// The common part of both grids, with the resolution and pixel alignment of `self`
    pub fn intersection(&self, other: &Self) -> Result<Self> {
        self.ensure_same_spatial_reference(other)?;

        let (a, b) = (self.extent(), other.extent());
        let extent = a
            .intersection(&b)
            .ok_or(error::Error::EmptyIntersection { a, b })?;

        Ok(
            Self::from_extent_resolution(extent, self.resolution(), self.spatial_reference.clone())?
                .anchor(self.upper_left()),
        )
    }

    /// The grid covering both grids, with the resolution and pixel alignment of `self`
    pub fn union(&self, other: &Self) -> Result<Self> {
        self.ensure_same_spatial_reference(other)?;

        let extent = self.extent().union(&other.extent());

        Ok(
            Self::from_extent_resolution(extent, self.resolution(), self.spatial_reference.clone())?
                .anchor(self.upper_left()),
        )
    }

    fn ensure_same_spatial_reference(&self, other: &Self) -> Result<()> {
        ensure!(
            self.spatial_reference == other.spatial_reference,
            error::SpatialReferenceMismatch {
                expected: self.spatial_reference.to_string(),
                found: other.spatial_reference.to_string(),
            }
        );
        Ok(())
    }
}

/// Lazy iterator over the windows of a [`Grid`], see [`Grid::subgrids`].
/// The windows are the write windows of a [`BlockTiling`] without overlap.
#[derive(Clone, Debug)]
pub struct Subgrids {
    grid: Grid,
    block_shape: GridShape2D,
    blocks: BlockIter,
}

impl Subgrids {
    fn new(grid: Grid, block_shape: GridShape2D) -> Self {
        let tiling = BlockTiling::new(grid.shape(), block_shape, 0);

        Self {
            grid,
            block_shape: tiling.block_shape(),
            blocks: tiling.blocks(),
        }
    }

    pub fn block_shape(&self) -> GridShape2D {
        self.block_shape
    }
}

impl Iterator for Subgrids {
    type Item = (PixelWindow, Grid);

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.blocks.next()?.write_window;
        Some((window, self.grid.subgrid_unchecked(window)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.blocks.size_hint()
    }
}

impl ExactSizeIterator for Subgrids {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::helpers::DEFAULT_TOLERANCE;
    use pretty_assertions::assert_eq;

    fn grid(upper_left: (f64, f64), resolution: f64, shape: [usize; 2]) -> Grid {
        Grid::new(
            upper_left.into(),
            SpatialResolution::new(resolution, resolution).unwrap(),
            GridShape2D::new(shape).unwrap(),
            SpatialReference::wgs84(),
        )
        .unwrap()
    }

    #[test]
    fn invalid_resolution() {
        let extent = BoundingBox2D::new((0.0, 0.0).into(), (10.0, 10.0).into()).unwrap();

        assert!(matches!(
            Grid::from_extent_resolution(
                extent,
                SpatialResolution::new_unchecked(0.0, 1.0),
                SpatialReference::wgs84()
            ),
            Err(error::Error::InvalidResolution { .. })
        ));
        assert!(matches!(
            Grid::from_extent_resolution(
                extent,
                SpatialResolution::new_unchecked(1.0, -1.0),
                SpatialReference::wgs84()
            ),
            Err(error::Error::InvalidResolution { .. })
        ));
    }

    #[test]
    fn from_extent_resolution_snaps_extent() {
        let extent = BoundingBox2D::new((0.0, 0.0).into(), (10.4, 9.6).into()).unwrap();
        let grid = Grid::from_extent_resolution(
            extent,
            SpatialResolution::new(2.0, 2.0).unwrap(),
            SpatialReference::wgs84(),
        )
        .unwrap();

        assert_eq!(grid.shape(), GridShape2D::new([5, 5]).unwrap());
        assert_eq!(grid.upper_left(), (0.0, 10.0).into());
        assert_eq!(grid.lower_right(), (10.0, 0.0).into());
    }

    #[test]
    fn geo_transform_round_trip() {
        let grid = grid((100.0, 200.0), 30.0, [10, 20]);
        let same =
            Grid::from_geo_transform(grid.geo_transform(), grid.shape(), SpatialReference::wgs84())
                .unwrap();

        assert_eq!(grid, same);

        let extent_based = Grid::from_extent_resolution(
            grid.extent(),
            grid.resolution(),
            SpatialReference::wgs84(),
        )
        .unwrap();
        assert!(grid.equal(&extent_based, DEFAULT_TOLERANCE));
    }

    #[test]
    fn flipped_geo_transform() {
        assert!(
            Grid::from_geo_transform(
                GeoTransform::new_with_coordinate_x_y(0.0, 1.0, 0.0, 1.0),
                GridShape2D::new([2, 2]).unwrap(),
                SpatialReference::wgs84(),
            )
            .is_err()
        );
    }

    #[test]
    fn subgrid() {
        let grid = grid((0.0, 0.0), 2.0, [3, 5]);

        let sub = grid
            .subgrid(PixelWindow::new([1, 2].into(), [2, 2].into()))
            .unwrap();
        assert_eq!(sub.upper_left(), (4.0, -2.0).into());
        assert_eq!(sub.shape(), GridShape2D::new([2, 2]).unwrap());

        // partially outside is fine
        let partial = grid
            .subgrid(PixelWindow::new([-1, -1].into(), [2, 2].into()))
            .unwrap();
        assert_eq!(partial.upper_left(), (-2.0, 2.0).into());

        assert!(matches!(
            grid.subgrid(PixelWindow::new([3, 0].into(), [1, 1].into())),
            Err(error::Error::OutOfBounds { .. })
        ));
        assert!(matches!(
            grid.subgrid(PixelWindow::new([-2, 0].into(), [2, 5].into())),
            Err(error::Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn subgrids_partition_the_grid() {
        for (shape, block) in [
            ([3, 5], [2, 2]),
            ([7, 7], [7, 7]),
            ([10, 3], [4, 100]),
            ([1, 1], [256, 256]),
            ([13, 17], [5, 3]),
        ] {
            let grid = grid((10.0, 10.0), 1.0, shape);
            let mut covered = vec![0_u8; shape[0] * shape[1]];

            for (window, _) in grid.subgrids(GridShape2D::new(block).unwrap()) {
                assert!(window.is_inside(grid.shape()));
                for y in window.offset.y()..window.end_y() {
                    for x in window.offset.x()..window.end_x() {
                        covered[y as usize * shape[1] + x as usize] += 1;
                    }
                }
            }

            assert!(covered.iter().all(|&c| c == 1), "{shape:?} / {block:?}");
        }
    }

    #[test]
    fn subgrids_row_major_and_restartable() {
        let grid = grid((0.0, 0.0), 2.0, [3, 5]);
        let subgrids = grid.subgrids(GridShape2D::new([2, 2]).unwrap());

        assert_eq!(subgrids.len(), 6);

        let offsets: Vec<[isize; 2]> = subgrids.clone().map(|(w, _)| w.offset.0).collect();
        assert_eq!(
            offsets,
            vec![[0, 0], [0, 2], [0, 4], [2, 0], [2, 2], [2, 4]]
        );

        let again: Vec<[isize; 2]> = subgrids.map(|(w, _)| w.offset.0).collect();
        assert_eq!(offsets, again);
    }

    #[test]
    fn subgrids_follow_the_block_tiling() {
        let grid = grid((0.0, 0.0), 1.0, [13, 17]);
        let block_shape = GridShape2D::new([5, 3]).unwrap();

        let windows: Vec<PixelWindow> = grid.subgrids(block_shape).map(|(w, _)| w).collect();
        let tiling = BlockTiling::new(grid.shape(), block_shape, 2);

        assert_eq!(
            windows,
            tiling.blocks().map(|b| b.write_window).collect::<Vec<_>>()
        );
        assert_eq!(grid.subgrids(block_shape).block_shape(), tiling.block_shape());
    }

    #[test]
    fn subgrid_extents_union_to_grid_extent() {
        let grid = grid((0.0, 0.0), 2.0, [3, 5]);

        let extents: Vec<BoundingBox2D> = grid
            .subgrids(GridShape2D::new([2, 2]).unwrap())
            .map(|(_, g)| g.extent())
            .collect();

        let expected = [
            ((0.0, 0.0), (4.0, -4.0)),
            ((4.0, 0.0), (8.0, -4.0)),
            ((8.0, 0.0), (10.0, -4.0)),
            ((0.0, -4.0), (4.0, -6.0)),
            ((4.0, -4.0), (8.0, -6.0)),
            ((8.0, -4.0), (10.0, -6.0)),
        ]
        .map(|(ul, lr)| {
            BoundingBox2D::new_upper_left_lower_right(ul.into(), lr.into()).unwrap()
        });
        assert_eq!(extents, expected.to_vec());

        let union = extents
            .iter()
            .skip(1)
            .fold(extents[0], |acc, e| acc.union(e));
        assert_eq!(union, grid.extent());
    }

    #[test]
    fn pixel_coordinate_round_trip() {
        let grid = grid((-1234.5, 6789.25), 0.3, [40, 60]);

        for y in 0..40 {
            for x in 0..60 {
                let p = PixelCoordinate::new(x as f64 + 0.25, y as f64 + 0.75);
                let back = grid.pixel_coordinate(grid.location(p));
                assert!(p.equal_with_tolerance(&back, DEFAULT_TOLERANCE));
            }
        }

        assert_eq!(
            grid.pixel_index(grid.location(PixelCoordinate::new(3.5, 7.5))),
            GridIdx2D::new([7, 3])
        );
    }

    #[test]
    fn map_coordinates() {
        let grid = grid((0.0, 0.0), 2.0, [2, 3]);

        assert_eq!(grid.x_map_coordinates(), vec![1.0, 3.0, 5.0]);
        assert_eq!(grid.y_map_coordinates(), vec![-1.0, -3.0]);
    }

    #[test]
    fn pixel_coordinates_in_coarser_grid() {
        let fine = grid((1.0, -1.0), 1.0, [3, 4]);
        let coarse = grid((0.0, 0.0), 2.0, [3, 3]);

        assert_eq!(fine.x_pixel_coordinates(&coarse), vec![0, 1, 1, 2]);
        assert_eq!(fine.y_pixel_coordinates(&coarse), vec![0, 1, 1]);
    }

    #[test]
    fn resolution_changes() {
        let grid = grid((0.0, 0.0), 2.0, [3, 5]);

        let finer = grid
            .with_resolution(SpatialResolution::new(1.0, 1.0).unwrap())
            .unwrap();
        assert_eq!(finer.shape(), GridShape2D::new([6, 10]).unwrap());
        assert_eq!(finer.upper_left(), grid.upper_left());

        let coarser = grid
            .at_resolution(SpatialResolution::new(4.0, 4.0).unwrap())
            .unwrap();
        // 10 x 6 map units snap to 3 x 2 pixels (rounding half away from zero), anchored at the lower left
        assert_eq!(coarser.shape(), GridShape2D::new([2, 3]).unwrap());
        assert_eq!(coarser.extent().lower_left(), (0.0, -6.0).into());
    }

    #[test]
    fn pixel_buffer() {
        let grid = grid((0.0, 0.0), 2.0, [3, 5]);

        let buffered = grid.pixel_buffer(1).unwrap();
        assert_eq!(buffered.upper_left(), (-2.0, 2.0).into());
        assert_eq!(buffered.shape(), GridShape2D::new([5, 7]).unwrap());

        let shrunk = grid.pixel_buffer(-1).unwrap();
        assert_eq!(shrunk.shape(), GridShape2D::new([1, 3]).unwrap());

        assert!(grid.pixel_buffer(-2).is_err());
    }

    #[test]
    fn anchor() {
        let grid = grid((0.4, 0.0), 1.0, [2, 2]);

        let anchored = grid.anchor((0.0, 0.0).into());
        assert!(
            anchored
                .upper_left()
                .equal_with_tolerance((0.0, 0.0).into(), DEFAULT_TOLERANCE)
        );

        let grid = grid.anchor((0.7, 0.0).into());
        assert!(
            grid.upper_left()
                .equal_with_tolerance((0.7, 0.0).into(), DEFAULT_TOLERANCE)
        );
    }

    #[test]
    fn clip() {
        let grid = grid((0.0, 0.0), 1.0, [10, 10]);
        let clipped = grid
            .clip(&BoundingBox2D::new((2.2, -5.0).into(), (20.0, -1.1).into()).unwrap())
            .unwrap();

        assert!(clipped.is_aligned_with(&grid, DEFAULT_TOLERANCE));
        assert!(clipped.within(&grid, DEFAULT_TOLERANCE));
        assert_eq!(
            grid.pixel_window_of(&clipped),
            PixelWindow::new([1, 2].into(), [4, 8].into())
        );
    }

    #[test]
    fn intersection_and_union() {
        let a = grid((0.0, 0.0), 1.0, [10, 10]);
        let b = grid((5.0, -5.0), 1.0, [10, 10]);

        let intersection = a.intersection(&b).unwrap();
        assert!(intersection.equal(&grid((5.0, -5.0), 1.0, [5, 5]), DEFAULT_TOLERANCE));

        let union = a.union(&b).unwrap();
        assert!(union.equal(&grid((0.0, 0.0), 1.0, [15, 15]), DEFAULT_TOLERANCE));

        let far = grid((100.0, 100.0), 1.0, [1, 1]);
        assert!(matches!(
            a.intersection(&far),
            Err(error::Error::EmptyIntersection { .. })
        ));

        let other_sr = a.with_spatial_reference(SpatialReference::local("x"));
        assert!(matches!(
            a.union(&other_sr),
            Err(error::Error::SpatialReferenceMismatch { .. })
        ));
        assert!(!a.within(&other_sr, DEFAULT_TOLERANCE));
    }

    #[test]
    fn equal_with_tolerance() {
        let a = grid((0.0, 0.0), 1.0, [10, 10]);
        let b = grid((0.000_001, 0.0), 1.0, [10, 10]);
        let c = grid((0.1, 0.0), 1.0, [10, 10]);

        assert!(a.equal(&b, DEFAULT_TOLERANCE));
        assert!(!a.equal(&c, DEFAULT_TOLERANCE));
        assert!(!a.is_aligned_with(&c, DEFAULT_TOLERANCE));
        assert!(a.is_aligned_with(&grid((3.0, -7.0), 1.0, [1, 1]), DEFAULT_TOLERANCE));
    }
}
