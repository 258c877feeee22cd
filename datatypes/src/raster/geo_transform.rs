use crate::primitives::Coordinate2D;
use serde::{Deserialize, Serialize};

use super::{GridIdx2D, PixelCoordinate};

/// This is a typedef for the `GDAL GeoTransform`. It represents an affine transformation matrix.
pub type GdalGeoTransform = [f64; 6];

/// The `GeoTransform` is a more user friendly representation of the `GDAL GeoTransform` affine transformation matrix.
/// Rotation terms are not supported.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_coordinate: Coordinate2D,
    pub x_pixel_size: f64,
    pub y_pixel_size: f64,
}

impl GeoTransform {
    /// Generates a new `GeoTransform`
    ///
    /// # Examples
    ///
    /// ```
    /// use applier_datatypes::raster::GeoTransform;
    ///
    /// let geo_transform = GeoTransform::new((0.0, 0.0).into(), 1.0, -1.0);
    /// ```
    ///
    pub fn new(origin_coordinate: Coordinate2D, x_pixel_size: f64, y_pixel_size: f64) -> Self {
        Self {
            origin_coordinate,
            x_pixel_size,
            y_pixel_size,
        }
    }

    /// Generates a new `GeoTransform` with explicit x, y values of the upper left edge
    pub fn new_with_coordinate_x_y(
        origin_coordinate_x: f64,
        x_pixel_size: f64,
        origin_coordinate_y: f64,
        y_pixel_size: f64,
    ) -> Self {
        Self {
            origin_coordinate: (origin_coordinate_x, origin_coordinate_y).into(),
            x_pixel_size,
            y_pixel_size,
        }
    }

    /// Transforms a grid coordinate (row, column) ~ (y, x) into a SRS coordinate (x,y)
    /// The result is the upper left edge of the pixel.
    ///
    /// # Examples
    ///
    /// ```
    /// use applier_datatypes::raster::{GeoTransform};
    ///
    /// let geo_transform = GeoTransform::new_with_coordinate_x_y(0.0, 1.0, 0.0, -1.0);
    /// assert_eq!(geo_transform.grid_idx_to_coordinate_2d([0, 0].into()), (0.0, 0.0).into())
    /// ```
    ///
    pub fn grid_idx_to_coordinate_2d(&self, grid_index: GridIdx2D) -> Coordinate2D {
        let GridIdx2D([grid_index_y, grid_index_x]) = grid_index;
        let coord_x = self.origin_coordinate.x + (grid_index_x as f64) * self.x_pixel_size;
        let coord_y = self.origin_coordinate.y + (grid_index_y as f64) * self.y_pixel_size;
        Coordinate2D::new(coord_x, coord_y)
    }

    /// Transforms an SRS coordinate (x,y) into the grid coordinate (row, column) ~ (y, x)
    /// of the pixel that contains it.
    ///
    /// # Examples
    ///
    /// ```
    /// use applier_datatypes::raster::{GeoTransform};
    ///
    /// let geo_transform = GeoTransform::new_with_coordinate_x_y(0.0, 1.0, 0.0, -1.0);
    /// assert_eq!(geo_transform.coordinate_to_grid_idx_2d((0.5, -0.5).into()), [0, 0].into());
    /// assert_eq!(geo_transform.coordinate_to_grid_idx_2d((-0.5, 0.5).into()), [-1, -1].into());
    /// ```
    ///
    pub fn coordinate_to_grid_idx_2d(&self, coord: Coordinate2D) -> GridIdx2D {
        self.coordinate_to_pixel_coordinate(coord)
            .containing_pixel()
    }

    /// Transforms an SRS coordinate (x,y) into a fractional pixel position
    pub fn coordinate_to_pixel_coordinate(&self, coord: Coordinate2D) -> PixelCoordinate {
        PixelCoordinate::new(
            (coord.x - self.origin_coordinate.x) / self.x_pixel_size,
            (coord.y - self.origin_coordinate.y) / self.y_pixel_size,
        )
    }

    /// Transforms a fractional pixel position into an SRS coordinate (x,y)
    pub fn pixel_coordinate_to_coordinate(&self, pixel: PixelCoordinate) -> Coordinate2D {
        Coordinate2D::new(
            self.origin_coordinate.x + pixel.x * self.x_pixel_size,
            self.origin_coordinate.y + pixel.y * self.y_pixel_size,
        )
    }

    /// The SRS coordinate of the center of the given pixel
    pub fn pixel_center(&self, grid_index: GridIdx2D) -> Coordinate2D {
        self.pixel_coordinate_to_coordinate(PixelCoordinate::new(
            grid_index.x() as f64 + 0.5,
            grid_index.y() as f64 + 0.5,
        ))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        GeoTransform::new_with_coordinate_x_y(0.0, 1.0, 0.0, -1.0)
    }
}

impl From<GdalGeoTransform> for GeoTransform {
    fn from(gdal_geo_transform: GdalGeoTransform) -> Self {
        Self::new_with_coordinate_x_y(
            gdal_geo_transform[0],
            gdal_geo_transform[1],
            // gdal_geo_transform[2],
            gdal_geo_transform[3],
            // gdal_geo_transform[4],
            gdal_geo_transform[5],
        )
    }
}

impl From<GeoTransform> for GdalGeoTransform {
    fn from(geo_transform: GeoTransform) -> GdalGeoTransform {
        [
            geo_transform.origin_coordinate.x,
            geo_transform.x_pixel_size,
            0.0, // self.x_rotation,
            geo_transform.origin_coordinate.y,
            0.0, // self.y_rotation,
            geo_transform.y_pixel_size,
        ]
    }
}
