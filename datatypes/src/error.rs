use snafu::Snafu;

use crate::primitives::{BoundingBox2D, Coordinate2D};
use crate::raster::{GridShape2D, PixelWindow, RasterDataType};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(context(suffix(false)))] // disables default `Snafu` suffix
pub enum Error {
    #[snafu(display("Invalid resolution: {value} must be strictly positive"))]
    InvalidResolution { value: f64 },

    #[snafu(display(
        "Invalid grid shape: rows ({rows}) and columns ({columns}) must be strictly positive"
    ))]
    InvalidGridShape { rows: usize, columns: usize },

    #[snafu(display(
        "Invalid geo transform: expected a positive x ({x_pixel_size}) and a negative y ({y_pixel_size}) pixel size"
    ))]
    InvalidGeoTransform { x_pixel_size: f64, y_pixel_size: f64 },

    #[snafu(display("The pixel window {window} lies fully outside the grid of shape {shape}"))]
    OutOfBounds {
        window: PixelWindow,
        shape: GridShape2D,
    },

    #[snafu(display(
        "The conditions ll.x <= ur.x && ll.y <= ur.y are not met by ll:{} ur:{}",
        lower_left_coordinate,
        upper_right_coordinate
    ))]
    InvalidBoundingBox {
        lower_left_coordinate: Coordinate2D,
        upper_right_coordinate: Coordinate2D,
    },

    #[snafu(display("The extents {a:?} and {b:?} do not intersect"))]
    EmptyIntersection { a: BoundingBox2D, b: BoundingBox2D },

    #[snafu(display("Spatial references do not match: \"{expected}\" vs. \"{found}\""))]
    SpatialReferenceMismatch { expected: String, found: String },

    #[snafu(display("Malformed well-known-text spatial reference: {reason}"))]
    InvalidSpatialReference { reason: String },

    #[snafu(display(
        "Array of shape {actual:?} does not match the expected shape {expected:?}"
    ))]
    InvalidArrayShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[snafu(display("Band index {index} is out of range for {bands} band(s)"))]
    BandIndexOutOfRange { index: usize, bands: usize },

    #[snafu(display("Cannot convert a {from:?} array into a {to:?} array"))]
    InvalidTypedArrayConversion {
        from: RasterDataType,
        to: RasterDataType,
    },

    #[snafu(display("Unknown raster data type: {name}"))]
    UnknownRasterDataType { name: String },

    #[snafu(display("Arrays can only be stacked if they are not empty"))]
    EmptyArrayStack,
}
