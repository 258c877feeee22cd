mod bounding_box;
mod coordinate;
mod spatial_resolution;

pub use bounding_box::BoundingBox2D;
pub use coordinate::Coordinate2D;
pub use spatial_resolution::SpatialResolution;
