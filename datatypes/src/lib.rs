pub mod error;
pub mod primitives;
pub mod raster;
pub mod spatial_reference;
pub mod util;
