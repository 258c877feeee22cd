mod data_type;
mod geo_transform;
mod grid;
mod grid_shape;
mod macros_typed_array;
mod tiling;
mod typed_array;

pub use self::data_type::{Pixel, PixelCodec, RasterDataType, StaticRasterDataType};
pub use self::geo_transform::{GdalGeoTransform, GeoTransform};
pub use self::grid::{Grid, Subgrids};
pub use self::grid_shape::{GridIdx2D, GridShape2D, PixelCoordinate, PixelWindow};
pub use self::tiling::{BlockInformation, BlockIter, BlockTiling, Margins};
pub use self::typed_array::TypedArray3;
