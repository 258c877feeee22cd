pub mod dataset;
pub mod driver;
pub mod envi;
#[cfg(feature = "gdal")]
pub mod gdal;
pub mod mem;
pub mod metadata;

pub use dataset::{
    BandProperties, CategoryColor, RasterDataset, RasterProperties, create_dataset,
    dataset_exists, open_dataset,
};
pub use driver::{Interleave, RasterDriver};
pub use metadata::{DEFAULT_DOMAIN, ENVI_DOMAIN, MetadataDomains, MetadataValue};
