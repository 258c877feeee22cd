use super::driver::{RasterDriver, envi_header_path};
use super::metadata::{MetadataDomains, MetadataValue};
use super::{envi, mem};
use crate::error;
use crate::util::Result;
use applier_datatypes::raster::{Grid, PixelWindow, RasterDataType, TypedArray3};
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt::Debug;
use std::path::Path;

/// An RGB color of a category
pub type CategoryColor = [u8; 3];

/// Per band properties of a raster
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BandProperties {
    pub description: Option<String>,
    pub no_data_value: Option<f64>,
    pub category_names: Option<Vec<String>>,
    pub category_colors: Option<Vec<CategoryColor>>,
    pub metadata: MetadataDomains,
}

/// Everything describing a raster except its pixels
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RasterProperties {
    pub grid: Grid,
    pub data_type: RasterDataType,
    pub bands: Vec<BandProperties>,
    pub metadata: MetadataDomains,
}

impl RasterProperties {
    pub fn new(grid: Grid, data_type: RasterDataType, band_count: usize) -> Self {
        Self {
            grid,
            data_type,
            bands: vec![BandProperties::default(); band_count],
            metadata: MetadataDomains::default(),
        }
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, index: usize) -> Option<&BandProperties> {
        self.bands.get(index)
    }

    /// The shape `[bands, rows, columns]` of the whole raster
    pub fn array_shape(&self) -> [usize; 3] {
        let shape = self.grid.shape();
        [self.bands.len(), shape.axis_size_y(), shape.axis_size_x()]
    }
}

/// An open raster dataset.
///
/// Reads take `&self` and may run concurrently, writes require exclusive access.
pub trait RasterDataset: Send + Sync + Debug {
    fn path(&self) -> &Path;

    fn driver(&self) -> RasterDriver;

    fn properties(&self) -> &RasterProperties;

    fn properties_mut(&mut self) -> &mut RasterProperties;

    /// Reads all bands of `window`, which must lie inside the raster
    fn read_window(&self, window: PixelWindow) -> Result<TypedArray3>;

    /// Writes all bands of `window`, converting the pixels to the raster's data type
    fn write_window(&mut self, window: PixelWindow, array: &TypedArray3) -> Result<()>;

    /// Persists pixels and properties
    fn flush(&mut self) -> Result<()>;

    /// Writes a single band of `window`
    fn write_band_window(
        &mut self,
        band_index: usize,
        window: PixelWindow,
        array: &TypedArray3,
    ) -> Result<()> {
        self.ensure_band_index(band_index)?;

        let mut bands = self.read_window(window)?;
        let [band_count, rows, columns] = bands.shape();
        ensure!(
            array.shape() == [1, rows, columns],
            error::WindowShapeMismatch {
                window,
                found: array.shape(),
            }
        );

        let mut replaced = Vec::with_capacity(band_count);
        for index in 0..band_count {
            replaced.push(if index == band_index {
                array.clone()
            } else {
                bands.band(index)?
            });
        }
        bands = TypedArray3::stack_bands(&replaced)?.convert_to(self.data_type());

        self.write_window(window, &bands)
    }

    fn grid(&self) -> &Grid {
        &self.properties().grid
    }

    fn data_type(&self) -> RasterDataType {
        self.properties().data_type
    }

    fn band_count(&self) -> usize {
        self.properties().band_count()
    }

    fn metadata(&self) -> &MetadataDomains {
        &self.properties().metadata
    }

    fn set_metadata_item(&mut self, key: &str, value: MetadataValue, domain: &str) {
        self.properties_mut().metadata.set_item(key, value, domain);
    }

    fn no_data_value(&self, band_index: usize) -> Option<f64> {
        self.properties().band(band_index)?.no_data_value
    }

    fn no_data_values(&self) -> Vec<Option<f64>> {
        self.properties().bands.iter().map(|band| band.no_data_value).collect()
    }

    fn band_properties_mut(&mut self, band_index: usize) -> Result<&mut BandProperties> {
        self.ensure_band_index(band_index)?;
        Ok(&mut self.properties_mut().bands[band_index])
    }

    fn ensure_band_index(&self, band_index: usize) -> Result<()> {
        ensure!(
            band_index < self.band_count(),
            error::BandIndexOutOfRange {
                filename: self.path(),
                index: band_index,
                bands: self.band_count(),
            }
        );
        Ok(())
    }

    /// Checks that `array` matches `window` and the band count of the raster
    fn ensure_writable(&self, window: PixelWindow, array: &TypedArray3) -> Result<()> {
        let [bands, rows, columns] = array.shape();
        ensure!(
            bands == self.band_count(),
            error::BandCountMismatch {
                filename: self.path(),
                expected: self.band_count(),
                found: bands,
            }
        );
        ensure!(
            [rows, columns] == window.shape.shape_array,
            error::WindowShapeMismatch {
                window,
                found: array.shape(),
            }
        );
        if !window.is_inside(self.grid().shape()) {
            return Err(applier_datatypes::error::Error::OutOfBounds {
                window,
                shape: self.grid().shape(),
            }
            .into());
        }
        Ok(())
    }
}

/// Opens an existing raster for reading
pub fn open_dataset(path: &Path) -> Result<Box<dyn RasterDataset>> {
    let driver = RasterDriver::from_filename(path);

    if driver != RasterDriver::Mem {
        ensure!(path.is_file(), error::DatasetNotFound { path });
    }

    match driver {
        RasterDriver::Envi(_) => Ok(Box::new(envi::open(path)?)),
        RasterDriver::GTiff | RasterDriver::Hfa | RasterDriver::Vrt => open_with_gdal(path, driver),
        RasterDriver::Mem => Ok(Box::new(mem::open(path)?)),
    }
}

/// Creates a new raster, replacing an existing one
pub fn create_dataset(
    path: &Path,
    driver: RasterDriver,
    properties: RasterProperties,
    creation_options: &[String],
) -> Result<Box<dyn RasterDataset>> {
    driver.ensure_available()?;
    let path = driver.prepare_creation(path)?;

    match driver {
        RasterDriver::Envi(interleave) => Ok(Box::new(envi::create(
            &path,
            interleave,
            properties,
            creation_options,
        )?)),
        RasterDriver::Mem => Ok(Box::new(mem::create(&path, properties))),
        RasterDriver::GTiff | RasterDriver::Hfa | RasterDriver::Vrt => {
            create_with_gdal(&path, driver, properties, creation_options)
        }
    }
}

/// Whether a dataset exists at `path`
pub fn dataset_exists(path: &Path) -> bool {
    match RasterDriver::from_filename(path) {
        RasterDriver::Mem => mem::exists(path),
        RasterDriver::Envi(_) => path.is_file() && envi_header_path(path).is_file(),
        _ => path.is_file(),
    }
}

#[cfg(feature = "gdal")]
fn open_with_gdal(path: &Path, driver: RasterDriver) -> Result<Box<dyn RasterDataset>> {
    Ok(Box::new(super::gdal::open(path, driver)?))
}

#[cfg(not(feature = "gdal"))]
fn open_with_gdal(_path: &Path, driver: RasterDriver) -> Result<Box<dyn RasterDataset>> {
    Err(error::Error::DriverNotAvailable {
        driver: driver.name().to_string(),
    })
}

#[cfg(feature = "gdal")]
fn create_with_gdal(
    path: &Path,
    driver: RasterDriver,
    properties: RasterProperties,
    creation_options: &[String],
) -> Result<Box<dyn RasterDataset>> {
    Ok(Box::new(super::gdal::create(
        path,
        driver,
        properties,
        creation_options,
    )?))
}

#[cfg(not(feature = "gdal"))]
fn create_with_gdal(
    _path: &Path,
    driver: RasterDriver,
    _properties: RasterProperties,
    _creation_options: &[String],
) -> Result<Box<dyn RasterDataset>> {
    Err(error::Error::DriverNotAvailable {
        driver: driver.name().to_string(),
    })
}
