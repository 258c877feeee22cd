//! GTiff, HFA and VRT rasters through the GDAL bindings

use super::dataset::{RasterDataset, RasterProperties};
use super::driver::RasterDriver;
use super::metadata::{DEFAULT_DOMAIN, MetadataValue};
use crate::util::{Result, safe_lock_mutex};
use applier_datatypes::{call_typed_array3, generate_typed_array3};
use applier_datatypes::raster::{
    GdalGeoTransform, GeoTransform, Grid, GridShape2D, Pixel, PixelWindow, RasterDataType,
    TypedArray3,
};
use applier_datatypes::spatial_reference::SpatialReference;
use gdal::raster::{Buffer, GdalDataType, GdalType, RasterCreationOptions};
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::{Array3, Axis};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub struct GdalDataset {
    path: PathBuf,
    driver: RasterDriver,
    properties: RasterProperties,
    dataset: Mutex<Dataset>,
}

impl std::fmt::Debug for GdalDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GdalDataset")
            .field("path", &self.path)
            .field("driver", &self.driver)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

pub fn open(path: &Path, driver: RasterDriver) -> Result<GdalDataset> {
    let dataset = Dataset::open(path)?;

    let (columns, rows) = dataset.raster_size();
    let geo_transform: GdalGeoTransform = dataset.geo_transform()?;
    let spatial_reference = match dataset.spatial_ref() {
        Ok(spatial_ref) => SpatialReference::from_wkt(&spatial_ref.to_wkt()?)?,
        Err(_) => SpatialReference::local("unknown"),
    };
    let grid = Grid::from_geo_transform(
        GeoTransform::from(geo_transform),
        GridShape2D::new([rows, columns])?,
        spatial_reference,
    )?;

    let band_count = dataset.raster_count();
    let data_type = data_type_from_gdal(dataset.rasterband(1)?.band_type())?;
    let mut properties = RasterProperties::new(grid, data_type, band_count);

    for domain in dataset.metadata_domains() {
        for entry in dataset.metadata_domain(&domain).unwrap_or_default() {
            if let Some((key, value)) = entry.split_once('=') {
                properties
                    .metadata
                    .set_item(key, MetadataValue::parse_envi(value), &domain);
            }
        }
    }

    for (index, band_properties) in properties.bands.iter_mut().enumerate() {
        let band = dataset.rasterband(index + 1)?;
        band_properties.no_data_value = band.no_data_value();
        band_properties.description = band.description().ok().filter(|d| !d.is_empty());
    }

    debug!(path = %path.display(), driver = driver.name(), "opened raster");

    Ok(GdalDataset {
        path: path.to_path_buf(),
        driver,
        properties,
        dataset: Mutex::new(dataset),
    })
}

pub fn create(
    path: &Path,
    driver: RasterDriver,
    properties: RasterProperties,
    creation_options: &[String],
) -> Result<GdalDataset> {
    let gdal_driver = DriverManager::get_driver_by_name(driver.name())?;
    let options = RasterCreationOptions::from_iter(creation_options.iter().map(String::as_str));

    let shape = properties.array_shape();
    let mut dataset = match properties.data_type {
        RasterDataType::U8 => create_typed::<u8>(&gdal_driver, path, shape, &options),
        RasterDataType::U16 => create_typed::<u16>(&gdal_driver, path, shape, &options),
        RasterDataType::U32 => create_typed::<u32>(&gdal_driver, path, shape, &options),
        RasterDataType::U64 => create_typed::<u64>(&gdal_driver, path, shape, &options),
        RasterDataType::I8 => create_typed::<i8>(&gdal_driver, path, shape, &options),
        RasterDataType::I16 => create_typed::<i16>(&gdal_driver, path, shape, &options),
        RasterDataType::I32 => create_typed::<i32>(&gdal_driver, path, shape, &options),
        RasterDataType::I64 => create_typed::<i64>(&gdal_driver, path, shape, &options),
        RasterDataType::F32 => create_typed::<f32>(&gdal_driver, path, shape, &options),
        RasterDataType::F64 => create_typed::<f64>(&gdal_driver, path, shape, &options),
    }?;

    dataset.set_geo_transform(&GdalGeoTransform::from(properties.grid.geo_transform()))?;
    dataset.set_spatial_ref(&gdal::spatial_ref::SpatialRef::from_wkt(
        properties.grid.spatial_reference().wkt(),
    )?)?;

    debug!(path = %path.display(), driver = driver.name(), "created raster");

    Ok(GdalDataset {
        path: path.to_path_buf(),
        driver,
        properties,
        dataset: Mutex::new(dataset),
    })
}

fn create_typed<T: GdalType>(
    driver: &gdal::Driver,
    path: &Path,
    [bands, rows, columns]: [usize; 3],
    options: &RasterCreationOptions,
) -> gdal::errors::Result<Dataset> {
    driver.create_with_band_type_with_options::<T, _>(path, columns, rows, bands, options)
}

fn data_type_from_gdal(data_type: GdalDataType) -> Result<RasterDataType> {
    Ok(match data_type {
        GdalDataType::UInt8 => RasterDataType::U8,
        GdalDataType::UInt16 => RasterDataType::U16,
        GdalDataType::UInt32 => RasterDataType::U32,
        GdalDataType::UInt64 => RasterDataType::U64,
        GdalDataType::Int8 => RasterDataType::I8,
        GdalDataType::Int16 => RasterDataType::I16,
        GdalDataType::Int32 => RasterDataType::I32,
        GdalDataType::Int64 => RasterDataType::I64,
        GdalDataType::Float32 => RasterDataType::F32,
        GdalDataType::Float64 => RasterDataType::F64,
        GdalDataType::Unknown => {
            return Err(applier_datatypes::error::Error::UnknownRasterDataType {
                name: format!("{data_type:?}"),
            }
            .into());
        }
    })
}

fn read_bands<T: Pixel + GdalType>(
    dataset: &Dataset,
    window: PixelWindow,
    band_count: usize,
) -> Result<Array3<T>> {
    let offset = (window.offset.x(), window.offset.y());
    let size = (window.shape.axis_size_x(), window.shape.axis_size_y());

    let mut array = Array3::<T>::zeros((
        band_count,
        window.shape.axis_size_y(),
        window.shape.axis_size_x(),
    ));
    for (index, mut target) in array.axis_iter_mut(Axis(0)).enumerate() {
        let buffer = dataset
            .rasterband(index + 1)?
            .read_as::<T>(offset, size, size, None)?;
        for (target, value) in target.iter_mut().zip(buffer.data()) {
            *target = *value;
        }
    }
    Ok(array)
}

fn write_bands<T: Pixel + GdalType>(
    dataset: &Dataset,
    window: PixelWindow,
    array: &Array3<T>,
) -> Result<()> {
    let offset = (window.offset.x(), window.offset.y());
    let size = (window.shape.axis_size_x(), window.shape.axis_size_y());

    for (index, band) in array.axis_iter(Axis(0)).enumerate() {
        let mut buffer = Buffer::new(size, band.iter().copied().collect());
        dataset
            .rasterband(index + 1)?
            .write(offset, size, &mut buffer)?;
    }
    Ok(())
}

impl RasterDataset for GdalDataset {
    fn path(&self) -> &Path {
        &self.path
    }

    fn driver(&self) -> RasterDriver {
        self.driver
    }

    fn properties(&self) -> &RasterProperties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut RasterProperties {
        &mut self.properties
    }

    fn read_window(&self, window: PixelWindow) -> Result<TypedArray3> {
        let dataset = safe_lock_mutex(&self.dataset);
        let band_count = self.band_count();

        Ok(generate_typed_array3!(self.data_type(), T => {
            read_bands::<T>(&dataset, window, band_count)?
        }))
    }

    fn write_window(&mut self, window: PixelWindow, array: &TypedArray3) -> Result<()> {
        self.ensure_writable(window, array)?;

        let array = array.convert_to(self.data_type());
        let dataset = safe_lock_mutex(&self.dataset);

        call_typed_array3!(&array, pixels => write_bands(&dataset, window, pixels))
    }

    fn flush(&mut self) -> Result<()> {
        let mut dataset = safe_lock_mutex(&self.dataset);

        for domain in self.properties.metadata.domain_names() {
            for (key, value) in self.properties.metadata.domain(domain).into_iter().flatten() {
                dataset.set_metadata_item(key, &value.to_envi_string(), domain)?;
            }
        }

        for (index, band_properties) in self.properties.bands.iter().enumerate() {
            let mut band = dataset.rasterband(index + 1)?;
            band.set_no_data_value(band_properties.no_data_value)?;
            if let Some(description) = &band_properties.description {
                band.set_description(description)?;
            }
            for (key, value) in band_properties
                .metadata
                .domain(DEFAULT_DOMAIN)
                .into_iter()
                .flatten()
            {
                band.set_metadata_item(key, &value.to_envi_string(), DEFAULT_DOMAIN)?;
            }
        }

        dataset.flush_cache()?;
        Ok(())
    }
}
