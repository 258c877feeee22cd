//! Process wide registry of in-memory rasters, addressed by `/vsimem/` paths

use super::dataset::{RasterDataset, RasterProperties};
use super::driver::RasterDriver;
use crate::error;
use crate::util::{Result, safe_lock_mutex, safe_read_lock, safe_write_lock};
use applier_datatypes::raster::{PixelWindow, TypedArray3};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, RwLock};

static REGISTRY: LazyLock<Mutex<HashMap<PathBuf, Arc<MemEntry>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

#[derive(Debug)]
struct MemEntry {
    properties: RwLock<RasterProperties>,
    pixels: RwLock<TypedArray3>,
}

/// A handle to an in-memory raster.
///
/// Pixels are shared between all handles of the same path, properties are published
/// to the registry on [`RasterDataset::flush`].
#[derive(Debug)]
pub struct MemDataset {
    path: PathBuf,
    properties: RasterProperties,
    entry: Arc<MemEntry>,
}

/// Creates a zero filled raster, replacing an existing one at `path`
pub fn create(path: &Path, properties: RasterProperties) -> MemDataset {
    let pixels = TypedArray3::zeros(properties.data_type, properties.array_shape());
    let entry = Arc::new(MemEntry {
        properties: RwLock::new(properties.clone()),
        pixels: RwLock::new(pixels),
    });

    safe_lock_mutex(&REGISTRY).insert(path.to_path_buf(), entry.clone());

    MemDataset {
        path: path.to_path_buf(),
        properties,
        entry,
    }
}

pub fn open(path: &Path) -> Result<MemDataset> {
    let entry = safe_lock_mutex(&REGISTRY)
        .get(path)
        .cloned()
        .ok_or_else(|| error::Error::DatasetNotFound {
            path: path.to_path_buf(),
        })?;

    let properties = safe_read_lock(&entry.properties).clone();

    Ok(MemDataset {
        path: path.to_path_buf(),
        properties,
        entry,
    })
}

pub fn exists(path: &Path) -> bool {
    safe_lock_mutex(&REGISTRY).contains_key(path)
}

/// Drops the raster from the registry, open handles stay valid
pub fn remove(path: &Path) -> bool {
    safe_lock_mutex(&REGISTRY).remove(path).is_some()
}

impl RasterDataset for MemDataset {
    fn path(&self) -> &Path {
        &self.path
    }

    fn driver(&self) -> RasterDriver {
        RasterDriver::Mem
    }

    fn properties(&self) -> &RasterProperties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut RasterProperties {
        &mut self.properties
    }

    fn read_window(&self, window: PixelWindow) -> Result<TypedArray3> {
        Ok(safe_read_lock(&self.entry.pixels).slice_window(window)?)
    }

    fn write_window(&mut self, window: PixelWindow, array: &TypedArray3) -> Result<()> {
        self.ensure_writable(window, array)?;
        safe_write_lock(&self.entry.pixels).assign_window(window, array)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        *safe_write_lock(&self.entry.properties) = self.properties.clone();
        Ok(())
    }
}
