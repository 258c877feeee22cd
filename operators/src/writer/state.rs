use super::task::{BandMethod, DatasetMethod};
use crate::error;
use crate::io::{RasterDataset, RasterDriver, RasterProperties, create_dataset, envi};
use crate::util::Result;
use applier_datatypes::raster::{Grid, RasterDataType};
use snafu::ensure;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

#[derive(Clone, Debug, PartialEq)]
enum PendingCall {
    Dataset(DatasetMethod),
    Band(usize, BandMethod),
}

/// The output datasets a writer owns, keyed by filename.
///
/// Datasets are created on the first write to their filename. Property changes for
/// datasets that do not exist yet are kept and applied on creation.
#[derive(Debug, Default)]
pub struct WriterState {
    outputs: BTreeMap<PathBuf, Box<dyn RasterDataset>>,
    pending: BTreeMap<PathBuf, Vec<PendingCall>>,
}

impl WriterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn contains(&self, filename: &Path) -> bool {
        self.outputs.contains_key(filename)
    }

    pub fn dataset(&self, filename: &Path) -> Option<&dyn RasterDataset> {
        self.outputs.get(filename).map(AsRef::as_ref)
    }

    /// The open dataset of `filename`, created with the given layout if necessary
    pub fn get_or_create(
        &mut self,
        filename: &Path,
        grid: &Grid,
        driver: RasterDriver,
        creation_options: &[String],
        data_type: RasterDataType,
        band_count: usize,
    ) -> Result<&mut dyn RasterDataset> {
        match self.outputs.entry(filename.to_path_buf()) {
            Entry::Occupied(entry) => Ok(entry.into_mut().as_mut()),
            Entry::Vacant(entry) => {
                debug!(
                    filename = %filename.display(),
                    driver = driver.name(),
                    %data_type,
                    band_count,
                    "creating output"
                );

                let properties = RasterProperties::new(grid.clone(), data_type, band_count);
                let dataset = entry
                    .insert(create_dataset(filename, driver, properties, creation_options)?)
                    .as_mut();

                for call in self.pending.remove(filename).unwrap_or_default() {
                    match call {
                        PendingCall::Dataset(method) => apply_dataset_method(dataset, method)?,
                        PendingCall::Band(band_index, method) => {
                            apply_band_method(dataset, band_index, method)?;
                        }
                    }
                }

                Ok(dataset)
            }
        }
    }

    pub fn call_dataset_method(&mut self, filename: &Path, method: DatasetMethod) -> Result<()> {
        match self.outputs.get_mut(filename) {
            Some(dataset) => apply_dataset_method(dataset.as_mut(), method),
            None => {
                self.defer(filename, PendingCall::Dataset(method));
                Ok(())
            }
        }
    }

    pub fn call_band_method(
        &mut self,
        filename: &Path,
        band_index: usize,
        method: BandMethod,
    ) -> Result<()> {
        match self.outputs.get_mut(filename) {
            Some(dataset) => apply_band_method(dataset.as_mut(), band_index, method),
            None => {
                self.defer(filename, PendingCall::Band(band_index, method));
                Ok(())
            }
        }
    }

    fn defer(&mut self, filename: &Path, call: PendingCall) {
        debug!(filename = %filename.display(), "deferring property change until the output exists");
        self.pending
            .entry(filename.to_path_buf())
            .or_default()
            .push(call);
    }

    /// Flushes and closes every dataset, optionally writing ENVI sidecar headers.
    /// All datasets are closed even if some fail, the first failure is returned.
    pub fn close_all(&mut self, write_envi_header: bool) -> Result<()> {
        let mut first_error = None;

        for (filename, mut dataset) in std::mem::take(&mut self.outputs) {
            let result = dataset.flush().and_then(|()| {
                if write_envi_header {
                    write_envi_sidecar(dataset.as_ref())
                } else {
                    Ok(())
                }
            });

            match result {
                Ok(()) => debug!(filename = %filename.display(), "closed output"),
                Err(e) => {
                    error!(filename = %filename.display(), "closing output failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        for (filename, calls) in std::mem::take(&mut self.pending) {
            warn!(
                filename = %filename.display(),
                "dropping {} property changes of an output that was never written",
                calls.len()
            );
        }

        first_error.map_or(Ok(()), Err)
    }
}

fn apply_dataset_method(dataset: &mut dyn RasterDataset, method: DatasetMethod) -> Result<()> {
    match method {
        DatasetMethod::SetMetadataItem { key, value, domain } => {
            dataset.set_metadata_item(&key, value, &domain);
        }
        DatasetMethod::SetMetadataDomains(metadata) => {
            dataset.properties_mut().metadata.merge(&metadata);
        }
        DatasetMethod::SetNoDataValue(no_data_value) => {
            for band in &mut dataset.properties_mut().bands {
                band.no_data_value = no_data_value;
            }
        }
        DatasetMethod::SetNoDataValues(no_data_values) => {
            ensure!(
                no_data_values.len() == dataset.band_count(),
                error::BandCountMismatch {
                    filename: dataset.path(),
                    expected: dataset.band_count(),
                    found: no_data_values.len(),
                }
            );
            for (band, no_data_value) in dataset
                .properties_mut()
                .bands
                .iter_mut()
                .zip(no_data_values)
            {
                band.no_data_value = no_data_value;
            }
        }
    }
    Ok(())
}

fn apply_band_method(
    dataset: &mut dyn RasterDataset,
    band_index: usize,
    method: BandMethod,
) -> Result<()> {
    let band = dataset.band_properties_mut(band_index)?;

    match method {
        BandMethod::SetDescription(description) => band.description = Some(description),
        BandMethod::SetNoDataValue(no_data_value) => band.no_data_value = no_data_value,
        BandMethod::SetCategoryNames(names) => band.category_names = Some(names),
        BandMethod::SetCategoryColors(colors) => band.category_colors = Some(colors),
        BandMethod::SetMetadataItem { key, value, domain } => {
            band.metadata.set_item(&key, value, &domain);
        }
    }
    Ok(())
}

/// ENVI rasters write their header on flush, other file formats get a sidecar header
fn write_envi_sidecar(dataset: &dyn RasterDataset) -> Result<()> {
    let file_type = match dataset.driver() {
        RasterDriver::GTiff => "TIFF",
        RasterDriver::Hfa => "ERDAS IMAGINE",
        RasterDriver::Envi(_) | RasterDriver::Vrt | RasterDriver::Mem => return Ok(()),
    };
    envi::write_sidecar_header(dataset.path(), dataset.properties(), file_type)
}
