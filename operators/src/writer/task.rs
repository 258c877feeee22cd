use crate::io::{CategoryColor, MetadataDomains, MetadataValue, RasterDriver};
use applier_datatypes::raster::{Grid, PixelWindow, TypedArray3};
use std::path::{Path, PathBuf};

/// A unit of work for a writer.
///
/// Tasks are moved into the writer's channel and consumed exactly once.
#[derive(Debug)]
pub enum WriterTask {
    /// Writes all bands of `window`, creating the dataset on first use with the
    /// band count and data type of `array`
    WriteArray {
        filename: PathBuf,
        array: TypedArray3,
        window: PixelWindow,
        grid: Grid,
        driver: RasterDriver,
        creation_options: Vec<String>,
    },
    /// Writes a single band of `window`, creating the dataset with `band_count` bands
    /// on first use
    WriteBandArray {
        filename: PathBuf,
        array: TypedArray3,
        band_index: usize,
        band_count: usize,
        window: PixelWindow,
        grid: Grid,
        driver: RasterDriver,
        creation_options: Vec<String>,
    },
    CallDatasetMethod {
        filename: PathBuf,
        method: DatasetMethod,
    },
    CallBandMethod {
        filename: PathBuf,
        band_index: usize,
        method: BandMethod,
    },
    /// Flushes and closes every open dataset
    CloseAll { write_envi_header: bool },
    /// Leaves the writer loop
    Shutdown,
}

impl WriterTask {
    /// The dataset the task refers to, `None` for tasks addressing all datasets
    pub fn filename(&self) -> Option<&Path> {
        match self {
            WriterTask::WriteArray { filename, .. }
            | WriterTask::WriteBandArray { filename, .. }
            | WriterTask::CallDatasetMethod { filename, .. }
            | WriterTask::CallBandMethod { filename, .. } => Some(filename),
            WriterTask::CloseAll { .. } | WriterTask::Shutdown => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WriterTask::WriteArray { .. } => "write array",
            WriterTask::WriteBandArray { .. } => "write band array",
            WriterTask::CallDatasetMethod { .. } => "call dataset method",
            WriterTask::CallBandMethod { .. } => "call band method",
            WriterTask::CloseAll { .. } => "close all",
            WriterTask::Shutdown => "shutdown",
        }
    }
}

/// Property changes of a whole dataset
#[derive(Clone, Debug, PartialEq)]
pub enum DatasetMethod {
    SetMetadataItem {
        key: String,
        value: MetadataValue,
        domain: String,
    },
    /// Sets every item of every domain, keeping other existing items
    SetMetadataDomains(MetadataDomains),
    /// Sets the no-data value of all bands
    SetNoDataValue(Option<f64>),
    /// Sets the no-data value of each band
    SetNoDataValues(Vec<Option<f64>>),
}

/// Property changes of a single band
#[derive(Clone, Debug, PartialEq)]
pub enum BandMethod {
    SetDescription(String),
    SetNoDataValue(Option<f64>),
    SetCategoryNames(Vec<String>),
    SetCategoryColors(Vec<CategoryColor>),
    SetMetadataItem {
        key: String,
        value: MetadataValue,
        domain: String,
    },
}
