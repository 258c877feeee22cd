use applier_datatypes::raster::{PixelWindow, RasterDataType};
use snafu::Snafu;
use strum::IntoStaticStr;
use std::path::PathBuf;

#[derive(Debug, Snafu, IntoStaticStr)]
#[snafu(visibility(pub(crate)))]
#[snafu(context(suffix(false)))] // disables default `Snafu` suffix
pub enum Error {
    #[snafu(display("DataTypeError: {source}"))]
    DataType {
        source: applier_datatypes::error::Error,
    },

    #[snafu(display("I/O error on `{}`: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Dataset `{}` does not exist", path.display()))]
    DatasetNotFound { path: PathBuf },

    #[snafu(display("Invalid ENVI header `{}`: {reason}", path.display()))]
    InvalidEnviHeader { path: PathBuf, reason: String },

    #[snafu(display("ENVI header `{}` lacks the field `{field}`", path.display()))]
    MissingHeaderField { path: PathBuf, field: String },

    #[snafu(display(
        "The {driver} driver is not available, build with the `gdal` feature to enable it"
    ))]
    DriverNotAvailable { driver: String },

    #[snafu(display("The {driver} driver cannot store {data_type} pixels"))]
    UnsupportedDataType {
        driver: String,
        data_type: RasterDataType,
    },

    #[snafu(display("Input `{name}` has no no-data value"))]
    MissingNoDataValue { name: String },

    #[snafu(display("There is no input named `{name}`"))]
    UnknownInput { name: String },

    #[snafu(display("There is no output named `{name}`"))]
    UnknownOutput { name: String },

    #[snafu(display(
        "Dataset `{}` has {expected} bands, but {found} were written",
        filename.display()
    ))]
    BandCountMismatch {
        filename: PathBuf,
        expected: usize,
        found: usize,
    },

    #[snafu(display(
        "Band index {index} is out of range for `{}` with {bands} bands",
        filename.display()
    ))]
    BandIndexOutOfRange {
        filename: PathBuf,
        index: usize,
        bands: usize,
    },

    #[snafu(display("Array of shape {found:?} does not fit into window {window}"))]
    WindowShapeMismatch {
        window: PixelWindow,
        found: [usize; 3],
    },

    #[snafu(display("Mask of shape {found:?} does not match the grid of shape {expected:?}"))]
    MaskShapeMismatch {
        expected: [usize; 2],
        found: [usize; 2],
    },

    #[snafu(display("Could not list the rasters in `{}`: {source}", folder.display()))]
    FolderWalk {
        folder: PathBuf,
        source: walkdir::Error,
    },

    #[snafu(display("Projection mismatch: expected \"{expected}\", found \"{found}\""))]
    ProjectionMismatch { expected: String, found: String },

    #[snafu(display("No projection given and no input to derive it from"))]
    MissingProjection,

    #[snafu(display(
        "No grid given and no input to derive the extent and resolution from"
    ))]
    MissingGrid,

    #[snafu(display("Block {block_index} failed: {source}"))]
    BlockOperator {
        block_index: usize,
        source: Box<Error>,
    },

    #[snafu(display("Operator failed: {reason}"))]
    Operator { reason: String },

    #[snafu(display("Writer {writer} failed: {source}"))]
    Writer { writer: usize, source: Box<Error> },

    #[snafu(display("Writer {writer} stopped receiving tasks"))]
    WriterDisconnected { writer: usize },

    #[snafu(display("Writer {writer} panicked"))]
    WriterPanicked { writer: usize },

    #[snafu(display("Could not spawn writer thread: {source}"))]
    WriterThread { source: std::io::Error },

    #[snafu(display("Could not create worker thread pool: {source}"))]
    WorkerThreadPool {
        source: rayon::ThreadPoolBuildError,
    },

    #[snafu(display("The job was aborted"))]
    Aborted,

    #[cfg(feature = "gdal")]
    #[snafu(display("GdalError: {source}"))]
    Gdal { source: gdal::errors::GdalError },
}

impl Error {
    /// A failure of a user supplied block operator
    pub fn operator(reason: impl Into<String>) -> Self {
        Self::Operator {
            reason: reason.into(),
        }
    }
}

impl From<applier_datatypes::error::Error> for Error {
    fn from(datatype_error: applier_datatypes::error::Error) -> Self {
        Self::DataType {
            source: datatype_error,
        }
    }
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(gdal_error: gdal::errors::GdalError) -> Self {
        Self::Gdal { source: gdal_error }
    }
}
