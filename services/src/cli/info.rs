use crate::error::{self, Result};
use applier_operators::io::{RasterProperties, open_dataset};
use clap::Parser;
use serde::Serialize;
use snafu::ResultExt;
use std::path::{Path, PathBuf};

/// Prints the grid, data type, bands and metadata of a raster as JSON
#[derive(Debug, Parser)]
pub struct Info {
    /// Raster file
    raster: PathBuf,

    /// Indent the output
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Serialize)]
struct RasterInfo<'a> {
    path: &'a Path,
    driver: &'static str,
    shape: [usize; 3],
    #[serde(flatten)]
    properties: &'a RasterProperties,
}

#[allow(clippy::print_stdout)]
pub fn info(params: Info) -> Result<(), anyhow::Error> {
    println!("{}", raster_info(&params.raster, params.pretty)?);
    Ok(())
}

fn raster_info(path: &Path, pretty: bool) -> Result<String> {
    let dataset = open_dataset(path)?;
    let properties = dataset.properties();

    let info = RasterInfo {
        path,
        driver: dataset.driver().name(),
        shape: properties.array_shape(),
        properties,
    };

    if pretty {
        serde_json::to_string_pretty(&info).context(error::SerdeJson)
    } else {
        serde_json::to_string(&info).context(error::SerdeJson)
    }
}
