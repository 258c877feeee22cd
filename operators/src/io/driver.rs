use crate::error;
use crate::util::Result;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};

/// Path prefix of in-memory datasets
pub const VSIMEM_PREFIX: &str = "/vsimem/";

/// Pixel layout of ENVI binary files
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Interleave {
    #[default]
    Bsq,
    Bil,
    Bip,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RasterDriver {
    Envi(Interleave),
    GTiff,
    Hfa,
    Vrt,
    Mem,
}

impl RasterDriver {
    /// Selects the driver by file extension, falling back to ENVI BSQ
    pub fn from_filename(path: &Path) -> Self {
        let as_str = path.to_string_lossy();
        if as_str.is_empty() || as_str.starts_with(VSIMEM_PREFIX) {
            return RasterDriver::Mem;
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "bil" => RasterDriver::Envi(Interleave::Bil),
            "bip" => RasterDriver::Envi(Interleave::Bip),
            "tif" | "tiff" => RasterDriver::GTiff,
            "img" => RasterDriver::Hfa,
            "vrt" => RasterDriver::Vrt,
            _ => RasterDriver::Envi(Interleave::Bsq),
        }
    }

    /// The GDAL short name of the driver
    pub fn name(&self) -> &'static str {
        match self {
            RasterDriver::Envi(_) => "ENVI",
            RasterDriver::GTiff => "GTiff",
            RasterDriver::Hfa => "HFA",
            RasterDriver::Vrt => "VRT",
            RasterDriver::Mem => "MEM",
        }
    }

    pub fn default_creation_options(&self) -> Vec<String> {
        let options: &[&str] = match self {
            RasterDriver::Envi(Interleave::Bsq) => &["INTERLEAVE=BSQ"],
            RasterDriver::Envi(Interleave::Bil) => &["INTERLEAVE=BIL"],
            RasterDriver::Envi(Interleave::Bip) => &["INTERLEAVE=BIP"],
            RasterDriver::GTiff => &["INTERLEAVE=BAND", "COMPRESS=LZW", "TILED=YES", "BIGTIFF=YES"],
            RasterDriver::Hfa | RasterDriver::Vrt | RasterDriver::Mem => &[],
        };
        options.iter().map(ToString::to_string).collect()
    }

    /// Whether the driver can be used in this build
    pub fn is_available(&self) -> bool {
        match self {
            RasterDriver::Envi(_) | RasterDriver::Mem => true,
            RasterDriver::GTiff | RasterDriver::Hfa | RasterDriver::Vrt => cfg!(feature = "gdal"),
        }
    }

    pub fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(error::Error::DriverNotAvailable {
                driver: self.name().to_string(),
            })
        }
    }

    pub fn is_file_based(&self) -> bool {
        !matches!(self, RasterDriver::Mem)
    }

    /// Makes `path` absolute, creates missing parent directories and deletes an existing
    /// dataset at `path` including its ENVI header.
    pub fn prepare_creation(&self, path: &Path) -> Result<PathBuf> {
        if !self.is_file_based() {
            return Ok(path.to_path_buf());
        }

        let path = std::path::absolute(path).context(error::Io { path })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(error::Io { path: parent })?;
        }

        for file in [path.clone(), envi_header_path(&path)] {
            if file.is_file() {
                std::fs::remove_file(&file).context(error::Io { path: &file })?;
            }
        }

        Ok(path)
    }
}

/// The value of `KEY` in creation options of the form `KEY=VALUE`
pub fn creation_option<'o>(options: &'o [String], key: &str) -> Option<&'o str> {
    options.iter().find_map(|option| {
        let (k, v) = option.split_once('=')?;
        k.trim().eq_ignore_ascii_case(key).then_some(v.trim())
    })
}

/// The ENVI header belonging to a raster file
pub fn envi_header_path(path: &Path) -> PathBuf {
    path.with_extension("hdr")
}
