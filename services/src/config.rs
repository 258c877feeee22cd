use crate::error::{self, Error, Result};
use applier_datatypes::raster::GridShape2D;
use applier_operators::progress::LogProgress;
use applier_operators::{ApplierControls, Workers};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use snafu::ResultExt;
use std::sync::{Arc, LazyLock, RwLock};

const DEFAULT_SETTINGS: &str = include_str!("../Settings-default.toml");

static SETTINGS: LazyLock<Result<RwLock<Config>>> = LazyLock::new(init_settings);

fn init_settings() -> Result<RwLock<Config>> {
    let mut settings =
        Config::builder().add_source(File::from_str(DEFAULT_SETTINGS, FileFormat::Toml));

    // local overrides are ignored in tests s.t. they do not depend on the developer's setup
    #[cfg(not(test))]
    {
        let dir = retrieve_settings_dir()?;
        let local = dir.join("Settings.toml");
        if local.exists() {
            settings = settings.add_source(File::from(local));
        }
    }

    // Override config with environment variables that start with `APPLIER__`,
    // e.g. `APPLIER__APPLIER__WORKERS=4`
    settings = settings.add_source(
        Environment::with_prefix("applier")
            .separator("__")
            .try_parsing(true),
    );

    Ok(RwLock::new(settings.build().context(error::Config)?))
}

#[cfg_attr(test, allow(dead_code))]
fn retrieve_settings_dir() -> Result<std::path::PathBuf> {
    std::env::current_dir().context(error::MissingWorkingDirectory)
}

fn settings() -> Result<&'static RwLock<Config>> {
    SETTINGS.as_ref().map_err(|error| Error::ConfigInit {
        reason: error.to_string(),
    })
}

#[cfg(test)]
pub fn set_config<T>(key: &str, value: T) -> Result<()>
where
    T: Into<config::Value>,
{
    let mut settings = settings()?
        .write()
        .map_err(|_error| Error::ConfigLockFailed)?;

    let builder = Config::builder()
        .add_source(settings.clone())
        .set_override(key, value)
        .context(error::Config)?;

    *settings = builder.build().context(error::Config)?;
    Ok(())
}

pub fn get_config<'a, T>(key: &str) -> Result<T>
where
    T: Deserialize<'a>,
{
    settings()?
        .read()
        .map_err(|_error| Error::ConfigLockFailed)?
        .get::<T>(key)
        .context(error::Config)
}

pub fn get_config_element<'a, T>() -> Result<T>
where
    T: ConfigElement + Deserialize<'a>,
{
    get_config(T::KEY)
}

pub trait ConfigElement {
    const KEY: &'static str;
}

/// Defaults for every job started from the command line
#[derive(Debug, Clone, Deserialize)]
pub struct Applier {
    pub block_rows: usize,
    pub block_columns: usize,
    pub overlap: usize,
    pub workers: i64,
    pub writers: Option<usize>,
    pub write_envi_header: bool,
    pub overwrite: bool,
    pub progress_step: f64,
}

impl ConfigElement for Applier {
    const KEY: &'static str = "applier";
}

impl Applier {
    pub fn controls(&self) -> Result<ApplierControls> {
        let block_shape = GridShape2D::new([self.block_rows, self.block_columns])?;

        let mut controls = ApplierControls::new()
            .with_block_shape(block_shape)
            .with_overlap(self.overlap)
            .with_workers(Workers::from_count(self.workers))
            .with_envi_header(self.write_envi_header)
            .with_overwrite(self.overwrite)
            .with_progress(Arc::new(LogProgress::new(self.progress_step)));

        if let Some(writers) = self.writers {
            controls = controls.with_writers(writers);
        }

        Ok(controls)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub log_spec: String,
}

impl ConfigElement for Logging {
    const KEY: &'static str = "logging";
}
