use crate::config::{self, get_config_element};
use crate::error::Result;
use applier_datatypes::raster::GridShape2D;
use applier_operators::{ApplierControls, Workers};
use clap::Args;

/// Processing options shared by all block-wise commands.
///
/// Unset options fall back to the `[applier]` settings.
#[derive(Debug, Default, Args)]
pub struct JobOptions {
    /// Block size as `rows,columns`
    #[arg(long, value_parser = parse_block_size)]
    block_size: Option<[usize; 2]>,

    /// Worker threads, `0` processes on the main thread and a negative number uses all cpus
    #[arg(long, allow_negative_numbers = true)]
    workers: Option<i64>,

    /// Writer threads
    #[arg(long)]
    writers: Option<usize>,

    /// Write `.hdr` sidecar files for non-ENVI outputs
    #[arg(long, overrides_with = "no_envi_header")]
    envi_header: bool,

    /// Do not write `.hdr` sidecar files
    #[arg(long)]
    no_envi_header: bool,

    /// Skip the job if all outputs exist
    #[arg(long)]
    keep_existing: bool,
}

impl JobOptions {
    /// The configured controls with the command line options applied
    pub fn controls(&self, name: &str) -> Result<ApplierControls> {
        let settings: config::Applier = get_config_element()?;
        self.apply_to(settings.controls()?.with_name(name))
    }

    fn apply_to(&self, mut controls: ApplierControls) -> Result<ApplierControls> {
        if let Some(block_size) = self.block_size {
            controls = controls.with_block_shape(GridShape2D::new(block_size)?);
        }
        if let Some(workers) = self.workers {
            controls = controls.with_workers(Workers::from_count(workers));
        }
        if let Some(writers) = self.writers {
            controls = controls.with_writers(writers);
        }
        if self.envi_header {
            controls = controls.with_envi_header(true);
        }
        if self.no_envi_header {
            controls = controls.with_envi_header(false);
        }
        if self.keep_existing {
            controls = controls.with_overwrite(false);
        }
        Ok(controls)
    }
}

fn parse_block_size(value: &str) -> Result<[usize; 2], String> {
    let parse = |part: &str| {
        part.trim()
            .parse::<usize>()
            .map_err(|error| format!("invalid block size `{value}`: {error}"))
    };

    match value.split_once(',') {
        Some((rows, columns)) => Ok([parse(rows)?, parse(columns)?]),
        None => {
            let size = parse(value)?;
            Ok([size, size])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn block_sizes() {
        assert_eq!(parse_block_size("64,128"), Ok([64, 128]));
        assert_eq!(parse_block_size(" 32 , 16"), Ok([32, 16]));
        assert_eq!(parse_block_size("100"), Ok([100, 100]));
        assert!(parse_block_size("a,b").is_err());
    }

    #[test]
    fn options_override_controls() {
        let options = JobOptions {
            block_size: Some([8, 4]),
            workers: Some(-1),
            writers: Some(2),
            no_envi_header: true,
            keep_existing: true,
            ..Default::default()
        };

        let controls = options.apply_to(ApplierControls::new()).unwrap();

        assert_eq!(controls.block_shape, Some(GridShape2D::new([8, 4]).unwrap()));
        assert_eq!(controls.workers, Workers::AllCpus);
        assert_eq!(controls.writers, Some(2));
        assert!(!controls.write_envi_header);
        assert!(!controls.overwrite);
    }

    #[test]
    fn empty_blocks_are_rejected() {
        let options = JobOptions {
            block_size: Some([0, 4]),
            ..Default::default()
        };

        assert!(matches!(
            options.apply_to(ApplierControls::new()),
            Err(Error::DataType { .. })
        ));
    }
}
