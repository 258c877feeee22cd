use super::options::JobOptions;
use crate::error::Result;
use applier_datatypes::raster::RasterDataType;
use applier_operators::io::BandProperties;
use applier_operators::util::Result as OperatorResult;
use applier_operators::{Applier, BlockContext, InputRaster, OutputRaster};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Copies a raster block by block, converting format and data type on the way
#[derive(Debug, Parser)]
pub struct CopyRaster {
    /// Source raster
    input: PathBuf,

    /// Target raster, the format is chosen by the file extension
    output: PathBuf,

    /// Pixel type of the copy, defaults to the source type
    #[arg(long)]
    data_type: Option<RasterDataType>,

    #[command(flatten)]
    options: JobOptions,
}

pub fn copy(params: CopyRaster) -> Result<(), anyhow::Error> {
    run(&params)?;
    Ok(())
}

fn run(params: &CopyRaster) -> Result<()> {
    let input = InputRaster::new(&params.input);
    let bands: Vec<BandProperties> = input.open()?.properties().bands.clone();
    let metadata = input.metadata()?;

    let mut applier = Applier::new(params.options.controls("copy")?);
    applier
        .add_input("source", input)
        .add_output("copy", OutputRaster::new(&params.output));

    let outcome = applier.apply(&|context: &mut BlockContext<'_>| -> OperatorResult<()> {
        let array = context.input("source")?;
        let output = context.output("copy")?;

        output.set_metadata_domains(&metadata)?;
        output.set_no_data_values(bands.iter().map(|band| band.no_data_value).collect())?;
        for (band_index, band) in bands.iter().enumerate() {
            if let Some(description) = &band.description {
                output.set_band_description(band_index, description)?;
            }
            if let Some(names) = &band.category_names {
                output.set_category_names(band_index, names.clone())?;
            }
            if let Some(colors) = &band.category_colors {
                output.set_category_colors(band_index, colors.clone())?;
            }
        }

        match params.data_type {
            Some(data_type) => output.set_array(array.convert_to(data_type)),
            None => output.set_array(array),
        }
    })?;

    if outcome.is_skipped() {
        info!(output = %params.output.display(), "output exists, nothing copied");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use applier_datatypes::primitives::SpatialResolution;
    use applier_datatypes::raster::{Grid, GridShape2D, TypedArray3};
    use applier_datatypes::spatial_reference::SpatialReference;
    use applier_operators::io::{
        ENVI_DOMAIN, MetadataValue, RasterDriver, RasterProperties, create_dataset, open_dataset,
    };
    use ndarray::Array3;
    use serial_test::serial;

    fn create_source(path: &std::path::Path) -> TypedArray3 {
        let grid = Grid::new(
            (0., 50.).into(),
            SpatialResolution::new(1., 1.).unwrap(),
            GridShape2D::new([5, 7]).unwrap(),
            SpatialReference::wgs84(),
        )
        .unwrap();
        let mut properties = RasterProperties::new(grid.clone(), RasterDataType::U16, 2);
        properties.bands[0].no_data_value = Some(0.);
        properties.bands[1].description = Some("second".to_string());
        properties.bands[0].category_names = Some(vec!["none".to_string(), "low".to_string()]);
        properties.bands[0].category_colors = Some(vec![[0, 0, 0], [0, 128, 0]]);
        properties
            .metadata
            .set_item("wavelength", vec![450., 550.].into(), ENVI_DOMAIN);
        properties
            .metadata
            .set_item("fwhm", vec![10., 12.].into(), ENVI_DOMAIN);

        let array: TypedArray3 =
            Array3::from_shape_fn((2, 5, 7), |(b, y, x)| (b * 100 + y * 7 + x) as u16).into();

        let mut dataset =
            create_dataset(path, RasterDriver::from_filename(path), properties, &[]).unwrap();
        dataset
            .write_window(grid.shape().full_window(), &array)
            .unwrap();
        dataset.flush().unwrap();

        array
    }

    #[test]
    #[serial]
    fn copies_pixels_and_band_properties() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("source.bsq");
        let output = dir.path().join("copy.bip");
        let array = create_source(&input);

        copy(CopyRaster {
            input,
            output: output.clone(),
            data_type: Some(RasterDataType::F32),
            options: JobOptions::default(),
        })
        .unwrap();

        let copied = open_dataset(&output).unwrap();
        let properties = copied.properties();
        assert_eq!(properties.data_type, RasterDataType::F32);
        assert_eq!(properties.bands[0].no_data_value, Some(0.));
        assert_eq!(properties.bands[1].description.as_deref(), Some("second"));
        assert_eq!(
            properties.bands[0].category_colors,
            Some(vec![[0, 0, 0], [0, 128, 0]])
        );
        assert_eq!(
            properties.metadata.item("wavelength", ENVI_DOMAIN),
            Some(&MetadataValue::from(vec![450., 550.]))
        );
        assert_eq!(
            properties.metadata.item("fwhm", ENVI_DOMAIN),
            Some(&MetadataValue::from(vec![10., 12.]))
        );
        assert_eq!(
            copied
                .read_window(properties.grid.shape().full_window())
                .unwrap(),
            array.convert_to(RasterDataType::F32)
        );
    }
}
