use super::options::JobOptions;
use crate::error::Result;
use applier_operators::util::Result as OperatorResult;
use applier_operators::{Applier, BlockContext, BlockOperator, InputRaster, OutputRaster};
use clap::Parser;
use ndarray::{Array3, s};
use std::path::PathBuf;
use tracing::info;

/// Smooths a raster with a moving window mean
#[derive(Debug, Parser)]
pub struct MeanFilter {
    /// Source raster
    input: PathBuf,

    /// Filtered raster, stored as `F32`
    output: PathBuf,

    /// Window radius in pixels, the window spans `2 * radius + 1` pixels per axis
    #[arg(long, default_value_t = 1)]
    radius: usize,

    #[command(flatten)]
    options: JobOptions,
}

pub fn mean_filter(params: MeanFilter) -> Result<(), anyhow::Error> {
    run(&params)?;
    Ok(())
}

fn run(params: &MeanFilter) -> Result<()> {
    let input = InputRaster::new(&params.input);
    let no_data_value = input.no_data_value()?;

    let mut applier = Applier::new(
        params
            .options
            .controls("mean-filter")?
            .with_overlap(params.radius),
    );
    applier
        .add_input("image", input)
        .add_output("mean", OutputRaster::new(&params.output));

    let outcome = applier.apply(&MovingMean {
        radius: params.radius,
        no_data_value,
    })?;

    match outcome.completed() {
        Some(pixels) => info!(pixels, "filtered"),
        None => info!(output = %params.output.display(), "output exists, nothing filtered"),
    }

    Ok(())
}

struct MovingMean {
    radius: usize,
    no_data_value: Option<f64>,
}

impl BlockOperator for MovingMean {
    type BlockResult = usize;
    type Output = usize;

    fn process(&self, context: &mut BlockContext<'_>) -> OperatorResult<usize> {
        let image = context.input("image")?.convert::<f64>();
        let mean = moving_mean(&image, self.radius, self.no_data_value);

        let output = context.output("mean")?;
        output.set_no_data_value(self.no_data_value)?;
        output.set_array_with_overlap(mean)?;

        let shape = context.write_window().shape;
        Ok(shape.axis_size_y() * shape.axis_size_x())
    }

    fn aggregate(&self, pixels: Vec<usize>) -> OperatorResult<usize> {
        Ok(pixels.into_iter().sum())
    }
}

/// Mean of the valid pixels in the window around each pixel, clipped to the array.
///
/// Windows without a valid pixel get the no-data value, or `NaN` without one.
fn moving_mean(array: &Array3<f64>, radius: usize, no_data_value: Option<f64>) -> Array3<f32> {
    let (bands, rows, columns) = array.dim();
    let is_valid = |value: f64| no_data_value.is_none_or(|no_data| value != no_data);
    let empty = no_data_value.unwrap_or(f64::NAN) as f32;

    Array3::from_shape_fn((bands, rows, columns), |(b, y, x)| {
        let window = array.slice(s![
            b,
            y.saturating_sub(radius)..(y + radius + 1).min(rows),
            x.saturating_sub(radius)..(x + radius + 1).min(columns)
        ]);

        let (sum, count) = window
            .iter()
            .filter(|value| is_valid(**value))
            .fold((0_f64, 0_usize), |(sum, count), value| (sum + value, count + 1));

        if count == 0 {
            empty
        } else {
            (sum / count as f64) as f32
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn means_inside_the_array() {
        let image = array![[[1., 2., 3.], [4., 5., 6.]]];

        let mean = moving_mean(&image, 1, None);

        assert_eq!(mean, array![[[3., 3.5, 4.], [3., 3.5, 4.]]]);
    }

    #[test]
    fn skips_no_data() {
        let image = array![[[-1., 2.], [-1., -1.]], [[-1., -1.], [-1., -1.]]];

        let mean = moving_mean(&image, 1, Some(-1.));

        assert_eq!(mean, array![[[2., 2.], [2., 2.]], [[-1., -1.], [-1., -1.]]]);
    }

    #[test]
    fn zero_radius_is_identity() {
        let image = array![[[1., 2.], [3., 4.]]];

        assert_eq!(moving_mean(&image, 0, None), image.mapv(|v| v as f32));
    }
}
