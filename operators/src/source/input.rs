use crate::error;
use crate::io::{CategoryColor, MetadataDomains, MetadataValue, RasterDataset, open_dataset};
use crate::util::{Result, safe_lock_mutex};
use applier_datatypes::map_typed_array3;
use applier_datatypes::raster::{
    Grid, Pixel, PixelCoordinate, PixelWindow, RasterDataType, TypedArray3,
};
use applier_datatypes::util::helpers::DEFAULT_TOLERANCE;
use ndarray::{Array2, Array3, s};
use snafu::ensure;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Tolerance in map units for deciding whether two grids are pixel aligned
pub const ALIGNMENT_TOLERANCE: f64 = DEFAULT_TOLERANCE;

/// A raster read by the applier.
///
/// The dataset is opened on first use and the handle is shared by all clones, so
/// concurrent blocks read through the same open dataset. [`InputRaster::close`]
/// releases the handle, the next read opens it again.
#[derive(Clone, Debug)]
pub struct InputRaster {
    inner: Arc<InputRasterInner>,
}

#[derive(Debug)]
struct InputRasterInner {
    path: PathBuf,
    no_data_value: Option<f64>,
    dataset: Mutex<Option<Arc<dyn RasterDataset>>>,
}

impl InputRaster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(InputRasterInner {
                path: path.into(),
                no_data_value: None,
                dataset: Mutex::new(None),
            }),
        }
    }

    /// Overrides the no-data value stored in the dataset
    #[must_use]
    pub fn with_no_data_value(self, no_data_value: f64) -> Self {
        Self {
            inner: Arc::new(InputRasterInner {
                path: self.inner.path.clone(),
                no_data_value: Some(no_data_value),
                dataset: Mutex::new(safe_lock_mutex(&self.inner.dataset).clone()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The open dataset, opening it if necessary
    pub fn open(&self) -> Result<Arc<dyn RasterDataset>> {
        let mut dataset = safe_lock_mutex(&self.inner.dataset);

        if let Some(dataset) = dataset.as_ref() {
            return Ok(Arc::clone(dataset));
        }

        debug!(path = %self.inner.path.display(), "opening input");
        let opened: Arc<dyn RasterDataset> = Arc::from(open_dataset(&self.inner.path)?);
        *dataset = Some(Arc::clone(&opened));

        Ok(opened)
    }

    pub fn is_open(&self) -> bool {
        safe_lock_mutex(&self.inner.dataset).is_some()
    }

    /// Drops the cached handle. Readers still holding it keep it alive until they finish.
    pub fn close(&self) {
        safe_lock_mutex(&self.inner.dataset).take();
    }

    pub fn grid(&self) -> Result<Grid> {
        Ok(self.open()?.grid().clone())
    }

    pub fn data_type(&self) -> Result<RasterDataType> {
        Ok(self.open()?.data_type())
    }

    pub fn band_count(&self) -> Result<usize> {
        Ok(self.open()?.band_count())
    }

    pub fn metadata(&self) -> Result<MetadataDomains> {
        Ok(self.open()?.metadata().clone())
    }

    pub fn metadata_item(&self, key: &str, domain: &str) -> Result<Option<MetadataValue>> {
        Ok(self.open()?.metadata().item(key, domain).cloned())
    }

    /// The explicit no-data value, or the one of the first band.
    /// Use [`InputRaster::no_data_values`] for bands with different values.
    pub fn no_data_value(&self) -> Result<Option<f64>> {
        if let Some(no_data_value) = self.inner.no_data_value {
            return Ok(Some(no_data_value));
        }
        Ok(self.open()?.no_data_value(0))
    }

    /// The no-data value of each band, an explicit value applies to all bands
    pub fn no_data_values(&self) -> Result<Vec<Option<f64>>> {
        let dataset = self.open()?;
        Ok(match self.inner.no_data_value {
            Some(no_data_value) => vec![Some(no_data_value); dataset.band_count()],
            None => dataset.no_data_values(),
        })
    }

    /// The band descriptions, `None` for bands without one
    pub fn descriptions(&self) -> Result<Vec<Option<String>>> {
        Ok(self
            .open()?
            .properties()
            .bands
            .iter()
            .map(|band| band.description.clone())
            .collect())
    }

    pub fn category_names(&self, band_index: usize) -> Result<Option<Vec<String>>> {
        let dataset = self.open()?;
        dataset.ensure_band_index(band_index)?;
        Ok(dataset.properties().bands[band_index].category_names.clone())
    }

    pub fn category_colors(&self, band_index: usize) -> Result<Option<Vec<CategoryColor>>> {
        let dataset = self.open()?;
        dataset.ensure_band_index(band_index)?;
        Ok(dataset.properties().bands[band_index].category_colors.clone())
    }

    /// Like [`InputRaster::no_data_value`] but fails if there is none
    pub fn require_no_data_value(&self) -> Result<f64> {
        self.no_data_value()?.ok_or_else(|| error::Error::MissingNoDataValue {
            name: self.inner.path.display().to_string(),
        })
    }

    /// Reads all bands for the pixels of `grid`.
    ///
    /// Pixels outside of the input are filled with its no-data value, or zero if it has
    /// none. Grids that are not pixel aligned with the input are sampled by nearest
    /// neighbour on the pixel centres.
    pub fn read(&self, grid: &Grid) -> Result<TypedArray3> {
        let dataset = self.open()?;
        let source = dataset.grid();

        ensure!(
            source.spatial_reference() == grid.spatial_reference(),
            error::ProjectionMismatch {
                expected: grid.spatial_reference().to_string(),
                found: source.spatial_reference().to_string(),
            }
        );

        let fill = self.no_data_value()?.unwrap_or_default();

        if source.is_aligned_with(grid, ALIGNMENT_TOLERANCE) {
            read_aligned(dataset.as_ref(), source.pixel_window_of(grid), fill)
        } else {
            read_nearest(dataset.as_ref(), grid, fill)
        }
    }

    /// Reads a single band for the pixels of `grid`
    pub fn read_band(&self, grid: &Grid, band_index: usize) -> Result<TypedArray3> {
        let dataset = self.open()?;
        dataset.ensure_band_index(band_index)?;

        Ok(self.read(grid)?.band(band_index)?)
    }

    /// The fraction of each of `categories` in the pixels of `grid`, shaped
    /// `[categories, rows, columns]`.
    ///
    /// A pixel of `grid` counts the input pixels of band `band_index` whose centres lie
    /// inside it, or the input pixel under its centre if it is smaller than the input
    /// pixels. Input pixels outside of the input extent do not count, pixels without
    /// any counted input pixel get zero fractions.
    #[allow(clippy::float_cmp)]
    pub fn fraction_array(
        &self,
        grid: &Grid,
        categories: &[f64],
        band_index: usize,
    ) -> Result<Array3<f32>> {
        let dataset = self.open()?;
        dataset.ensure_band_index(band_index)?;
        let source = dataset.grid();

        ensure!(
            source.spatial_reference() == grid.spatial_reference(),
            error::ProjectionMismatch {
                expected: grid.spatial_reference().to_string(),
                found: source.spatial_reference().to_string(),
            }
        );

        let shape = grid.shape();
        let (rows, columns) = (shape.axis_size_y(), shape.axis_size_x());
        let row_edges: Vec<f64> = (0..=rows)
            .map(|y| {
                let edge = grid.location(PixelCoordinate::new(0., y as f64));
                source.pixel_coordinate(edge).y
            })
            .collect();
        let column_edges: Vec<f64> = (0..=columns)
            .map(|x| {
                let edge = grid.location(PixelCoordinate::new(x as f64, 0.));
                source.pixel_coordinate(edge).x
            })
            .collect();
        let row_ranges = covered_pixels(&row_edges, source.shape().axis_size_y());
        let column_ranges = covered_pixels(&column_edges, source.shape().axis_size_x());

        let mut fractions = Array3::zeros((categories.len(), rows, columns));

        let (Some(y_range), Some(x_range)) = (span(&row_ranges), span(&column_ranges)) else {
            return Ok(fractions);
        };
        let window = PixelWindow::new(
            [y_range.start as isize, x_range.start as isize].into(),
            [y_range.len(), x_range.len()].into(),
        );
        let values = dataset.read_window(window)?.band(band_index)?.convert::<f64>();

        for (y, row_range) in row_ranges.iter().enumerate() {
            for (x, column_range) in column_ranges.iter().enumerate() {
                let count = row_range.len() * column_range.len();
                if count == 0 {
                    continue;
                }
                let pixels = values.slice(s![
                    0,
                    row_range.start - y_range.start..row_range.end - y_range.start,
                    column_range.start - x_range.start..column_range.end - x_range.start
                ]);
                for (k, &category) in categories.iter().enumerate() {
                    let matches = pixels.iter().filter(|&&value| value == category).count();
                    fractions[[k, y, x]] = matches as f32 / count as f32;
                }
            }
        }

        Ok(fractions)
    }

    /// The pixel profiles of all pixels of `grid` where `mask` is set, in row-major
    /// order, shaped `[bands, 1, samples]`
    pub fn sample(&self, grid: &Grid, mask: &Array2<bool>) -> Result<TypedArray3> {
        let shape = grid.shape();
        let (rows, columns) = mask.dim();
        ensure!(
            [rows, columns] == shape.shape_array,
            error::MaskShapeMismatch {
                expected: shape.shape_array,
                found: [rows, columns],
            }
        );

        let array = self.read(grid)?;
        Ok(map_typed_array3!(&array, pixels => sample_profiles(pixels, mask)))
    }
}

/// The input pixels counted by each target pixel, given the target pixel edges in
/// input pixel coordinates, clipped to the input size
fn covered_pixels(edges: &[f64], size: usize) -> Vec<Range<usize>> {
    let clamp = |index: f64| index.clamp(0., size as f64) as usize;

    edges
        .windows(2)
        .map(|edge| {
            let (start, end) = (edge[0].min(edge[1]), edge[0].max(edge[1]));
            let first = (start - 0.5).ceil();
            let last = (end - 0.5).ceil();
            if last > first {
                clamp(first)..clamp(last)
            } else {
                let centre = ((start + end) / 2.).floor();
                clamp(centre)..clamp(centre + 1.)
            }
        })
        .collect()
}

/// The range spanning all non-empty `ranges`
fn span(ranges: &[Range<usize>]) -> Option<Range<usize>> {
    let ranges = ranges.iter().filter(|range| !range.is_empty());
    let start = ranges.clone().map(|range| range.start).min()?;
    let end = ranges.map(|range| range.end).max()?;
    Some(start..end)
}

fn sample_profiles<T: Pixel>(pixels: &Array3<T>, mask: &Array2<bool>) -> Array3<T> {
    let selected: Vec<(usize, usize)> = mask
        .indexed_iter()
        .filter(|(_, selected)| **selected)
        .map(|(index, _)| index)
        .collect();

    Array3::from_shape_fn((pixels.dim().0, 1, selected.len()), |(band, _, i)| {
        let (y, x) = selected[i];
        pixels[[band, y, x]]
    })
}

/// Reads `window` given in the pixel space of the dataset, filling the part
/// outside of the dataset
fn read_aligned(dataset: &dyn RasterDataset, window: PixelWindow, fill: f64) -> Result<TypedArray3> {
    let bounds = dataset.grid().shape().full_window();

    match window.intersection(&bounds) {
        Some(inside) if inside == window => dataset.read_window(window),
        Some(inside) => {
            let mut array = filled(dataset, window, fill);
            array.assign_window(inside.relative_to(&window), &dataset.read_window(inside)?)?;
            Ok(array)
        }
        None => Ok(filled(dataset, window, fill)),
    }
}

fn read_nearest(dataset: &dyn RasterDataset, grid: &Grid, fill: f64) -> Result<TypedArray3> {
    let source = dataset.grid();
    let bounds = source.shape();

    let rows = inside_indices(
        grid.y_pixel_coordinates(source),
        bounds.axis_size_y(),
    );
    let columns = inside_indices(
        grid.x_pixel_coordinates(source),
        bounds.axis_size_x(),
    );

    // read the smallest window holding all sampled pixels once
    let (Some((y0, y1)), Some((x0, x1))) = (index_range(&rows), index_range(&columns)) else {
        return Ok(filled(
            dataset,
            PixelWindow::new([0, 0].into(), grid.shape()),
            fill,
        ));
    };
    let window = PixelWindow::new(
        [y0 as isize, x0 as isize].into(),
        [y1 - y0 + 1, x1 - x0 + 1].into(),
    );
    let rows = shift(&rows, y0);
    let columns = shift(&columns, x0);

    let array = dataset.read_window(window)?;

    Ok(map_typed_array3!(&array, pixels => sample_nearest(pixels, &rows, &columns, fill)))
}

fn filled(dataset: &dyn RasterDataset, window: PixelWindow, fill: f64) -> TypedArray3 {
    TypedArray3::full(
        dataset.data_type(),
        [
            dataset.band_count(),
            window.shape.axis_size_y(),
            window.shape.axis_size_x(),
        ],
        fill,
    )
}

fn inside_indices(indices: Vec<isize>, size: usize) -> Vec<Option<usize>> {
    indices
        .into_iter()
        .map(|index| usize::try_from(index).ok().filter(|&index| index < size))
        .collect()
}

fn index_range(indices: &[Option<usize>]) -> Option<(usize, usize)> {
    let min = indices.iter().flatten().min()?;
    let max = indices.iter().flatten().max()?;
    Some((*min, *max))
}

fn shift(indices: &[Option<usize>], origin: usize) -> Vec<Option<usize>> {
    indices.iter().map(|index| index.map(|i| i - origin)).collect()
}

fn sample_nearest<T: Pixel>(
    source: &Array3<T>,
    rows: &[Option<usize>],
    columns: &[Option<usize>],
    fill: f64,
) -> Array3<T> {
    let fill = T::from_f64_lossy(fill);
    let bands = source.dim().0;

    Array3::from_shape_fn((bands, rows.len(), columns.len()), |(band, row, column)| {
        match (rows[row], columns[column]) {
            (Some(y), Some(x)) => source[[band, y, x]],
            _ => fill,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{RasterDriver, RasterProperties, create_dataset, mem};
    use applier_datatypes::primitives::SpatialResolution;
    use applier_datatypes::raster::GridShape2D;
    use applier_datatypes::spatial_reference::SpatialReference;
    use ndarray::array;

    fn grid(upper_left: (f64, f64), resolution: f64, shape: [usize; 2]) -> Grid {
        Grid::new(
            upper_left.into(),
            SpatialResolution::new(resolution, resolution).unwrap(),
            GridShape2D::new(shape).unwrap(),
            SpatialReference::wgs84(),
        )
        .unwrap()
    }

    /// A 3x4 raster with values `10 * row + column`
    fn create_input(path: &str, no_data_value: Option<f64>) -> InputRaster {
        let grid = grid((0., 0.), 1., [3, 4]);
        let mut properties = RasterProperties::new(grid.clone(), RasterDataType::I16, 1);
        properties.bands[0].no_data_value = no_data_value;

        let mut dataset =
            create_dataset(Path::new(path), RasterDriver::Mem, properties, &[]).unwrap();
        dataset
            .write_window(
                grid.shape().full_window(),
                &TypedArray3::from(array![[[0_i16, 1, 2, 3], [10, 11, 12, 13], [20, 21, 22, 23]]]),
            )
            .unwrap();
        dataset.flush().unwrap();

        InputRaster::new(path)
    }

    #[test]
    fn opens_lazily_and_caches() {
        let input = create_input("/vsimem/input_test_lazy.bsq", Some(-1.));
        assert!(!input.is_open());

        assert_eq!(input.band_count().unwrap(), 1);
        assert_eq!(input.data_type().unwrap(), RasterDataType::I16);
        assert!(input.is_open());

        let a = input.open().unwrap();
        let b = input.clone().open().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        input.close();
        assert!(!input.is_open());

        mem::remove(Path::new("/vsimem/input_test_lazy.bsq"));
    }

    #[test]
    fn aligned_read() {
        let input = create_input("/vsimem/input_test_aligned.bsq", None);

        let array = input.read(&grid((1., -1.), 1., [2, 2])).unwrap();
        assert_eq!(array, TypedArray3::I16(array![[[11, 12], [21, 22]]]));

        mem::remove(Path::new("/vsimem/input_test_aligned.bsq"));
    }

    #[test]
    fn aligned_read_fills_outside() {
        let input = create_input("/vsimem/input_test_fill.bsq", Some(-1.));

        let array = input.read(&grid((-1., 1.), 1., [2, 3])).unwrap();
        assert_eq!(array, TypedArray3::I16(array![[[-1, -1, -1], [-1, 0, 1]]]));

        let overridden = input.with_no_data_value(-9.);
        let array = overridden.read(&grid((10., 10.), 1., [1, 2])).unwrap();
        assert_eq!(array, TypedArray3::I16(array![[[-9, -9]]]));

        mem::remove(Path::new("/vsimem/input_test_fill.bsq"));
    }

    #[test]
    fn nearest_neighbour_read() {
        let input = create_input("/vsimem/input_test_nearest.bsq", Some(-1.));

        // half pixel shift at half the resolution
        let array = input.read(&grid((1.25, -0.25), 0.5, [2, 3])).unwrap();
        assert_eq!(array, TypedArray3::I16(array![[[1, 2, 2], [11, 12, 12]]]));

        // coarser grid reaching past the right edge
        let array = input.read(&grid((0., 0.), 3., [1, 2])).unwrap();
        assert_eq!(array, TypedArray3::I16(array![[[11, -1]]]));

        mem::remove(Path::new("/vsimem/input_test_nearest.bsq"));
    }

    #[test]
    fn projection_mismatch() {
        let input = create_input("/vsimem/input_test_projection.bsq", None);
        let other = grid((0., 0.), 1., [1, 1]).with_spatial_reference(SpatialReference::local("x"));

        assert!(matches!(
            input.read(&other),
            Err(error::Error::ProjectionMismatch { .. })
        ));

        mem::remove(Path::new("/vsimem/input_test_projection.bsq"));
    }

    #[test]
    fn read_band_and_no_data() {
        let input = create_input("/vsimem/input_test_band.bsq", None);

        assert!(matches!(
            input.read_band(&grid((0., 0.), 1., [1, 1]), 1),
            Err(error::Error::BandIndexOutOfRange { index: 1, .. })
        ));
        assert!(matches!(
            input.require_no_data_value(),
            Err(error::Error::MissingNoDataValue { .. })
        ));
        assert_eq!(
            input.with_no_data_value(5.).require_no_data_value().unwrap(),
            5.
        );

        mem::remove(Path::new("/vsimem/input_test_band.bsq"));
    }

    /// A 2x4 category raster with values `[[1, 1, 2, 2], [1, 2, 2, 2]]`
    fn create_categories(path: &str) -> InputRaster {
        let grid = grid((0., 0.), 1., [2, 4]);
        let mut properties = RasterProperties::new(grid.clone(), RasterDataType::U8, 1);
        properties.bands[0].category_names =
            Some(vec!["none".to_string(), "a".to_string(), "b".to_string()]);
        properties.bands[0].category_colors = Some(vec![[0, 0, 0], [255, 0, 0], [0, 255, 0]]);

        let mut dataset =
            create_dataset(Path::new(path), RasterDriver::Mem, properties, &[]).unwrap();
        dataset
            .write_window(
                grid.shape().full_window(),
                &TypedArray3::from(array![[[1_u8, 1, 2, 2], [1, 2, 2, 2]]]),
            )
            .unwrap();
        dataset.flush().unwrap();

        InputRaster::new(path)
    }

    #[test]
    fn fractions_at_coarser_resolution() {
        let input = create_categories("/vsimem/input_test_fractions.bsq");

        let fractions = input
            .fraction_array(&grid((0., 0.), 2., [1, 2]), &[1., 2., 5.], 0)
            .unwrap();
        assert_eq!(
            fractions,
            array![[[0.75, 0.]], [[0.25, 1.]], [[0., 0.]]]
        );

        // the right pixel lies outside of the input
        let fractions = input
            .fraction_array(&grid((2., 0.), 2., [1, 2]), &[2.], 0)
            .unwrap();
        assert_eq!(fractions, array![[[1., 0.]]]);

        // finer pixels take the input pixel under their centre
        let fractions = input
            .fraction_array(&grid((1.5, -0.5), 0.5, [1, 2]), &[1., 2.], 0)
            .unwrap();
        assert_eq!(fractions, array![[[1., 0.]], [[0., 1.]]]);

        assert!(matches!(
            input.fraction_array(&grid((0., 0.), 2., [1, 2]), &[1.], 1),
            Err(error::Error::BandIndexOutOfRange { index: 1, .. })
        ));

        mem::remove(Path::new("/vsimem/input_test_fractions.bsq"));
    }

    #[test]
    fn band_properties() {
        let input = create_categories("/vsimem/input_test_properties.bsq");

        assert_eq!(
            input.category_names(0).unwrap(),
            Some(vec!["none".to_string(), "a".to_string(), "b".to_string()])
        );
        assert_eq!(
            input.category_colors(0).unwrap(),
            Some(vec![[0, 0, 0], [255, 0, 0], [0, 255, 0]])
        );
        assert_eq!(input.descriptions().unwrap(), vec![None]);
        assert_eq!(input.no_data_values().unwrap(), vec![None]);
        assert_eq!(
            input.clone().with_no_data_value(0.).no_data_values().unwrap(),
            vec![Some(0.)]
        );
        assert_eq!(input.metadata_item("wavelength", "ENVI").unwrap(), None);
        assert!(input.category_names(1).is_err());

        mem::remove(Path::new("/vsimem/input_test_properties.bsq"));
    }

    #[test]
    fn per_band_no_data_values() {
        let path = Path::new("/vsimem/input_test_band_no_data.bsq");
        let mut properties = RasterProperties::new(grid((0., 0.), 1., [1, 1]), RasterDataType::I16, 2);
        properties.bands[1].no_data_value = Some(-1.);
        create_dataset(path, RasterDriver::Mem, properties, &[])
            .unwrap()
            .flush()
            .unwrap();

        let input = InputRaster::new(path);
        assert_eq!(input.no_data_values().unwrap(), vec![None, Some(-1.)]);
        assert_eq!(input.no_data_value().unwrap(), None);

        mem::remove(path);
    }

    #[test]
    fn samples_masked_profiles() {
        let input = create_input("/vsimem/input_test_sample.bsq", Some(-1.));
        let grid = grid((0., 0.), 1., [3, 4]);

        let mask = array![
            [false, true, false, false],
            [false, false, false, false],
            [true, false, false, true]
        ];
        assert_eq!(
            input.sample(&grid, &mask).unwrap(),
            TypedArray3::I16(array![[[1, 20, 23]]])
        );

        let empty = Array2::from_elem((3, 4), false);
        assert_eq!(input.sample(&grid, &empty).unwrap().shape(), [1, 1, 0]);

        assert!(matches!(
            input.sample(&grid, &Array2::from_elem((2, 2), true)),
            Err(error::Error::MaskShapeMismatch { expected: [3, 4], found: [2, 2] })
        ));

        mem::remove(Path::new("/vsimem/input_test_sample.bsq"));
    }
}
