use crate::controls::ApplierControls;
use crate::error;
use crate::io::{CategoryColor, MetadataDomains, MetadataValue, RasterDriver, dataset_exists};
use crate::progress::format_duration;
use crate::source::{InputRaster, InputRasterGroup, KEY_SEPARATOR};
use crate::util::Result;
use crate::writer::{BandMethod, DatasetMethod, WriterQueue, WriterTask};
use applier_datatypes::raster::{
    BlockInformation, BlockTiling, Grid, Margins, PixelWindow, RasterDataType, TypedArray3,
};
use rayon::prelude::*;
use snafu::ensure;
use ndarray::{Array2, Array3};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A computation run on every block of the processing grid.
///
/// `process` is called once per block, possibly concurrently and in any order. The
/// block results are handed to `aggregate` in block order.
pub trait BlockOperator: Sync {
    type BlockResult: Send;
    type Output;

    fn process(&self, context: &mut BlockContext<'_>) -> Result<Self::BlockResult>;

    fn aggregate(&self, results: Vec<Self::BlockResult>) -> Result<Self::Output>;
}

impl<F, R> BlockOperator for F
where
    F: Fn(&mut BlockContext<'_>) -> Result<R> + Sync,
    R: Send,
{
    type BlockResult = R;
    type Output = Vec<R>;

    fn process(&self, context: &mut BlockContext<'_>) -> Result<R> {
        self(context)
    }

    fn aggregate(&self, results: Vec<R>) -> Result<Vec<R>> {
        Ok(results)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ApplyOutcome<T> {
    Completed(T),
    /// Nothing was processed because all outputs exist and overwriting is disabled
    Skipped,
}

impl<T> ApplyOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            ApplyOutcome::Completed(output) => Some(output),
            ApplyOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ApplyOutcome::Skipped)
    }
}

/// Destination of an output raster
#[derive(Clone, Debug, PartialEq)]
pub struct OutputRaster {
    pub filename: PathBuf,
    pub driver: RasterDriver,
    pub creation_options: Vec<String>,
}

impl OutputRaster {
    /// Derives the driver and its default creation options from the file extension
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        let filename = filename.into();
        let driver = RasterDriver::from_filename(&filename);
        Self {
            creation_options: driver.default_creation_options(),
            filename,
            driver,
        }
    }

    #[must_use]
    pub fn with_driver(mut self, driver: RasterDriver) -> Self {
        self.creation_options = driver.default_creation_options();
        self.driver = driver;
        self
    }

    #[must_use]
    pub fn with_creation_options(mut self, creation_options: Vec<String>) -> Self {
        self.creation_options = creation_options;
        self
    }
}

/// Runs block operators over a processing grid, reading named inputs and writing
/// named outputs
#[derive(Debug, Default)]
pub struct Applier {
    inputs: Vec<(String, InputRaster)>,
    groups: Vec<(String, InputRasterGroup)>,
    outputs: Vec<(String, OutputRaster)>,
    controls: ApplierControls,
}

impl Applier {
    pub fn new(controls: ApplierControls) -> Self {
        Self {
            inputs: Vec::new(),
            groups: Vec::new(),
            outputs: Vec::new(),
            controls,
        }
    }

    pub fn controls(&self) -> &ApplierControls {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut ApplierControls {
        &mut self.controls
    }

    /// Adds an input, replacing one with the same name
    pub fn add_input(&mut self, name: impl Into<String>, input: InputRaster) -> &mut Self {
        insert(&mut self.inputs, name.into(), input);
        self
    }

    /// Adds every raster of `group` as input `{name}/{key}` and keeps the group
    /// itself for [`BlockContext::input_group`]
    pub fn add_input_group(
        &mut self,
        name: impl Into<String>,
        group: InputRasterGroup,
    ) -> &mut Self {
        let name = name.into();
        for (key, raster) in group.flat_rasters() {
            insert(
                &mut self.inputs,
                format!("{name}{KEY_SEPARATOR}{key}"),
                raster.clone(),
            );
        }
        insert(&mut self.groups, name, group);
        self
    }

    /// Adds an output, replacing one with the same name
    pub fn add_output(&mut self, name: impl Into<String>, output: OutputRaster) -> &mut Self {
        insert(&mut self.outputs, name.into(), output);
        self
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&str, &InputRaster)> {
        self.inputs.iter().map(|(name, input)| (name.as_str(), input))
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &OutputRaster)> {
        self.outputs.iter().map(|(name, output)| (name.as_str(), output))
    }

    /// The processing grid
    pub fn grid(&self) -> Result<Grid> {
        let grids = self
            .inputs
            .iter()
            .map(|(_, input)| input.grid())
            .collect::<Result<Vec<_>>>()?;

        self.controls.derive_grid(&grids)
    }

    /// The blocks of the processing grid
    pub fn tiling(&self, grid: &Grid) -> BlockTiling {
        BlockTiling::new(
            grid.shape(),
            self.controls.block_shape.unwrap_or(grid.shape()),
            self.controls.overlap,
        )
    }

    /// Runs `operator` on every block.
    ///
    /// All outputs are closed before returning, also on failure, so blocks written
    /// before a failing one remain on disk.
    ///
    /// # Errors
    ///
    /// Fails with `BlockOperator` for the lowest failing block, with `Aborted` if the
    /// abort handle was triggered and with `Writer` if writing an output failed.
    pub fn apply<O: BlockOperator>(&self, operator: &O) -> Result<ApplyOutcome<O::Output>> {
        let controls = &self.controls;

        if !controls.overwrite
            && !self.outputs.is_empty()
            && self
                .outputs
                .iter()
                .all(|(_, output)| dataset_exists(&output.filename))
        {
            info!(name = %controls.name, "skipping job, all outputs exist");
            return Ok(ApplyOutcome::Skipped);
        }

        let started = Instant::now();
        let grid = self.grid()?;
        let tiling = self.tiling(&grid);

        controls.progress.set_text(&format!("start {}", controls.name));
        info!(
            name = %controls.name,
            shape = %grid.shape(),
            blocks = tiling.number_of_blocks(),
            block_shape = %tiling.block_shape(),
            overlap = tiling.overlap(),
            workers = ?controls.workers,
            "starting job"
        );

        let pool = controls.workers.thread_pool()?;
        let writer = controls.writer_queue()?;

        let job = Job {
            applier: self,
            grid: &grid,
            tiling,
            writer: &writer,
            completed: AtomicUsize::new(0),
            failed: AtomicBool::new(false),
        };
        let results = match pool {
            None => job.run_inline(operator),
            Some(pool) => pool.install(|| job.run_parallel(operator)),
        };

        let closed = writer.finish(controls.write_envi_header);
        for (_, input) in &self.inputs {
            input.close();
        }

        let results = match (results, closed) {
            (Ok(results), Ok(())) => results,
            (Err(e), closed) => {
                if let Err(writer_error) = closed {
                    warn!("closing outputs after the failed job failed too: {writer_error}");
                }
                return Err(e);
            }
            (Ok(_), Err(e)) => return Err(e),
        };

        let output = operator.aggregate(results)?;

        controls.progress.set_percentage(100.);
        controls.progress.set_text(&format!(
            "done {} in {}",
            controls.name,
            format_duration(started.elapsed())
        ));

        Ok(ApplyOutcome::Completed(output))
    }
}

fn insert<T>(entries: &mut Vec<(String, T)>, name: String, value: T) {
    match entries.iter_mut().find(|(existing, _)| *existing == name) {
        Some((_, existing)) => *existing = value,
        None => entries.push((name, value)),
    }
}

/// State of a single `apply` run shared by all blocks
struct Job<'a> {
    applier: &'a Applier,
    grid: &'a Grid,
    tiling: BlockTiling,
    writer: &'a WriterQueue,
    completed: AtomicUsize,
    failed: AtomicBool,
}

impl Job<'_> {
    fn run_inline<O: BlockOperator>(&self, operator: &O) -> Result<Vec<O::BlockResult>> {
        let mut results = Vec::with_capacity(self.tiling.number_of_blocks());

        for block in self.tiling.blocks() {
            if self.applier.controls.abort.is_aborted() {
                return Err(error::Error::Aborted);
            }
            results.push(self.process(operator, block)?);
        }

        Ok(results)
    }

    fn run_parallel<O: BlockOperator>(&self, operator: &O) -> Result<Vec<O::BlockResult>> {
        let results: Vec<Option<Result<O::BlockResult>>> = (0..self.tiling.number_of_blocks())
            .into_par_iter()
            .map(|index| {
                if self.failed.load(Ordering::SeqCst) || self.applier.controls.abort.is_aborted() {
                    return None;
                }

                let block = self.tiling.block(index)?;
                let result = self.process(operator, block);
                if result.is_err() {
                    self.failed.store(true, Ordering::SeqCst);
                }
                Some(result)
            })
            .collect();

        // the lowest failing block wins, skipped blocks mean the job was aborted
        let mut skipped = false;
        let mut block_results = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Some(Ok(result)) => block_results.push(result),
                Some(Err(e)) => return Err(e),
                None => skipped = true,
            }
        }
        ensure!(!skipped, error::Aborted);

        Ok(block_results)
    }

    fn process<O: BlockOperator>(
        &self,
        operator: &O,
        block: BlockInformation,
    ) -> Result<O::BlockResult> {
        debug!(
            block = block.index,
            blocks = block.number_of_blocks,
            window = %block.write_window,
            "processing block"
        );

        let result = BlockContext::new(self.applier, self.grid, block, self.writer)
            .and_then(|mut context| operator.process(&mut context))
            .map_err(|source| error::Error::BlockOperator {
                block_index: block.index,
                source: Box::new(source),
            })?;

        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.applier
            .controls
            .progress
            .set_percentage(completed as f64 * 100. / block.number_of_blocks as f64);

        Ok(result)
    }
}

/// What an operator sees of the block it processes.
///
/// Inputs are read for the read window, which is the write window extended by the
/// overlap. Outputs are written for the write window.
#[derive(Debug)]
pub struct BlockContext<'a> {
    applier: &'a Applier,
    grid: &'a Grid,
    block: BlockInformation,
    read_grid: Grid,
    write_grid: Grid,
    writer: &'a WriterQueue,
    cache: HashMap<String, TypedArray3>,
}

impl<'a> BlockContext<'a> {
    fn new(
        applier: &'a Applier,
        grid: &'a Grid,
        block: BlockInformation,
        writer: &'a WriterQueue,
    ) -> Result<Self> {
        Ok(Self {
            applier,
            grid,
            read_grid: grid.subgrid(block.read_window)?,
            write_grid: grid.subgrid(block.write_window)?,
            block,
            writer,
            cache: HashMap::new(),
        })
    }

    pub fn block(&self) -> &BlockInformation {
        &self.block
    }

    pub fn index(&self) -> usize {
        self.block.index
    }

    pub fn is_first_block(&self) -> bool {
        self.block.is_first_block()
    }

    pub fn is_last_block(&self) -> bool {
        self.block.is_last_block()
    }

    pub fn is_last_x_block(&self) -> bool {
        self.block.is_last_x_block()
    }

    pub fn is_last_y_block(&self) -> bool {
        self.block.is_last_y_block()
    }

    /// The whole processing grid
    pub fn grid(&self) -> &Grid {
        self.grid
    }

    pub fn read_grid(&self) -> &Grid {
        &self.read_grid
    }

    pub fn write_grid(&self) -> &Grid {
        &self.write_grid
    }

    pub fn read_window(&self) -> PixelWindow {
        self.block.read_window
    }

    pub fn write_window(&self) -> PixelWindow {
        self.block.write_window
    }

    /// The overlap applied on each side of this block
    pub fn margins(&self) -> Margins {
        self.block.margins
    }

    pub fn input_raster(&self, name: &str) -> Result<&InputRaster> {
        self.applier
            .inputs
            .iter()
            .find(|(input, _)| input == name)
            .map(|(_, input)| input)
            .ok_or_else(|| error::Error::UnknownInput {
                name: name.to_string(),
            })
    }

    /// All bands of an input for the read window, read once per block
    pub fn input(&mut self, name: &str) -> Result<TypedArray3> {
        if let Some(array) = self.cache.get(name) {
            return Ok(array.clone());
        }

        let array = self.input_raster(name)?.read(&self.read_grid)?;
        self.cache.insert(name.to_string(), array.clone());

        Ok(array)
    }

    /// A single band of an input for the read window
    pub fn input_band(&mut self, name: &str, band_index: usize) -> Result<TypedArray3> {
        self.input_raster(name)?.open()?.ensure_band_index(band_index)?;

        Ok(self.input(name)?.band(band_index)?)
    }

    /// A group added with [`Applier::add_input_group`], its rasters are read through
    /// [`BlockContext::input`] as `{group}/{key}`
    pub fn input_group(&self, name: &str) -> Result<&InputRasterGroup> {
        self.applier
            .groups
            .iter()
            .find(|(group, _)| group == name)
            .map(|(_, group)| group)
            .ok_or_else(|| error::Error::UnknownInput {
                name: name.to_string(),
            })
    }

    pub fn input_no_data_value(&self, name: &str) -> Result<Option<f64>> {
        self.input_raster(name)?.no_data_value()
    }

    pub fn input_no_data_values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        self.input_raster(name)?.no_data_values()
    }

    /// The fractions of `categories` in band `band_index` of an input for the read
    /// window, see [`InputRaster::fraction_array`]
    pub fn input_fraction(
        &self,
        name: &str,
        categories: &[f64],
        band_index: usize,
    ) -> Result<Array3<f32>> {
        self.input_raster(name)?
            .fraction_array(&self.read_grid, categories, band_index)
    }

    /// The profiles of an input where `mask` is set, `mask` is shaped like the write
    /// window
    pub fn input_sample(&self, name: &str, mask: &Array2<bool>) -> Result<TypedArray3> {
        self.input_raster(name)?.sample(&self.write_grid, mask)
    }

    pub fn output(&self, name: &str) -> Result<OutputHandle<'_>> {
        let output = self
            .applier
            .outputs
            .iter()
            .find(|(output, _)| output == name)
            .map(|(_, output)| output)
            .ok_or_else(|| error::Error::UnknownOutput {
                name: name.to_string(),
            })?;

        Ok(OutputHandle {
            output,
            grid: self.grid,
            block: &self.block,
            writer: self.writer,
        })
    }

    /// An array filled with `value`, shaped like the read window if `overlap` is set
    /// and like the write window otherwise
    pub fn full(
        &self,
        value: f64,
        bands: usize,
        data_type: RasterDataType,
        overlap: bool,
    ) -> TypedArray3 {
        let window = if overlap {
            self.block.read_window
        } else {
            self.block.write_window
        };

        TypedArray3::full(
            data_type,
            [
                bands,
                window.shape.axis_size_y(),
                window.shape.axis_size_x(),
            ],
            value,
        )
    }
}

/// Enqueues writer tasks for one output of the current block.
///
/// Property setters only take effect in the first block, so they can be called
/// unconditionally from the operator.
#[derive(Debug)]
pub struct OutputHandle<'a> {
    output: &'a OutputRaster,
    grid: &'a Grid,
    block: &'a BlockInformation,
    writer: &'a WriterQueue,
}

impl OutputHandle<'_> {
    pub fn filename(&self) -> &Path {
        &self.output.filename
    }

    /// Writes all bands of the write window
    pub fn set_array(&self, array: impl Into<TypedArray3>) -> Result<()> {
        let array = array.into();
        self.ensure_write_window(&array)?;

        self.writer.submit(WriterTask::WriteArray {
            filename: self.output.filename.clone(),
            array,
            window: self.block.write_window,
            grid: self.grid.clone(),
            driver: self.output.driver,
            creation_options: self.output.creation_options.clone(),
        })
    }

    /// Writes an array covering the read window, the overlap is cut off
    pub fn set_array_with_overlap(&self, array: impl Into<TypedArray3>) -> Result<()> {
        let array = array.into();
        let trimmed = array.trim(self.block.margins)?;
        self.set_array(trimmed)
    }

    /// Writes one band of an output with `band_count` bands
    pub fn set_band_array(
        &self,
        array: impl Into<TypedArray3>,
        band_index: usize,
        band_count: usize,
    ) -> Result<()> {
        let array = array.into();
        self.ensure_write_window(&array)?;

        self.writer.submit(WriterTask::WriteBandArray {
            filename: self.output.filename.clone(),
            array,
            band_index,
            band_count,
            window: self.block.write_window,
            grid: self.grid.clone(),
            driver: self.output.driver,
            creation_options: self.output.creation_options.clone(),
        })
    }

    pub fn set_metadata_item(
        &self,
        key: &str,
        value: impl Into<MetadataValue>,
        domain: &str,
    ) -> Result<()> {
        self.call_dataset_method(DatasetMethod::SetMetadataItem {
            key: key.to_string(),
            value: value.into(),
            domain: domain.to_string(),
        })
    }

    /// Sets all items of `metadata`, e.g. the `ENVI` domain of an input
    pub fn set_metadata_domains(&self, metadata: &MetadataDomains) -> Result<()> {
        self.call_dataset_method(DatasetMethod::SetMetadataDomains(metadata.clone()))
    }

    pub fn set_no_data_value(&self, no_data_value: Option<f64>) -> Result<()> {
        self.call_dataset_method(DatasetMethod::SetNoDataValue(no_data_value))
    }

    pub fn set_no_data_values(&self, no_data_values: Vec<Option<f64>>) -> Result<()> {
        self.call_dataset_method(DatasetMethod::SetNoDataValues(no_data_values))
    }

    pub fn set_band_description(&self, band_index: usize, description: &str) -> Result<()> {
        self.call_band_method(
            band_index,
            BandMethod::SetDescription(description.to_string()),
        )
    }

    pub fn set_band_no_data_value(
        &self,
        band_index: usize,
        no_data_value: Option<f64>,
    ) -> Result<()> {
        self.call_band_method(band_index, BandMethod::SetNoDataValue(no_data_value))
    }

    pub fn set_category_names(&self, band_index: usize, names: Vec<String>) -> Result<()> {
        self.call_band_method(band_index, BandMethod::SetCategoryNames(names))
    }

    pub fn set_category_colors(&self, band_index: usize, colors: Vec<CategoryColor>) -> Result<()> {
        self.call_band_method(band_index, BandMethod::SetCategoryColors(colors))
    }

    pub fn set_band_metadata_item(
        &self,
        band_index: usize,
        key: &str,
        value: impl Into<MetadataValue>,
        domain: &str,
    ) -> Result<()> {
        self.call_band_method(
            band_index,
            BandMethod::SetMetadataItem {
                key: key.to_string(),
                value: value.into(),
                domain: domain.to_string(),
            },
        )
    }

    fn call_dataset_method(&self, method: DatasetMethod) -> Result<()> {
        if !self.block.is_first_block() {
            return Ok(());
        }
        self.writer.submit(WriterTask::CallDatasetMethod {
            filename: self.output.filename.clone(),
            method,
        })
    }

    fn call_band_method(&self, band_index: usize, method: BandMethod) -> Result<()> {
        if !self.block.is_first_block() {
            return Ok(());
        }
        self.writer.submit(WriterTask::CallBandMethod {
            filename: self.output.filename.clone(),
            band_index,
            method,
        })
    }

    fn ensure_write_window(&self, array: &TypedArray3) -> Result<()> {
        let window = self.block.write_window;
        ensure!(
            array.grid_shape() == window.shape,
            error::WindowShapeMismatch {
                window,
                found: array.shape(),
            }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::Workers;
    use crate::io::{
        ENVI_DOMAIN, RasterDataset, RasterProperties, create_dataset, mem, open_dataset,
    };
    use crate::progress::CallbackProgress;
    use applier_datatypes::primitives::SpatialResolution;
    use applier_datatypes::raster::GridShape2D;
    use applier_datatypes::spatial_reference::SpatialReference;
    use ndarray::{Array3, array};
    use std::sync::{Arc, Mutex};

    fn grid(shape: [usize; 2]) -> Grid {
        Grid::new(
            (0., 0.).into(),
            SpatialResolution::one(),
            GridShape2D::new(shape).unwrap(),
            SpatialReference::wgs84(),
        )
        .unwrap()
    }

    fn create_input(path: &str, shape: [usize; 2]) -> InputRaster {
        let grid = grid(shape);
        let properties = RasterProperties::new(grid.clone(), RasterDataType::U16, 1);
        let mut dataset =
            create_dataset(Path::new(path), RasterDriver::Mem, properties, &[]).unwrap();
        let values = Array3::from_shape_fn((1, shape[0], shape[1]), |(_, y, x)| {
            (y * shape[1] + x) as u16
        });
        dataset
            .write_window(grid.shape().full_window(), &values.into())
            .unwrap();
        dataset.flush().unwrap();

        InputRaster::new(path)
    }

    #[test]
    fn copies_blockwise() {
        let input = create_input("/vsimem/applier_test_copy_in.bsq", [5, 7]);
        let mut applier = Applier::new(
            ApplierControls::new().with_block_shape(GridShape2D::new([2, 3]).unwrap()),
        );
        applier
            .add_input("image", input)
            .add_output("copy", OutputRaster::new("/vsimem/applier_test_copy_out.bsq"));

        let indices = applier
            .apply(&|context: &mut BlockContext<'_>| -> Result<usize> {
                let array = context.input("image")?;
                context.output("copy")?.set_array(array)?;
                Ok(context.index())
            })
            .unwrap()
            .completed()
            .unwrap();

        assert_eq!(indices, (0..9).collect::<Vec<_>>());

        let copy = open_dataset(Path::new("/vsimem/applier_test_copy_out.bsq")).unwrap();
        let original = open_dataset(Path::new("/vsimem/applier_test_copy_in.bsq")).unwrap();
        let window = grid([5, 7]).shape().full_window();
        assert_eq!(
            copy.read_window(window).unwrap(),
            original.read_window(window).unwrap()
        );

        mem::remove(Path::new("/vsimem/applier_test_copy_in.bsq"));
        mem::remove(Path::new("/vsimem/applier_test_copy_out.bsq"));
    }

    struct CountPixels;

    impl BlockOperator for CountPixels {
        type BlockResult = usize;
        type Output = usize;

        fn process(&self, context: &mut BlockContext<'_>) -> Result<usize> {
            Ok(context.write_window().shape.number_of_elements())
        }

        fn aggregate(&self, results: Vec<usize>) -> Result<usize> {
            Ok(results.into_iter().sum())
        }
    }

    #[test]
    fn aggregates_in_parallel() {
        let mut controls = ApplierControls::new()
            .with_grid(grid([17, 13]))
            .with_block_shape(GridShape2D::new([4, 4]).unwrap())
            .with_workers(Workers::Threads(3));
        controls.write_envi_header = false;

        let pixels = Applier::new(controls).apply(&CountPixels).unwrap();

        assert_eq!(pixels, ApplyOutcome::Completed(17 * 13));
    }

    #[test]
    fn progress_reaches_100_percent() {
        let percentages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&percentages);

        let applier = Applier::new(
            ApplierControls::new()
                .with_grid(grid([4, 4]))
                .with_block_shape(GridShape2D::new([2, 4]).unwrap())
                .with_progress(Arc::new(CallbackProgress::new(move |p| {
                    sink.lock().unwrap().push(p);
                }))),
        );
        applier.apply(&CountPixels).unwrap();

        assert_eq!(*percentages.lock().unwrap(), vec![50., 100., 100.]);
    }

    #[test]
    fn properties_are_set_once() {
        let mut applier = Applier::new(
            ApplierControls::new()
                .with_grid(grid([2, 4]))
                .with_block_shape(GridShape2D::new([2, 2]).unwrap()),
        );
        applier.add_output("out", OutputRaster::new("/vsimem/applier_test_properties.bsq"));

        applier
            .apply(&|context: &mut BlockContext<'_>| {
                let output = context.output("out")?;
                output.set_no_data_value(Some(0.))?;
                output.set_band_description(0, &format!("written by block {}", context.index()))?;
                output.set_metadata_item("wavelength units", "Nanometers", ENVI_DOMAIN)?;
                output.set_array(context.full(1., 1, RasterDataType::U8, false))
            })
            .unwrap();

        let dataset = mem::open(Path::new("/vsimem/applier_test_properties.bsq")).unwrap();
        assert_eq!(dataset.no_data_value(0), Some(0.));
        assert_eq!(
            dataset.properties().bands[0].description.as_deref(),
            Some("written by block 0")
        );
        assert_eq!(
            dataset.metadata().item("wavelength units", ENVI_DOMAIN),
            Some(&MetadataValue::from("Nanometers"))
        );

        mem::remove(Path::new("/vsimem/applier_test_properties.bsq"));
    }

    #[test]
    fn input_groups_fractions_and_samples() {
        let mut group = InputRasterGroup::new();
        group.set_raster(
            "2020/values",
            create_input("/vsimem/applier_test_group_values.bsq", [2, 2]),
        );
        let mut applier = Applier::new(
            ApplierControls::new().with_block_shape(GridShape2D::new([1, 2]).unwrap()),
        );
        applier.add_input_group("stack", group);

        let results = applier
            .apply(&|context: &mut BlockContext<'_>| -> Result<(Vec<String>, Array3<f32>, TypedArray3)> {
                let keys: Vec<String> = context
                    .input_group("stack")?
                    .flat_rasters()
                    .into_iter()
                    .map(|(key, _)| key)
                    .collect();
                let fractions = context.input_fraction("stack/2020/values", &[0., 3.], 0)?;
                let sample = context.input_sample("stack/2020/values", &array![[false, true]])?;
                Ok((keys, fractions, sample))
            })
            .unwrap()
            .completed()
            .unwrap();

        assert_eq!(results[0].0, vec!["2020/values"]);
        assert_eq!(results[0].1, array![[[1_f32, 0.]], [[0., 0.]]]);
        assert_eq!(results[1].1, array![[[0_f32, 0.]], [[0., 1.]]]);
        assert_eq!(results[0].2, TypedArray3::from(array![[[1_u16]]]));
        assert_eq!(results[1].2, TypedArray3::from(array![[[3_u16]]]));

        let result = applier.apply(&|context: &mut BlockContext<'_>| {
            context.input_group("missing").map(|_| ())
        });
        assert!(matches!(
            result,
            Err(error::Error::BlockOperator { ref source, .. })
                if matches!(**source, error::Error::UnknownInput { .. })
        ));

        mem::remove(Path::new("/vsimem/applier_test_group_values.bsq"));
    }

    #[test]
    fn dataset_metadata_and_category_colors() {
        let path = Path::new("/vsimem/applier_test_categories.bsq");
        let mut applier = Applier::new(ApplierControls::new().with_grid(grid([1, 2])));
        applier.add_output("out", OutputRaster::new(path));

        let mut metadata = MetadataDomains::new();
        metadata.set_item("wavelength", vec![450.].into(), ENVI_DOMAIN);
        metadata.set_item("fwhm", vec![10.].into(), ENVI_DOMAIN);

        applier
            .apply(&|context: &mut BlockContext<'_>| {
                let output = context.output("out")?;
                output.set_metadata_domains(&metadata)?;
                output.set_category_names(0, vec!["none".to_string(), "water".to_string()])?;
                output.set_category_colors(0, vec![[0, 0, 0], [0, 0, 255]])?;
                output.set_array(context.full(1., 1, RasterDataType::U8, false))
            })
            .unwrap();

        let dataset = mem::open(path).unwrap();
        assert_eq!(
            dataset.metadata().item("fwhm", ENVI_DOMAIN),
            Some(&MetadataValue::from(vec![10.]))
        );
        assert_eq!(
            dataset.properties().bands[0].category_colors,
            Some(vec![[0, 0, 0], [0, 0, 255]])
        );

        mem::remove(path);
    }

    #[test]
    fn unknown_names() {
        let applier = Applier::new(ApplierControls::new().with_grid(grid([1, 1])));

        let result = applier.apply(&|context: &mut BlockContext<'_>| context.input("missing"));

        assert!(matches!(
            result,
            Err(error::Error::BlockOperator { block_index: 0, ref source })
                if matches!(**source, error::Error::UnknownInput { .. })
        ));

        let result = applier.apply(&|context: &mut BlockContext<'_>| {
            context.output("missing").map(|_| ())
        });
        assert!(matches!(
            result,
            Err(error::Error::BlockOperator { ref source, .. })
                if matches!(**source, error::Error::UnknownOutput { .. })
        ));
    }

    #[test]
    fn wrong_array_shapes_fail_early() {
        let mut applier = Applier::new(
            ApplierControls::new()
                .with_grid(grid([4, 4]))
                .with_block_shape(GridShape2D::new([2, 2]).unwrap()),
        );
        applier.add_output("out", OutputRaster::new("/vsimem/applier_test_shape.bsq"));

        let result = applier.apply(&|context: &mut BlockContext<'_>| {
            context
                .output("out")?
                .set_array(context.full(0., 1, RasterDataType::U8, true))
        });
        assert!(result.is_ok());

        let result = applier.apply(&|context: &mut BlockContext<'_>| {
            context
                .output("out")?
                .set_array(array![[[1_u8, 2, 3]]])
        });
        assert!(matches!(
            result,
            Err(error::Error::BlockOperator { block_index: 0, ref source })
                if matches!(**source, error::Error::WindowShapeMismatch { .. })
        ));

        mem::remove(Path::new("/vsimem/applier_test_shape.bsq"));
    }

    #[test]
    fn skips_existing_outputs_without_overwrite() {
        let path = "/vsimem/applier_test_skip.bsq";
        let mut applier = Applier::new(ApplierControls::new().with_grid(grid([1, 1])));
        applier.add_output("out", OutputRaster::new(path));

        let write = |context: &mut BlockContext<'_>| {
            context
                .output("out")?
                .set_array(context.full(1., 1, RasterDataType::U8, false))
        };

        assert!(!applier.apply(&write).unwrap().is_skipped());

        applier.controls_mut().overwrite = false;
        assert!(applier.apply(&write).unwrap().is_skipped());

        mem::remove(Path::new(path));
    }

    #[test]
    fn external_abort() {
        let controls = ApplierControls::new()
            .with_grid(grid([4, 4]))
            .with_block_shape(GridShape2D::new([1, 4]).unwrap());
        let abort = controls.abort.clone();
        let applier = Applier::new(controls);

        let result = applier.apply(&|context: &mut BlockContext<'_>| -> Result<()> {
            if context.index() == 1 {
                abort.abort();
            }
            Ok(())
        });

        assert!(matches!(result, Err(error::Error::Aborted)));
    }

    #[test]
    fn replaces_named_entries() {
        let mut applier = Applier::default();
        applier
            .add_output("out", OutputRaster::new("a.bsq"))
            .add_output("out", OutputRaster::new("b.tif"));

        let outputs: Vec<_> = applier.outputs().collect();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].1.driver, RasterDriver::GTiff);
        assert_eq!(outputs[0].1.filename, PathBuf::from("b.tif"));
    }
}
