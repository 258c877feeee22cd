use crate::error;
use crate::progress::{LogProgress, ProgressReporter};
use crate::util::Result;
use crate::util::rayon::create_rayon_thread_pool;
use crate::writer::WriterQueue;
use applier_datatypes::primitives::{BoundingBox2D, SpatialResolution};
use applier_datatypes::raster::{Grid, GridShape2D};
use applier_datatypes::spatial_reference::SpatialReference;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::{Display, EnumString};

pub const DEFAULT_BLOCK_SHAPE: [usize; 2] = [256, 256];

/// How blocks are processed
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Workers {
    /// One after another in the calling thread, in row-major block order
    #[default]
    Inline,
    /// On a pool with the given number of threads
    Threads(usize),
    /// On a pool with one thread per CPU
    AllCpus,
}

impl Workers {
    /// Zero means inline, negative counts mean all CPUs
    pub fn from_count(count: i64) -> Self {
        match count {
            0 => Self::Inline,
            n if n < 0 => Self::AllCpus,
            n => Self::Threads(n as usize),
        }
    }

    pub fn is_inline(self) -> bool {
        self == Self::Inline
    }

    /// The worker pool, `None` for inline processing
    pub fn thread_pool(self) -> Result<Option<ThreadPool>> {
        match self {
            Self::Inline => Ok(None),
            Self::Threads(n) => create_rayon_thread_pool(n.max(1), "applier-worker").map(Some),
            Self::AllCpus => create_rayon_thread_pool(0, "applier-worker").map(Some),
        }
    }
}

/// How the extent is derived from the inputs
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AutoExtent {
    Union,
    #[default]
    Intersection,
}

/// How the resolution is derived from the inputs
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AutoResolution {
    #[default]
    Minimum,
    Maximum,
    Average,
}

/// Shared flag to stop a running job.
///
/// Blocks that have not started when the flag is set are skipped.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// Settings of an [`Applier`](crate::applier::Applier) job
#[derive(Clone, Debug)]
pub struct ApplierControls {
    /// `None` processes the whole grid as a single block
    pub block_shape: Option<GridShape2D>,
    pub overlap: usize,
    pub workers: Workers,
    /// `None` writes inline for inline workers and uses one writer thread otherwise
    pub writers: Option<usize>,
    pub write_envi_header: bool,
    /// If unset, jobs whose outputs all exist already are skipped
    pub overwrite: bool,
    pub grid: Option<Grid>,
    pub spatial_reference: Option<SpatialReference>,
    pub extent: Option<BoundingBox2D>,
    pub resolution: Option<SpatialResolution>,
    pub auto_extent: AutoExtent,
    pub auto_resolution: AutoResolution,
    pub progress: Arc<dyn ProgressReporter>,
    pub abort: AbortHandle,
    /// Used in progress texts
    pub name: String,
}

impl Default for ApplierControls {
    fn default() -> Self {
        Self {
            block_shape: Some(GridShape2D::new_unchecked(DEFAULT_BLOCK_SHAPE)),
            overlap: 0,
            workers: Workers::Inline,
            writers: None,
            write_envi_header: true,
            overwrite: true,
            grid: None,
            spatial_reference: None,
            extent: None,
            resolution: None,
            auto_extent: AutoExtent::default(),
            auto_resolution: AutoResolution::default(),
            progress: Arc::new(LogProgress::default()),
            abort: AbortHandle::default(),
            name: "applier".to_string(),
        }
    }
}

impl ApplierControls {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_block_shape(mut self, block_shape: GridShape2D) -> Self {
        self.block_shape = Some(block_shape);
        self
    }

    /// Processes the whole grid as a single block
    #[must_use]
    pub fn with_full_block(mut self) -> Self {
        self.block_shape = None;
        self
    }

    #[must_use]
    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: Workers) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_writers(mut self, writers: usize) -> Self {
        self.writers = Some(writers);
        self
    }

    #[must_use]
    pub fn with_envi_header(mut self, write_envi_header: bool) -> Self {
        self.write_envi_header = write_envi_header;
        self
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn with_grid(mut self, grid: Grid) -> Self {
        self.grid = Some(grid);
        self
    }

    #[must_use]
    pub fn with_spatial_reference(mut self, spatial_reference: SpatialReference) -> Self {
        self.spatial_reference = Some(spatial_reference);
        self
    }

    #[must_use]
    pub fn with_extent(mut self, extent: BoundingBox2D) -> Self {
        self.extent = Some(extent);
        self
    }

    #[must_use]
    pub fn with_resolution(mut self, resolution: SpatialResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    #[must_use]
    pub fn with_auto_extent(mut self, auto_extent: AutoExtent) -> Self {
        self.auto_extent = auto_extent;
        self
    }

    #[must_use]
    pub fn with_auto_resolution(mut self, auto_resolution: AutoResolution) -> Self {
        self.auto_resolution = auto_resolution;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The writer queue matching the worker and writer settings
    pub fn writer_queue(&self) -> Result<WriterQueue> {
        match (self.writers, self.workers) {
            (None | Some(0), Workers::Inline) | (Some(0), _) => Ok(WriterQueue::inline()),
            (None, _) => WriterQueue::spawn(1),
            (Some(writers), _) => WriterQueue::spawn(writers),
        }
    }

    /// The processing grid: the explicit one, or derived from the grids of the inputs
    pub fn derive_grid(&self, inputs: &[Grid]) -> Result<Grid> {
        if let Some(grid) = &self.grid {
            return Ok(grid.clone());
        }

        let spatial_reference = match &self.spatial_reference {
            Some(spatial_reference) => spatial_reference.clone(),
            None => common_spatial_reference(inputs)?,
        };

        let extent = match self.extent {
            Some(extent) => extent,
            None => self.auto_extent(inputs)?,
        };

        let resolution = match self.resolution {
            Some(resolution) => resolution,
            None => self.auto_resolution(inputs)?,
        };

        Ok(Grid::from_extent_resolution(
            extent,
            resolution,
            spatial_reference,
        )?)
    }

    fn auto_extent(&self, inputs: &[Grid]) -> Result<BoundingBox2D> {
        let Some((first, rest)) = inputs.split_first() else {
            return Err(error::Error::MissingGrid);
        };

        let mut extent = first.extent();
        for grid in rest {
            extent = match self.auto_extent {
                AutoExtent::Union => extent.union(&grid.extent()),
                AutoExtent::Intersection => extent.intersection(&grid.extent()).ok_or(
                    applier_datatypes::error::Error::EmptyIntersection {
                        a: extent,
                        b: grid.extent(),
                    },
                )?,
            };
        }
        Ok(extent)
    }

    fn auto_resolution(&self, inputs: &[Grid]) -> Result<SpatialResolution> {
        ensure!(!inputs.is_empty(), error::MissingGrid);

        let xs = inputs.iter().map(|grid| grid.resolution().x);
        let ys = inputs.iter().map(|grid| grid.resolution().y);

        let (x, y) = match self.auto_resolution {
            AutoResolution::Minimum => (xs.fold(f64::INFINITY, f64::min), ys.fold(f64::INFINITY, f64::min)),
            AutoResolution::Maximum => (xs.fold(0., f64::max), ys.fold(0., f64::max)),
            AutoResolution::Average => {
                let n = inputs.len() as f64;
                (xs.sum::<f64>() / n, ys.sum::<f64>() / n)
            }
        };

        Ok(SpatialResolution::new(x, y)?)
    }
}

fn common_spatial_reference(inputs: &[Grid]) -> Result<SpatialReference> {
    let Some((first, rest)) = inputs.split_first() else {
        return Err(error::Error::MissingProjection);
    };

    let expected = first.spatial_reference();
    for grid in rest {
        ensure!(
            grid.spatial_reference() == expected,
            error::ProjectionMismatch {
                expected: expected.to_string(),
                found: grid.spatial_reference().to_string(),
            }
        );
    }
    Ok(expected.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use applier_datatypes::primitives::Coordinate2D;

    fn grid(upper_left: (f64, f64), resolution: f64, shape: [usize; 2]) -> Grid {
        Grid::new(
            upper_left.into(),
            SpatialResolution::new(resolution, resolution).unwrap(),
            GridShape2D::new(shape).unwrap(),
            SpatialReference::wgs84(),
        )
        .unwrap()
    }

    #[test]
    fn worker_counts() {
        assert_eq!(Workers::from_count(0), Workers::Inline);
        assert_eq!(Workers::from_count(3), Workers::Threads(3));
        assert_eq!(Workers::from_count(-1), Workers::AllCpus);

        assert!(Workers::Inline.thread_pool().unwrap().is_none());
        assert_eq!(
            Workers::Threads(2)
                .thread_pool()
                .unwrap()
                .unwrap()
                .current_num_threads(),
            2
        );
    }

    #[test]
    fn writer_queue_selection() {
        let controls = ApplierControls::new();
        assert!(controls.writer_queue().unwrap().is_inline());

        let controls = controls.with_workers(Workers::Threads(2));
        let queue = controls.writer_queue().unwrap();
        assert!(!queue.is_inline());
        assert_eq!(queue.writer_count(), 1);
        queue.finish(false).unwrap();

        let queue = controls.with_writers(3).writer_queue().unwrap();
        assert_eq!(queue.writer_count(), 3);
        queue.finish(false).unwrap();
    }

    #[test]
    fn abort_handles_are_shared() {
        let handle = AbortHandle::new();
        let controls = ApplierControls::new().with_abort_handle(handle.clone());

        assert!(!controls.abort.is_aborted());
        handle.abort();
        assert!(controls.abort.is_aborted());
    }

    #[test]
    fn explicit_grid_wins() {
        let explicit = grid((5., 5.), 1., [2, 2]);
        let controls = ApplierControls::new().with_grid(explicit.clone());

        assert_eq!(controls.derive_grid(&[grid((0., 0.), 3., [1, 1])]).unwrap(), explicit);
    }

    #[test]
    fn derived_intersection_at_minimum_resolution() {
        let a = grid((0., 0.), 1., [4, 4]);
        let b = grid((2., -2.), 2., [2, 2]);

        let derived = ApplierControls::new().derive_grid(&[a, b]).unwrap();

        assert_eq!(derived.upper_left(), Coordinate2D::new(2., -2.));
        assert_eq!(derived.resolution(), SpatialResolution::one());
        assert_eq!(derived.shape(), GridShape2D::new([2, 2]).unwrap());
    }

    #[test]
    fn derived_union_at_maximum_resolution() {
        let a = grid((0., 0.), 1., [4, 4]);
        let b = grid((2., -2.), 2., [2, 2]);

        let derived = ApplierControls::new()
            .with_auto_extent(AutoExtent::Union)
            .with_auto_resolution(AutoResolution::Maximum)
            .derive_grid(&[a, b])
            .unwrap();

        assert_eq!(derived.upper_left(), Coordinate2D::new(0., 0.));
        assert_eq!(derived.resolution(), SpatialResolution::new(2., 2.).unwrap());
        assert_eq!(derived.shape(), GridShape2D::new([3, 3]).unwrap());
    }

    #[test]
    fn derivation_errors() {
        let controls = ApplierControls::new();

        assert!(matches!(
            controls.derive_grid(&[]),
            Err(error::Error::MissingProjection)
        ));
        assert!(matches!(
            controls
                .clone()
                .with_spatial_reference(SpatialReference::wgs84())
                .derive_grid(&[]),
            Err(error::Error::MissingGrid)
        ));

        let other = grid((0., 0.), 1., [1, 1]).with_spatial_reference(SpatialReference::local("x"));
        assert!(matches!(
            controls.derive_grid(&[grid((0., 0.), 1., [1, 1]), other]),
            Err(error::Error::ProjectionMismatch { .. })
        ));

        assert!(matches!(
            controls.derive_grid(&[grid((0., 0.), 1., [1, 1]), grid((5., 5.), 1., [1, 1])]),
            Err(error::Error::DataType {
                source: applier_datatypes::error::Error::EmptyIntersection { .. }
            })
        ));
    }

    #[test]
    fn block_shapes() {
        assert_eq!(
            ApplierControls::new().block_shape,
            Some(GridShape2D::new([256, 256]).unwrap())
        );
        assert_eq!(ApplierControls::new().with_full_block().block_shape, None);
    }
}
