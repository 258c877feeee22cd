use super::{GridIdx2D, GridShape2D, PixelWindow};
use serde::{Deserialize, Serialize};

/// The number of pixels a read window extends beyond the write window on each side
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Margins {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Margins {
    pub fn uniform(margin: usize) -> Self {
        Self {
            top: margin,
            left: margin,
            bottom: margin,
            right: margin,
        }
    }

    pub fn is_symmetric(&self) -> bool {
        self.top == self.bottom && self.left == self.right && self.top == self.left
    }
}

/// Decomposes a raster of `grid_shape` pixels into processing blocks.
///
/// Each block owns a *write window*; the write windows tile the raster exactly once.
/// The *read window* is the write window expanded by `overlap` pixels on every side,
/// truncated at the raster boundary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTiling {
    grid_shape: GridShape2D,
    block_shape: GridShape2D,
    overlap: usize,
}

impl BlockTiling {
    /// Block shapes exceeding the grid are clamped to the grid shape
    pub fn new(grid_shape: GridShape2D, block_shape: GridShape2D, overlap: usize) -> Self {
        Self {
            grid_shape,
            block_shape: GridShape2D::new_unchecked([
                block_shape.axis_size_y().clamp(1, grid_shape.axis_size_y().max(1)),
                block_shape.axis_size_x().clamp(1, grid_shape.axis_size_x().max(1)),
            ]),
            overlap,
        }
    }

    pub fn grid_shape(&self) -> GridShape2D {
        self.grid_shape
    }

    pub fn block_shape(&self) -> GridShape2D {
        self.block_shape
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn number_of_blocks_y(&self) -> usize {
        self.grid_shape
            .axis_size_y()
            .div_ceil(self.block_shape.axis_size_y())
    }

    pub fn number_of_blocks_x(&self) -> usize {
        self.grid_shape
            .axis_size_x()
            .div_ceil(self.block_shape.axis_size_x())
    }

    pub fn number_of_blocks(&self) -> usize {
        self.number_of_blocks_y() * self.number_of_blocks_x()
    }

    /// The block with the given row-major `index`
    pub fn block(&self, index: usize) -> Option<BlockInformation> {
        if index >= self.number_of_blocks() {
            return None;
        }

        let nx = self.number_of_blocks_x();
        let (iy, ix) = (index / nx, index % nx);

        let y = iy * self.block_shape.axis_size_y();
        let x = ix * self.block_shape.axis_size_x();
        let rows = self
            .block_shape
            .axis_size_y()
            .min(self.grid_shape.axis_size_y() - y);
        let columns = self
            .block_shape
            .axis_size_x()
            .min(self.grid_shape.axis_size_x() - x);

        let margins = Margins {
            top: self.overlap.min(y),
            left: self.overlap.min(x),
            bottom: self
                .overlap
                .min(self.grid_shape.axis_size_y() - y - rows),
            right: self
                .overlap
                .min(self.grid_shape.axis_size_x() - x - columns),
        };

        let write_window = PixelWindow::new(
            GridIdx2D::new([y as isize, x as isize]),
            GridShape2D::new_unchecked([rows, columns]),
        );
        let read_window = PixelWindow::new(
            GridIdx2D::new([(y - margins.top) as isize, (x - margins.left) as isize]),
            GridShape2D::new_unchecked([
                margins.top + rows + margins.bottom,
                margins.left + columns + margins.right,
            ]),
        );

        Some(BlockInformation {
            index,
            number_of_blocks: self.number_of_blocks(),
            iy,
            ix,
            number_of_blocks_y: self.number_of_blocks_y(),
            number_of_blocks_x: nx,
            write_window,
            read_window,
            margins,
        })
    }

    /// All blocks in row-major order
    pub fn blocks(&self) -> BlockIter {
        BlockIter {
            tiling: *self,
            next: 0,
        }
    }
}

/// Geometry of a single processing block
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInformation {
    pub index: usize,
    pub number_of_blocks: usize,
    pub iy: usize,
    pub ix: usize,
    pub number_of_blocks_y: usize,
    pub number_of_blocks_x: usize,
    pub write_window: PixelWindow,
    pub read_window: PixelWindow,
    /// the overlap actually applied on each side, smaller at the raster boundary
    pub margins: Margins,
}

impl BlockInformation {
    pub fn is_first_block(&self) -> bool {
        self.index == 0
    }

    pub fn is_last_block(&self) -> bool {
        self.index + 1 == self.number_of_blocks
    }

    pub fn is_last_y_block(&self) -> bool {
        self.iy + 1 == self.number_of_blocks_y
    }

    pub fn is_last_x_block(&self) -> bool {
        self.ix + 1 == self.number_of_blocks_x
    }

    /// The write window relative to the read window
    pub fn write_window_in_read_window(&self) -> PixelWindow {
        self.write_window.relative_to(&self.read_window)
    }
}

/// Iterator over the blocks of a [`BlockTiling`]
#[derive(Clone, Debug)]
pub struct BlockIter {
    tiling: BlockTiling,
    next: usize,
}

impl Iterator for BlockIter {
    type Item = BlockInformation;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.tiling.block(self.next)?;
        self.next += 1;
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.tiling.number_of_blocks().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BlockIter {}
