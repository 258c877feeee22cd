mod group;
mod input;

pub use group::{GroupItem, InputRasterGroup, KEY_SEPARATOR};
pub use input::{ALIGNMENT_TOLERANCE, InputRaster};
