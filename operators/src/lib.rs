pub mod applier;
pub mod controls;
pub mod error;
pub mod io;
pub mod progress;
pub mod source;
pub mod util;
pub mod writer;

pub use applier::{Applier, ApplyOutcome, BlockContext, BlockOperator, OutputHandle, OutputRaster};
pub use controls::{AbortHandle, ApplierControls, AutoExtent, AutoResolution, Workers};
pub use source::{InputRaster, InputRasterGroup};
