mod copy;
mod info;
mod mean_filter;
mod options;
mod report;

pub use copy::{CopyRaster, copy};
pub use info::{Info, info};
pub use mean_filter::{MeanFilter, mean_filter};
pub use options::JobOptions;
pub use report::ErrorReport;
