mod queue;
mod state;
mod task;

pub use self::queue::WriterQueue;
pub use self::state::WriterState;
pub use self::task::{BandMethod, DatasetMethod, WriterTask};

use crate::error;
use crate::util::Result;
use snafu::ensure;
use std::ops::ControlFlow;
use tracing::trace;

/// Executes writer tasks against the datasets it owns
#[derive(Debug, Default)]
pub struct Writer {
    state: WriterState,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &WriterState {
        &self.state
    }

    /// Handles a single task, breaks on [`WriterTask::Shutdown`]
    pub fn handle_task(&mut self, task: WriterTask) -> Result<ControlFlow<()>> {
        trace!(task = task.kind(), filename = ?task.filename(), "handling writer task");

        match task {
            WriterTask::WriteArray {
                filename,
                array,
                window,
                grid,
                driver,
                creation_options,
            } => {
                self.state
                    .get_or_create(
                        &filename,
                        &grid,
                        driver,
                        &creation_options,
                        array.data_type(),
                        array.band_count(),
                    )?
                    .write_window(window, &array)?;
            }
            WriterTask::WriteBandArray {
                filename,
                array,
                band_index,
                band_count,
                window,
                grid,
                driver,
                creation_options,
            } => {
                ensure!(
                    array.band_count() == 1,
                    error::BandCountMismatch {
                        filename,
                        expected: 1_usize,
                        found: array.band_count(),
                    }
                );
                self.state
                    .get_or_create(
                        &filename,
                        &grid,
                        driver,
                        &creation_options,
                        array.data_type(),
                        band_count,
                    )?
                    .write_band_window(band_index, window, &array)?;
            }
            WriterTask::CallDatasetMethod { filename, method } => {
                self.state.call_dataset_method(&filename, method)?;
            }
            WriterTask::CallBandMethod {
                filename,
                band_index,
                method,
            } => {
                self.state.call_band_method(&filename, band_index, method)?;
            }
            WriterTask::CloseAll { write_envi_header } => {
                self.state.close_all(write_envi_header)?;
            }
            WriterTask::Shutdown => return Ok(ControlFlow::Break(())),
        }

        Ok(ControlFlow::Continue(()))
    }
}
