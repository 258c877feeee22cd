use std::fmt::Debug;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

use crate::util::safe_lock_mutex;

/// A way to supply status updates of a running job.
///
/// Percentages are numbers between `0.0` and `100.0`.
pub trait ProgressReporter: Send + Sync + Debug {
    fn set_text(&self, text: &str);

    fn set_percentage(&self, percentage: f64);
}

/// Logs progress through `tracing`, at most one percentage line per `step` percent
#[derive(Debug)]
pub struct LogProgress {
    step: f64,
    last: Mutex<Option<f64>>,
}

impl LogProgress {
    pub fn new(step: f64) -> Self {
        Self {
            step: step.max(0.),
            last: Mutex::new(None),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(10.)
    }
}

impl ProgressReporter for LogProgress {
    fn set_text(&self, text: &str) {
        info!("{text}");
    }

    fn set_percentage(&self, percentage: f64) {
        let percentage = percentage.clamp(0., 100.);
        let mut last = safe_lock_mutex(&self.last);

        let due = match *last {
            None => true,
            Some(last) => percentage >= 100. || percentage - last >= self.step || percentage < last,
        };

        if due {
            *last = Some(percentage);
            info!(percentage, "{percentage:.0}%");
        }
    }
}

/// Discards all progress
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn set_text(&self, _text: &str) {}

    fn set_percentage(&self, _percentage: f64) {}
}

/// Forwards percentages to a function, texts are logged
pub struct CallbackProgress<F> {
    callback: F,
}

impl<F> CallbackProgress<F>
where
    F: Fn(f64) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> Debug for CallbackProgress<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackProgress").finish_non_exhaustive()
    }
}

impl<F> ProgressReporter for CallbackProgress<F>
where
    F: Fn(f64) + Send + Sync,
{
    fn set_text(&self, text: &str) {
        info!("{text}");
    }

    fn set_percentage(&self, percentage: f64) {
        (self.callback)(percentage.clamp(0., 100.));
    }
}

/// Formats a duration as `{seconds} sec | {minutes} min | {hours} hours`
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs_f64();
    format!(
        "{:.1} sec | {:.2} min | {:.3} hours",
        seconds,
        seconds / 60.,
        seconds / 3600.
    )
}
