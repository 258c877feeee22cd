use crate::config::Logging;
use crate::error::{self, Error, Result};
use snafu::ResultExt;
use tracing::Subscriber;
use tracing_subscriber::{EnvFilter, Layer, layer::Filter, prelude::*, registry::LookupSpan};

/// Installs the global log subscriber writing to `STDERR`.
///
/// `STDOUT` stays free for command output.
pub fn init_logging(logging: &Logging) -> Result<()> {
    let console_filter = log_filter(&logging.log_spec)?;

    tracing_subscriber::registry()
        .with(console_layer_with_filter(console_filter))
        .try_init()
        .map_err(|error| Error::LoggingInit {
            reason: error.to_string(),
        })
}

fn log_filter(log_spec: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(log_spec).context(error::Logging { log_spec })
}

fn console_layer_with_filter<S, F: Filter<S> + 'static>(filter: F) -> impl Layer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_target(true)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_filter(filter)
}
