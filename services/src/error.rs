use snafu::Snafu;
use strum::IntoStaticStr;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu, IntoStaticStr)]
#[snafu(visibility(pub(crate)))]
#[snafu(context(suffix(false)))] // disables default `Snafu` suffix
pub enum Error {
    #[snafu(display("Invalid configuration: {source}"))]
    Config { source: config::ConfigError },

    #[snafu(display("Unable to load the settings: {reason}"))]
    ConfigInit { reason: String },

    #[snafu(display("The settings are locked by a panicked thread"))]
    ConfigLockFailed,

    #[snafu(display("Unable to determine the working directory: {source}"))]
    MissingWorkingDirectory { source: std::io::Error },

    #[snafu(display("{source}"))]
    Operator {
        source: applier_operators::error::Error,
    },

    #[snafu(display("{source}"))]
    DataType {
        source: applier_datatypes::error::Error,
    },

    #[snafu(display("Invalid log spec `{log_spec}`: {source}"))]
    Logging {
        log_spec: String,
        source: tracing_subscriber::filter::ParseError,
    },

    #[snafu(display("Unable to install the log subscriber: {reason}"))]
    LoggingInit { reason: String },

    #[snafu(display("Unable to serialize the output: {source}"))]
    SerdeJson { source: serde_json::Error },
}

impl From<applier_operators::error::Error> for Error {
    fn from(e: applier_operators::error::Error) -> Self {
        Self::Operator { source: e }
    }
}

impl From<applier_datatypes::error::Error> for Error {
    fn from(e: applier_datatypes::error::Error) -> Self {
        Self::DataType { source: e }
    }
}
