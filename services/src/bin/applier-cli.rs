use applier_services::cli::{CopyRaster, ErrorReport, Info, MeanFilter, copy, info, mean_filter};
use applier_services::config::{self, get_config_element};
use applier_services::logging::init_logging;
use clap::{Parser, Subcommand};

/// Block-wise raster processing
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log filter, overrides the `logging.log_spec` setting
    #[arg(long, global = true)]
    log_spec: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Prints the properties of a raster as JSON
    Info(Info),

    /// Copies a raster block by block
    Copy(CopyRaster),

    /// Smooths a raster with a moving window mean
    MeanFilter(MeanFilter),
}

impl Commands {
    fn execute(self) -> Result<(), anyhow::Error> {
        match self {
            Commands::Info(params) => info(params),
            Commands::Copy(params) => copy(params),
            Commands::MeanFilter(params) => mean_filter(params),
        }
    }
}

fn start_logging(log_spec: Option<String>) -> Result<(), anyhow::Error> {
    let mut logging: config::Logging = get_config_element()?;
    if let Some(log_spec) = log_spec {
        logging.log_spec = log_spec;
    }
    init_logging(&logging)?;
    Ok(())
}

#[allow(clippy::print_stderr)]
fn main() {
    let cli = Cli::parse();

    let result = start_logging(cli.log_spec).and_then(|()| cli.command.execute());

    if let Err(err) = result {
        eprintln!("{}", ErrorReport::from(&err).to_json());
        std::process::exit(1);
    }
}
