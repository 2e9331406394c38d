//! Command Line Interface (CLI) arguments.

use crate::analysis::DEFAULT_THRESHOLD;
use crate::grid::DEFAULT_PADDING_CELLS;
use crate::time_axis;

use clap::Parser;
use time::Date;
use url::Url;

/// Parse a time origin date argument.
fn parse_time_origin(value: &str) -> Result<Date, String> {
    time_axis::parse_origin(value).map_err(|err| format!("expected YYYY-MM-DD: {}", err))
}

/// Parse an inclusion threshold argument.
fn parse_threshold(value: &str) -> Result<f64, String> {
    let threshold: f64 = value.parse().map_err(|err| format!("{}", err))?;
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err("threshold must be between 0 and 1".to_string())
    }
}

/// Aquifer anomaly server command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// The IP address on which the server should listen
    #[arg(long, default_value = "0.0.0.0", env = "AQUIFER_ANOMALY_HOST")]
    pub host: String,
    /// The port to which the server should bind
    #[arg(long, default_value_t = 8080, env = "AQUIFER_ANOMALY_PORT")]
    pub port: u16,
    /// Flag indicating whether HTTPS should be used
    #[arg(long, default_value_t = false, env = "AQUIFER_ANOMALY_HTTPS")]
    pub https: bool,
    /// Path to the certificate file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/aquifer-anomaly/certs/cert.pem",
        env = "AQUIFER_ANOMALY_CERT_FILE"
    )]
    pub cert_file: String,
    /// Path to the key file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/aquifer-anomaly/certs/key.pem",
        env = "AQUIFER_ANOMALY_KEY_FILE"
    )]
    pub key_file: String,
    /// Maximum time in seconds to wait for operations to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "AQUIFER_ANOMALY_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Whether to enable sending traces to Jaeger.
    #[arg(long, default_value_t = false, env = "AQUIFER_ANOMALY_ENABLE_JAEGER")]
    pub enable_jaeger: bool,
    /// Whether to use Rayon for execution of CPU-bound tasks.
    #[arg(long, default_value_t = false, env = "AQUIFER_ANOMALY_USE_RAYON")]
    pub use_rayon: bool,
    /// URL of the Zarr v3 groundwater dataset
    #[arg(
        long,
        default_value = "https://d2grb3c773p1iz.cloudfront.net/groundwater/grace025gwanomaly.zarr",
        env = "AQUIFER_ANOMALY_DATASET_URL"
    )]
    pub dataset_url: Url,
    /// Date of day zero on the dataset's time axis
    #[arg(
        long,
        default_value = time_axis::DEFAULT_TIME_ORIGIN,
        value_parser = parse_time_origin,
        env = "AQUIFER_ANOMALY_TIME_ORIGIN"
    )]
    pub time_origin: Date,
    /// Path to a GeoJSON FeatureCollection of aquifer boundaries
    #[arg(long, env = "AQUIFER_ANOMALY_BOUNDARIES_PATH")]
    pub boundaries_path: Option<String>,
    /// Whether to persist coordinate axes in a disk cache
    #[arg(long, default_value_t = false, env = "AQUIFER_ANOMALY_USE_COORD_CACHE")]
    pub use_coord_cache: bool,
    /// Path to the coordinate cache directory
    #[arg(
        long,
        default_value = "~/.cache/aquifer-anomaly",
        env = "AQUIFER_ANOMALY_COORD_CACHE_PATH"
    )]
    pub coord_cache_path: String,
    /// Minimum fraction of a cell's area inside the region for it to be included
    #[arg(
        long,
        default_value_t = DEFAULT_THRESHOLD,
        value_parser = parse_threshold,
        env = "AQUIFER_ANOMALY_DEFAULT_THRESHOLD"
    )]
    pub default_threshold: f64,
    /// Padding of the analysis window around the region, in cells
    #[arg(long, default_value_t = DEFAULT_PADDING_CELLS, env = "AQUIFER_ANOMALY_PADDING_CELLS")]
    pub padding_cells: f64,
    /// Maximum number of simultaneous outgoing HTTP connections
    #[arg(long, env = "AQUIFER_ANOMALY_CONNECTION_LIMIT")]
    pub connection_limit: Option<usize>,
    /// Maximum number of concurrent CPU-bound tasks
    #[arg(long, env = "AQUIFER_ANOMALY_THREAD_LIMIT")]
    pub thread_limit: Option<usize>,
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
