//! GFS subregion fetcher.
//!
//! One invocation does one thing and exits; scheduling is left to cron or
//! a supervisor:
//! - `latest`: print the newest published run
//! - `fetch`: download a run's horizons into the cache
//! - `extract`: decode, upsample and smooth one variable
//! - `bands`: list the bands of a GRIB2 file
//! - `status`: list the cached horizons of a run

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "gfs-fetcher")]
#[command(about = "GFS 0.25° subregion fetcher and grid extractor")]
struct Args {
    /// Configuration file (YAML)
    #[arg(long, env = "GFS_CONFIG", default_value = "config/gfs.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the newest run listed by the archive
    Latest,

    /// Download horizons of a run (the newest one unless pinned)
    Fetch {
        /// Run date, YYYYMMDD
        #[arg(long, requires = "hour")]
        date: Option<String>,

        /// Run cycle hour (0, 6, 12, 18)
        #[arg(long, requires = "date")]
        hour: Option<i64>,

        /// Comma-separated horizons; defaults to the configured list
        #[arg(long, value_delimiter = ',')]
        horizons: Option<Vec<u32>>,
    },

    /// Process one variable from the cache
    Extract {
        #[arg(long)]
        date: String,

        #[arg(long)]
        hour: i64,

        /// Forecast horizon, e.g. 6 or f006
        #[arg(long)]
        horizon: String,

        /// Variable name, e.g. "Temperature 2m"
        #[arg(long)]
        variable: String,

        /// Upsampling factor; defaults to the configured one
        #[arg(long)]
        factor: Option<String>,

        /// Write the processed grid as JSON instead of printing a summary
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List every band of a GRIB2 file
    Bands {
        file: PathBuf,
    },

    /// List cached horizons of a run
    Status {
        #[arg(long)]
        date: String,

        #[arg(long)]
        hour: i64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = commands::load_config(&args.config)?;

    let result = match args.command {
        Command::Latest => commands::latest(&config).await,
        Command::Fetch {
            date,
            hour,
            horizons,
        } => commands::fetch(&config, date.zip(hour), horizons).await,
        Command::Extract {
            date,
            hour,
            horizon,
            variable,
            factor,
            output,
        } => {
            commands::extract(
                &config,
                commands::ExtractArgs {
                    date,
                    hour,
                    horizon,
                    variable,
                    factor,
                    output,
                },
            )
            .await
        }
        Command::Bands { file } => commands::bands(&file).await,
        Command::Status { date, hour } => commands::status(&config, &date, hour).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_fetch_horizon_list() {
        let args = Args::try_parse_from(["gfs-fetcher", "fetch", "--horizons", "0,3,6"]).unwrap();
        match args.command {
            Command::Fetch { horizons, date, .. } => {
                assert_eq!(horizons, Some(vec![0, 3, 6]));
                assert!(date.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_pinned_fetch_needs_both_parts() {
        assert!(Args::try_parse_from(["gfs-fetcher", "fetch", "--date", "20240301"]).is_err());
        assert!(
            Args::try_parse_from(["gfs-fetcher", "fetch", "--date", "20240301", "--hour", "6"]).is_ok()
        );
    }
}
