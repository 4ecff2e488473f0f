//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use forecast_pipeline::{
    fetch_latest, process, scan_bands, AcquisitionManager, AcquisitionReport, ForecastHorizon,
    ForecastRun, HorizonOutcome, HttpArchive, LatestRunProvider, NomadsCatalog, PipelineConfig,
    RasterExtractor, StaticRunProvider, UpsampleFactor,
};
use grib2_parser::Grib2Tables;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::{info, warn};

/// Exit code when some horizons are still pending.
const EXIT_PENDING: u8 = 2;

pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    PipelineConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

fn catalog(config: &PipelineConfig) -> Result<NomadsCatalog> {
    let client = Arc::new(HttpArchive::new(&config.archive)?);
    Ok(NomadsCatalog::new(client, config.archive.clone()))
}

pub async fn latest(config: &PipelineConfig) -> Result<ExitCode> {
    let run = catalog(config)?.latest_run().await?;
    println!("{}", run);
    Ok(ExitCode::SUCCESS)
}

pub async fn fetch(
    config: &PipelineConfig,
    pinned: Option<(String, i64)>,
    horizons: Option<Vec<u32>>,
) -> Result<ExitCode> {
    let horizons = match horizons {
        Some(list) => list
            .into_iter()
            .map(ForecastHorizon::new)
            .collect::<forecast_pipeline::Result<Vec<_>>>()?,
        None => config.horizons()?,
    };

    let client = Arc::new(HttpArchive::new(&config.archive)?);
    let manager = AcquisitionManager::new(client.clone(), config.archive.clone(), config.cache_layout());

    let provider: Box<dyn LatestRunProvider> = match pinned {
        Some((date, hour)) => Box::new(StaticRunProvider(ForecastRun::parse(&date, hour)?)),
        None => Box::new(NomadsCatalog::new(client, config.archive.clone())),
    };

    let fetched = fetch_latest(provider.as_ref(), &manager, &horizons, config.extent).await?;
    print_report(&fetched.report);

    if fetched.is_new_data() {
        info!(run = %fetched.run, "New data downloaded");
    } else if fetched.report.is_complete() {
        info!(run = %fetched.run, "Data is already downloaded");
    }

    if fetched.report.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        if let Some(err) = fetched.report.first_pending_error() {
            warn!(error = %err, pending = fetched.report.pending().len(), "Run incomplete, retry later");
        }
        Ok(ExitCode::from(EXIT_PENDING))
    }
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Horizon")]
    horizon: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

fn print_report(report: &AcquisitionReport) {
    let rows: Vec<OutcomeRow> = report
        .outcomes
        .iter()
        .map(|(horizon, outcome)| {
            let (status, detail) = match outcome {
                HorizonOutcome::AlreadySatisfied { bytes } => ("cached", format!("{} bytes", bytes)),
                HorizonOutcome::Downloaded { bytes } => ("downloaded", format!("{} bytes", bytes)),
                HorizonOutcome::NotYetPublished { reason } => ("pending", reason.clone()),
                HorizonOutcome::NotAttempted => ("not attempted", String::new()),
            };
            OutcomeRow {
                horizon: horizon.to_string(),
                status: status.to_string(),
                detail,
            }
        })
        .collect();

    println!("Run {}", report.run);
    println!("{}", Table::new(rows).with(Style::blank()));
}

pub struct ExtractArgs {
    pub date: String,
    pub hour: i64,
    pub horizon: String,
    pub variable: String,
    pub factor: Option<String>,
    pub output: Option<PathBuf>,
}

pub async fn extract(config: &PipelineConfig, args: ExtractArgs) -> Result<ExitCode> {
    // Validate everything before touching the cache
    let run = ForecastRun::parse(&args.date, args.hour)?;
    let horizon: ForecastHorizon = args.horizon.parse()?;
    let factor = match &args.factor {
        Some(f) => f.parse::<UpsampleFactor>()?,
        None => config.upsample_factor()?,
    };

    let extractor = RasterExtractor::new(
        config.cache_layout(),
        Arc::new(config.band_index()),
        Arc::new(Grib2Tables::ncep()),
    );

    let processed = process(&extractor, &run, horizon, &args.variable, config.extent, factor).await?;

    match args.output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            serde_json::to_writer(std::io::BufWriter::new(file), &processed)?;
            info!(path = %path.display(), "Wrote processed grid");
        }
        None => {
            println!("{} {} {}", run, horizon, processed.variable.name);
            println!(
                "grid {}x{} (factor {}), units {}",
                processed.grid.width(),
                processed.grid.height(),
                processed.factor,
                processed.units
            );
            match processed.grid.stats() {
                Some(s) => println!("min {:.2}  max {:.2}  mean {:.2}", s.min, s.max, s.mean),
                None => println!("no valid values"),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[derive(Tabled)]
struct BandRow {
    #[tabled(rename = "Band")]
    band: usize,
    #[tabled(rename = "Comment")]
    comment: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub async fn bands(file: &Path) -> Result<ExitCode> {
    let bands = scan_bands(file, Arc::new(Grib2Tables::ncep()))
        .await
        .with_context(|| format!("Failed to scan {}", file.display()))?;

    let rows: Vec<BandRow> = bands
        .into_iter()
        .map(|b| BandRow {
            band: b.band,
            comment: b.comment,
            description: b.description,
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::blank()));
    Ok(ExitCode::SUCCESS)
}

pub async fn status(config: &PipelineConfig, date: &str, hour: i64) -> Result<ExitCode> {
    let run = ForecastRun::parse(date, hour)?;
    let layout = config.cache_layout();
    let cached = layout.cached_horizons(&run).await?;

    println!("Run {} in {}", run, layout.run_dir(&run).display());
    if cached.is_empty() {
        println!("nothing cached");
    }
    for (horizon, bytes) in &cached {
        println!("  {}  {} bytes", horizon, bytes);
    }

    let expected = config.horizons()?;
    let missing = expected
        .iter()
        .filter(|h| !cached.iter().any(|(c, _)| c == *h))
        .count();
    println!("{} of {} configured horizons cached", expected.len() - missing, expected.len());

    Ok(ExitCode::SUCCESS)
}
