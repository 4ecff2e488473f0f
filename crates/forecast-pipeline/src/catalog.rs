//! Newest-run discovery.
//!
//! The filter CGI lists run dates as `gfs.YYYYMMDD` directory links, and
//! each date page lists its cycles as `gfs.YYYYMMDD/HH` (URL-encoded as
//! `gfs.YYYYMMDD%2FHH` in query strings). Tokens are pulled out of the HTML
//! with regular expressions and the greatest one wins.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::archive::{ArchiveClient, ArchiveConfig};
use crate::error::{PipelineError, Result};
use crate::types::{CycleHour, ForecastRun};

/// Anything that can name the newest available run.
#[async_trait]
pub trait LatestRunProvider: Send + Sync {
    async fn latest_run(&self) -> Result<ForecastRun>;
}

/// Always returns the same run.
#[derive(Debug, Clone, Copy)]
pub struct StaticRunProvider(pub ForecastRun);

#[async_trait]
impl LatestRunProvider for StaticRunProvider {
    async fn latest_run(&self) -> Result<ForecastRun> {
        Ok(self.0)
    }
}

/// What the catalog listed at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    pub fetched_at: DateTime<Utc>,
    /// All listed dates, ascending
    pub dates: Vec<NaiveDate>,
    /// Newest date that lists at least one cycle
    pub date: NaiveDate,
    /// Cycles listed for `date`, ascending
    pub hours: Vec<CycleHour>,
}

impl CatalogSnapshot {
    pub fn latest(&self) -> Option<ForecastRun> {
        self.hours
            .last()
            .map(|hour| ForecastRun::new(self.date, *hour))
    }
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"gfs\.(\d{8})").expect("date pattern is valid"))
}

fn hour_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"gfs\.(\d{8})(?:%2F|%2f|/)(\d{2})").expect("hour pattern is valid"))
}

/// Distinct valid dates named in a listing page, ascending.
pub fn parse_dates(html: &str) -> Vec<NaiveDate> {
    date_regex()
        .captures_iter(html)
        .filter_map(|c| NaiveDate::parse_from_str(&c[1], "%Y%m%d").ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct cycle hours listed for `date`, ascending.
pub fn parse_hours(html: &str, date: NaiveDate) -> Vec<CycleHour> {
    let wanted = date.format("%Y%m%d").to_string();
    hour_regex()
        .captures_iter(html)
        .filter(|c| &c[1] == wanted.as_str())
        .filter_map(|c| c[2].parse::<i64>().ok())
        .filter_map(|h| CycleHour::new(h).ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Catalog backed by the NOMADS filter listings.
pub struct NomadsCatalog {
    client: Arc<dyn ArchiveClient>,
    config: ArchiveConfig,
}

impl NomadsCatalog {
    /// Newest dates tried before giving up; a freshly created date
    /// directory may not list any cycle yet.
    const DATES_TO_TRY: usize = 2;

    pub fn new(client: Arc<dyn ArchiveClient>, config: ArchiveConfig) -> Self {
        Self { client, config }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.client
            .get_text(url)
            .await
            .map_err(|e| PipelineError::catalog_unreachable(format!("{}: {}", url, e)))
    }

    /// Read the listings and build a snapshot.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<CatalogSnapshot> {
        let listing_url = self.config.listing_url();
        let listing = self.fetch(&listing_url).await?;

        let dates = parse_dates(&listing);
        if dates.is_empty() {
            return Err(PipelineError::catalog_parse(format!(
                "no gfs.YYYYMMDD entries in listing at {}",
                listing_url
            )));
        }
        debug!(count = dates.len(), "Listed run dates");

        for date in dates.iter().rev().take(Self::DATES_TO_TRY) {
            let compact = date.format("%Y%m%d").to_string();
            let page = self.fetch(&self.config.date_listing_url(&compact)?).await?;
            let hours = parse_hours(&page, *date);

            if hours.is_empty() {
                warn!(date = %compact, "No cycles listed for date");
                continue;
            }

            return Ok(CatalogSnapshot {
                fetched_at: Utc::now(),
                dates: dates.clone(),
                date: *date,
                hours,
            });
        }

        Err(PipelineError::catalog_parse(
            "no cycle directories listed for the newest dates",
        ))
    }
}

#[async_trait]
impl LatestRunProvider for NomadsCatalog {
    async fn latest_run(&self) -> Result<ForecastRun> {
        let snapshot = self.refresh().await?;
        let run = snapshot
            .latest()
            .ok_or_else(|| PipelineError::catalog_parse("snapshot has no cycles"))?;
        info!(run = %run, "Newest run in catalog");
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP_LISTING: &str = r#"
<html><body>
<a href="https://nomads.ncep.noaa.gov/cgi-bin/filter_gfs_0p25.pl?dir=%2Fgfs.20240302">gfs.20240302</a><br>
<a href="https://nomads.ncep.noaa.gov/cgi-bin/filter_gfs_0p25.pl?dir=%2Fgfs.20240301">gfs.20240301</a><br>
<a href="https://nomads.ncep.noaa.gov/cgi-bin/filter_gfs_0p25.pl?dir=%2Fgfs.20240229">gfs.20240229</a><br>
</body></html>"#;

    const DATE_LISTING: &str = r#"
<a href="https://nomads.ncep.noaa.gov/cgi-bin/filter_gfs_0p25.pl?dir=%2Fgfs.20240302%2F06">06</a>
<a href="https://nomads.ncep.noaa.gov/cgi-bin/filter_gfs_0p25.pl?dir=%2Fgfs.20240302%2F00">00</a>
"#;

    #[test]
    fn test_parse_dates() {
        let dates = parse_dates(TOP_LISTING);
        assert_eq!(dates.len(), 3);
        assert_eq!(dates.last().unwrap().to_string(), "2024-03-02");
    }

    #[test]
    fn test_parse_dates_ignores_impossible_dates() {
        assert!(parse_dates("gfs.20241399 gfs.2024").is_empty());
    }

    #[test]
    fn test_parse_hours() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let hours: Vec<u8> = parse_hours(DATE_LISTING, date).iter().map(|h| h.value()).collect();
        assert_eq!(hours, vec![0, 6]);
    }

    #[test]
    fn test_parse_hours_plain_slash_and_other_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let html = "gfs.20240302/12 gfs.20240301/18 gfs.20240302/07";
        let hours: Vec<u8> = parse_hours(html, date).iter().map(|h| h.value()).collect();
        assert_eq!(hours, vec![12]);
    }

    #[test]
    fn test_snapshot_latest() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let snapshot = CatalogSnapshot {
            fetched_at: Utc::now(),
            dates: vec![date],
            date,
            hours: vec![CycleHour::new(0).unwrap(), CycleHour::new(6).unwrap()],
        };
        assert_eq!(snapshot.latest().unwrap().to_string(), "20240302/06z");
    }

    #[test]
    fn test_static_provider() {
        let run = ForecastRun::parse("20240301", 18).unwrap();
        let resolved = tokio_test::block_on(StaticRunProvider(run).latest_run());
        assert_eq!(tokio_test::assert_ok!(resolved), run);
    }
}
