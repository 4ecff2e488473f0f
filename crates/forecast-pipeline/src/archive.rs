//! Remote archive access.
//!
//! The NOMADS `filter_gfs_0p25.pl` CGI serves both the run listings and the
//! subregion-filtered GRIB2 files. [`ArchiveClient`] is the seam between the
//! pipeline and HTTP so acquisition and catalog logic can be tested against
//! an in-memory archive.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::error::{PipelineError, Result};
use crate::types::{ForecastHorizon, ForecastRun, GeographicExtent};

/// Failure of a single archive request.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Connection refused, DNS failure, timeout, broken stream.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    /// Writing the response locally failed.
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Archive endpoint and HTTP client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Filter CGI URL; also serves the run listings.
    #[serde(default = "default_filter_url")]
    pub filter_url: String,

    /// Value of the `dir` parameter; `{date}` and `{hour}` are substituted.
    #[serde(default = "default_dir_template")]
    pub dir_template: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_filter_url() -> String {
    "https://nomads.ncep.noaa.gov/cgi-bin/filter_gfs_0p25.pl".to_string()
}

fn default_dir_template() -> String {
    "/gfs.{date}/{hour}/atmos".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    600
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            filter_url: default_filter_url(),
            dir_template: default_dir_template(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ArchiveConfig {
    /// URL of the subregion-filtered file for one run and horizon.
    pub fn subregion_url(
        &self,
        run: &ForecastRun,
        horizon: ForecastHorizon,
        extent: &GeographicExtent,
    ) -> Result<String> {
        let dir = self
            .dir_template
            .replace("{date}", &run.date_compact())
            .replace("{hour}", &run.hour.to_string());

        let url = Url::parse_with_params(
            &self.filter_url,
            &[
                ("file", format!("gfs.t{}z.pgrb2.0p25.f{}", run.hour, horizon.padded())),
                ("all_lev", "on".to_string()),
                ("all_var", "on".to_string()),
                ("subregion", String::new()),
                ("leftlon", extent.west.to_string()),
                ("rightlon", extent.east.to_string()),
                ("toplat", extent.north.to_string()),
                ("bottomlat", extent.south.to_string()),
                ("dir", dir),
            ],
        )
        .map_err(|e| PipelineError::config(format!("invalid filter URL '{}': {}", self.filter_url, e)))?;

        Ok(url.to_string())
    }

    /// Top-level listing of run dates.
    pub fn listing_url(&self) -> String {
        self.filter_url.clone()
    }

    /// Listing of the cycle directories of one date.
    pub fn date_listing_url(&self, date_compact: &str) -> Result<String> {
        let url = Url::parse_with_params(&self.filter_url, &[("dir", format!("/gfs.{}", date_compact))])
            .map_err(|e| PipelineError::config(format!("invalid filter URL '{}': {}", self.filter_url, e)))?;
        Ok(url.to_string())
    }
}

/// Source of listings and files.
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// GET a text document.
    async fn get_text(&self, url: &str) -> std::result::Result<String, ArchiveError>;

    /// GET `url` and stream the body into `dest` (created or truncated).
    /// Returns the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> std::result::Result<u64, ArchiveError>;
}

/// [`ArchiveClient`] over HTTP.
pub struct HttpArchive {
    client: Client,
}

impl HttpArchive {
    pub fn new(config: &ArchiveConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| PipelineError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

fn transport(err: reqwest::Error) -> ArchiveError {
    ArchiveError::Transport(err.to_string())
}

#[async_trait]
impl ArchiveClient for HttpArchive {
    #[instrument(skip(self))]
    async fn get_text(&self, url: &str) -> std::result::Result<String, ArchiveError> {
        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Status(status.as_u16()));
        }
        response.text().await.map_err(transport)
    }

    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    async fn download(&self, url: &str, dest: &Path) -> std::result::Result<u64, ArchiveError> {
        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Status(status.as_u16()));
        }

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        debug!(bytes = written, "Transfer finished");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subregion_url() {
        let config = ArchiveConfig::default();
        let run = ForecastRun::parse("20240301", 6).unwrap();
        let url = config
            .subregion_url(&run, ForecastHorizon::new(3).unwrap(), &GeographicExtent::default())
            .unwrap();

        assert!(url.starts_with("https://nomads.ncep.noaa.gov/cgi-bin/filter_gfs_0p25.pl?"));
        assert!(url.contains("file=gfs.t06z.pgrb2.0p25.f003"));
        assert!(url.contains("all_lev=on&all_var=on&subregion=&"));
        assert!(url.contains("leftlon=13&rightlon=25&toplat=56&bottomlat=48"));
        assert!(url.contains("dir=%2Fgfs.20240301%2F06%2Fatmos"));
    }

    #[test]
    fn test_dir_template_without_atmos() {
        let config = ArchiveConfig {
            dir_template: "/gfs.{date}/{hour}".to_string(),
            ..Default::default()
        };
        let run = ForecastRun::parse("20200815", 12).unwrap();
        let url = config
            .subregion_url(&run, ForecastHorizon::ANALYSIS, &GeographicExtent::default())
            .unwrap();
        assert!(url.ends_with("dir=%2Fgfs.20200815%2F12"));
    }

    #[test]
    fn test_fractional_extent_is_kept() {
        let config = ArchiveConfig::default();
        let run = ForecastRun::parse("20240301", 0).unwrap();
        let extent = GeographicExtent::new(13.5, 25.25, 56.0, -1.5).unwrap();
        let url = config
            .subregion_url(&run, ForecastHorizon::ANALYSIS, &extent)
            .unwrap();
        assert!(url.contains("leftlon=13.5&rightlon=25.25&toplat=56&bottomlat=-1.5"));
    }

    #[test]
    fn test_date_listing_url() {
        let config = ArchiveConfig::default();
        assert_eq!(
            config.date_listing_url("20240301").unwrap(),
            "https://nomads.ncep.noaa.gov/cgi-bin/filter_gfs_0p25.pl?dir=%2Fgfs.20240301"
        );
    }

    #[test]
    fn test_invalid_filter_url() {
        let config = ArchiveConfig {
            filter_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.date_listing_url("20240301"),
            Err(PipelineError::Config(_))
        ));
    }
}
