//! Acquisition of raw forecast files into the local cache.
//!
//! For each requested horizon, in ascending order:
//! - a valid cached file satisfies the request without touching the network
//! - an undersized cached file is deleted
//! - otherwise the subregion file is streamed to `<path>.partial`, checked
//!   against the size threshold and renamed into place
//!
//! An undersized body, a non-success status, a timeout or a connection
//! failure all mean the horizon is not available yet. The batch stops at the
//! first such horizon; the ones after it are reported as not attempted.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::archive::{ArchiveClient, ArchiveConfig, ArchiveError};
use crate::cache::{CacheLayout, CacheState};
use crate::catalog::LatestRunProvider;
use crate::error::{PipelineError, Result};
use crate::types::{ForecastHorizon, ForecastRun, GeographicExtent};

/// Validated description of what to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionRequest {
    pub run: ForecastRun,
    /// Distinct, ascending
    pub horizons: Vec<ForecastHorizon>,
    pub extent: GeographicExtent,
}

impl AcquisitionRequest {
    pub fn new(
        run: ForecastRun,
        horizons: impl IntoIterator<Item = ForecastHorizon>,
        extent: GeographicExtent,
    ) -> Self {
        let horizons: BTreeSet<ForecastHorizon> = horizons.into_iter().collect();
        Self {
            run,
            horizons: horizons.into_iter().collect(),
            extent,
        }
    }

    /// Validate raw inputs. Fails before any I/O on a malformed date, an
    /// hour outside the cycle set, an unpublished horizon or an extent that
    /// does not have exactly four components.
    pub fn parse(date: &str, hour: i64, horizons: &[u32], extent: &[f64]) -> Result<Self> {
        let run = ForecastRun::parse(date, hour)?;
        let extent = GeographicExtent::from_slice(extent)?;
        let horizons = horizons
            .iter()
            .map(|h| ForecastHorizon::new(*h))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(run, horizons, extent))
    }
}

/// What happened to one horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HorizonOutcome {
    /// A valid file was already cached.
    AlreadySatisfied { bytes: u64 },
    Downloaded { bytes: u64 },
    /// Retry later.
    NotYetPublished { reason: String },
    /// Skipped because an earlier horizon was not yet published.
    NotAttempted,
}

impl HorizonOutcome {
    /// A valid file is now in the cache.
    pub fn is_present(&self) -> bool {
        matches!(
            self,
            HorizonOutcome::AlreadySatisfied { .. } | HorizonOutcome::Downloaded { .. }
        )
    }
}

/// Per-horizon results of one acquisition batch.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionReport {
    pub run: ForecastRun,
    pub outcomes: Vec<(ForecastHorizon, HorizonOutcome)>,
}

impl AcquisitionReport {
    pub fn present(&self) -> Vec<ForecastHorizon> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_present())
            .map(|(h, _)| *h)
            .collect()
    }

    pub fn pending(&self) -> Vec<ForecastHorizon> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_present())
            .map(|(h, _)| *h)
            .collect()
    }

    /// Every requested horizon has a valid cached file.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| o.is_present())
    }

    /// At least one file was fetched by this batch.
    pub fn downloaded_any(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, o)| matches!(o, HorizonOutcome::Downloaded { .. }))
    }

    pub fn outcome(&self, horizon: ForecastHorizon) -> Option<&HorizonOutcome> {
        self.outcomes
            .iter()
            .find(|(h, _)| *h == horizon)
            .map(|(_, o)| o)
    }

    /// The retryable error for the horizon that stopped the batch.
    pub fn first_pending_error(&self) -> Option<PipelineError> {
        self.outcomes.iter().find_map(|(h, o)| match o {
            HorizonOutcome::NotYetPublished { reason } => {
                Some(PipelineError::not_yet_published(*h, reason.clone()))
            }
            _ => None,
        })
    }
}

/// Newest run and what was fetched for it.
#[derive(Debug, Clone)]
pub struct LatestFetch {
    pub run: ForecastRun,
    pub report: AcquisitionReport,
}

impl LatestFetch {
    /// True when this call brought in data that was not cached before.
    pub fn is_new_data(&self) -> bool {
        self.report.downloaded_any()
    }
}

/// Downloads subregion files into a [`CacheLayout`].
pub struct AcquisitionManager {
    client: Arc<dyn ArchiveClient>,
    archive: ArchiveConfig,
    layout: CacheLayout,
}

impl AcquisitionManager {
    pub fn new(client: Arc<dyn ArchiveClient>, archive: ArchiveConfig, layout: CacheLayout) -> Self {
        Self {
            client,
            archive,
            layout,
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Bring every requested horizon into the cache, stopping at the first
    /// one that is not yet published. Local I/O failures are returned as
    /// errors; availability problems are recorded in the report.
    #[instrument(skip(self, request), fields(run = %request.run))]
    pub async fn acquire(&self, request: &AcquisitionRequest) -> Result<AcquisitionReport> {
        let mut outcomes = Vec::with_capacity(request.horizons.len());
        let mut stopped = false;

        for &horizon in &request.horizons {
            if stopped {
                outcomes.push((horizon, HorizonOutcome::NotAttempted));
                continue;
            }

            let outcome = self
                .acquire_horizon(&request.run, horizon, &request.extent)
                .await?;

            if let HorizonOutcome::NotYetPublished { reason } = &outcome {
                warn!(
                    horizon = %horizon,
                    reason = %reason,
                    "Horizon not yet published, stopping batch"
                );
                stopped = true;
            }
            outcomes.push((horizon, outcome));
        }

        let report = AcquisitionReport {
            run: request.run,
            outcomes,
        };

        info!(
            present = report.present().len(),
            pending = report.pending().len(),
            new_data = report.downloaded_any(),
            "Acquisition finished"
        );

        Ok(report)
    }

    async fn acquire_horizon(
        &self,
        run: &ForecastRun,
        horizon: ForecastHorizon,
        extent: &GeographicExtent,
    ) -> Result<HorizonOutcome> {
        let path = self.layout.path_for(run, horizon);

        match self.layout.inspect_path(&path).await? {
            CacheState::Valid { bytes } => {
                debug!(horizon = %horizon, bytes, "Already cached");
                return Ok(HorizonOutcome::AlreadySatisfied { bytes });
            }
            CacheState::Undersized { bytes } => {
                info!(horizon = %horizon, bytes, "Removing undersized cached file");
                fs::remove_file(&path).await?;
            }
            CacheState::Missing => {}
        }

        fs::create_dir_all(self.layout.run_dir(run)).await?;

        let url = self.archive.subregion_url(run, horizon, extent)?;
        let partial = self.layout.partial_path_for(run, horizon);

        info!(horizon = %horizon, url = %url, "Requesting subregion file");

        let bytes = match self.client.download(&url, &partial).await {
            Ok(bytes) => bytes,
            Err(ArchiveError::Io(e)) => {
                remove_if_exists(&partial).await?;
                return Err(e.into());
            }
            Err(e) => {
                remove_if_exists(&partial).await?;
                return Ok(HorizonOutcome::NotYetPublished {
                    reason: e.to_string(),
                });
            }
        };

        // Trust the file on disk over the client's count
        let on_disk = fs::metadata(&partial).await.map(|m| m.len()).unwrap_or(bytes);

        match self.layout.classify(on_disk) {
            CacheState::Valid { bytes } => {
                fs::rename(&partial, &path).await?;
                info!(horizon = %horizon, bytes, "Downloaded");
                Ok(HorizonOutcome::Downloaded { bytes })
            }
            _ => {
                remove_if_exists(&partial).await?;
                Ok(HorizonOutcome::NotYetPublished {
                    reason: format!(
                        "response of {} bytes is below the {} byte minimum",
                        on_disk,
                        self.layout.min_valid_bytes()
                    ),
                })
            }
        }
    }
}

async fn remove_if_exists(path: &std::path::Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Resolve the newest run and acquire `horizons` for it.
///
/// When every horizon is already cached nothing is requested from the
/// archive and [`LatestFetch::is_new_data`] is false.
pub async fn fetch_latest(
    provider: &dyn LatestRunProvider,
    manager: &AcquisitionManager,
    horizons: &[ForecastHorizon],
    extent: GeographicExtent,
) -> Result<LatestFetch> {
    let run = provider.latest_run().await?;
    info!(run = %run, "Resolved newest run");

    let request = AcquisitionRequest::new(run, horizons.iter().copied(), extent);
    let report = manager.acquire(&request).await?;

    if report.is_complete() && !report.downloaded_any() {
        info!(run = %run, "Run already fully cached");
    }

    Ok(LatestFetch { run, report })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn horizon(h: u32) -> ForecastHorizon {
        ForecastHorizon::new(h).unwrap()
    }

    #[test]
    fn test_request_dedups_and_sorts() {
        let req = AcquisitionRequest::parse("20240301", 0, &[6, 0, 3, 6], &[13.0, 25.0, 56.0, 48.0])
            .unwrap();
        assert_eq!(req.horizons, vec![horizon(0), horizon(3), horizon(6)]);
    }

    #[test]
    fn test_request_validation() {
        let extent = [13.0, 25.0, 56.0, 48.0];
        assert!(AcquisitionRequest::parse("2024031", 0, &[0], &extent).is_err());
        assert!(AcquisitionRequest::parse("20240301", 5, &[0], &extent).is_err());
        assert!(AcquisitionRequest::parse("20240301", 0, &[4], &extent).is_err());
        assert!(AcquisitionRequest::parse("20240301", 0, &[0], &extent[..3]).is_err());
    }

    #[test]
    fn test_report_accessors() {
        let report = AcquisitionReport {
            run: ForecastRun::parse("20240301", 0).unwrap(),
            outcomes: vec![
                (horizon(0), HorizonOutcome::AlreadySatisfied { bytes: 10 }),
                (horizon(3), HorizonOutcome::Downloaded { bytes: 20 }),
                (
                    horizon(6),
                    HorizonOutcome::NotYetPublished {
                        reason: "HTTP status 404".into(),
                    },
                ),
                (horizon(9), HorizonOutcome::NotAttempted),
            ],
        };

        assert_eq!(report.present(), vec![horizon(0), horizon(3)]);
        assert_eq!(report.pending(), vec![horizon(6), horizon(9)]);
        assert!(!report.is_complete());
        assert!(report.downloaded_any());
        assert!(matches!(
            report.first_pending_error(),
            Some(PipelineError::NotYetPublished { horizon: h, .. }) if h.hours() == 6
        ));
    }
}
