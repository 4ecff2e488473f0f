//! GFS 0.25° subregion acquisition and processing.
//!
//! - [`catalog`]: find the newest published model run
//! - [`acquisition`]: download subregion files into a local cache
//! - [`extract`]: read named variables out of cached files
//! - [`resample`]: block upsampling and box smoothing
//! - [`pipeline`]: extraction and resampling in one call

pub mod acquisition;
pub mod archive;
pub mod band_dump;
pub mod band_index;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod grid;
pub mod pipeline;
pub mod resample;
pub mod types;

pub use acquisition::{
    fetch_latest, AcquisitionManager, AcquisitionReport, AcquisitionRequest, HorizonOutcome,
    LatestFetch,
};
pub use archive::{ArchiveClient, ArchiveConfig, ArchiveError, HttpArchive};
pub use band_dump::{describe_bands, scan_bands, BandDescriptor};
pub use band_index::{BandIndex, BandSelection, UnitConversion, VariableEntry, VariableSpec};
pub use cache::{CacheLayout, CacheState};
pub use catalog::{CatalogSnapshot, LatestRunProvider, NomadsCatalog, StaticRunProvider};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result, VariableMiss};
pub use extract::{wind_components, ExtractedField, GridGeometry, RasterExtractor, WindComponents};
pub use grid::{Grid, GridStats};
pub use pipeline::{process, ProcessedGrid};
pub use resample::{block_expand, box_smooth, resample, UpsampleFactor};
pub use types::{CycleHour, ForecastHorizon, ForecastRun, GeographicExtent, CYCLE_HOURS};
