//! Extraction plus resampling: a grid ready for rendering.

use serde::Serialize;
use tracing::{info, instrument};

use crate::band_index::VariableSpec;
use crate::error::Result;
use crate::extract::{ExtractedField, GridGeometry, RasterExtractor, WindComponents};
use crate::grid::Grid;
use crate::resample::{resample, UpsampleFactor};
use crate::types::{ForecastHorizon, ForecastRun, GeographicExtent};

/// A processed variable. Built per request and never cached.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedGrid {
    pub run: ForecastRun,
    pub horizon: ForecastHorizon,
    pub variable: VariableSpec,
    pub extent: GeographicExtent,
    pub factor: UpsampleFactor,
    pub units: String,
    /// Native grid placement before upsampling
    pub geometry: GridGeometry,
    /// Upsampled and smoothed scalar field (wind speed for vectors)
    pub grid: Grid,
    /// Unit wind components at native resolution
    pub components: Option<WindComponents>,
}

/// Extract `variable` from the cached file and resample it by `factor`.
#[instrument(skip(extractor, extent), fields(run = %run, horizon = %horizon, factor = %factor))]
pub async fn process(
    extractor: &RasterExtractor,
    run: &ForecastRun,
    horizon: ForecastHorizon,
    variable: &str,
    extent: GeographicExtent,
    factor: UpsampleFactor,
) -> Result<ProcessedGrid> {
    let ExtractedField {
        spec,
        field,
        components,
        geometry,
        units,
        ..
    } = extractor.extract(run, horizon, variable).await?;

    let grid = resample(&field, factor);

    info!(
        variable = %spec.name,
        native_width = field.width(),
        native_height = field.height(),
        width = grid.width(),
        height = grid.height(),
        "Processed grid"
    );

    Ok(ProcessedGrid {
        run: *run,
        horizon,
        variable: spec,
        extent,
        factor,
        units,
        geometry,
        grid,
        components,
    })
}
