//! Variable extraction from cached GRIB2 files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use grib2_parser::{Grib2Message, Grib2Reader, Grib2Tables};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, instrument};

use crate::band_index::{BandIndex, BandSelection, VariableSpec};
use crate::cache::CacheLayout;
use crate::error::{PipelineError, Result};
use crate::grid::Grid;
use crate::types::{ForecastHorizon, ForecastRun};

/// Where a decoded grid sits on the globe. Longitudes are in -180..180.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridGeometry {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
    pub lat_step: f64,
    pub lon_step: f64,
}

impl GridGeometry {
    fn from_message(msg: &Grib2Message) -> Self {
        let g = &msg.grid_definition;
        let wrap = |lon: f64| if lon > 180.0 { lon - 360.0 } else { lon };
        let (west, east) = if g.scan_mode.i_negative {
            (g.last_longitude, g.first_longitude)
        } else {
            (g.first_longitude, g.last_longitude)
        };
        Self {
            north: g.first_latitude.max(g.last_latitude),
            south: g.first_latitude.min(g.last_latitude),
            west: wrap(west),
            east: wrap(east),
            lat_step: g.latitude_increment,
            lon_step: g.longitude_increment,
        }
    }
}

/// Unit-length wind direction components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindComponents {
    pub u: Grid,
    pub v: Grid,
}

/// One variable read from one file, at native resolution.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedField {
    pub spec: VariableSpec,
    /// Scalar values, or wind speed for vector variables
    pub field: Grid,
    pub components: Option<WindComponents>,
    pub geometry: GridGeometry,
    pub units: String,
    /// Parameter/level of each band read, e.g. `TMP @ 2 m above ground`
    pub sources: Vec<String>,
}

/// Reads named variables out of the raw cache.
pub struct RasterExtractor {
    layout: CacheLayout,
    index: Arc<BandIndex>,
    tables: Arc<Grib2Tables>,
}

impl RasterExtractor {
    pub fn new(layout: CacheLayout, index: Arc<BandIndex>, tables: Arc<Grib2Tables>) -> Self {
        Self {
            layout,
            index,
            tables,
        }
    }

    pub fn index(&self) -> &BandIndex {
        &self.index
    }

    /// Extract `variable` for a cached run/horizon.
    #[instrument(skip(self), fields(run = %run, horizon = %horizon))]
    pub async fn extract(
        &self,
        run: &ForecastRun,
        horizon: ForecastHorizon,
        variable: &str,
    ) -> Result<ExtractedField> {
        let spec = self.index.bands_for(variable, horizon.is_analysis())?;
        let path = self.layout.path_for(run, horizon);

        if !self.layout.inspect_path(&path).await?.is_valid() {
            return Err(PipelineError::CacheMiss(path));
        }

        self.extract_from_path(&path, &spec).await
    }

    /// Extract an explicit band selection from any GRIB2 file.
    pub async fn extract_from_path(&self, path: &Path, spec: &VariableSpec) -> Result<ExtractedField> {
        let data = read_file(path).await?;
        debug!(path = %path.display(), bytes = data.len(), bands = ?spec.bands, "Decoding");

        match spec.bands {
            BandSelection::Scalar(band) => {
                let (grid, msg) = self.read_band(&data, band)?;
                let field = grid.map(|v| spec.conversion.apply(v));
                Ok(ExtractedField {
                    spec: spec.clone(),
                    field,
                    components: None,
                    geometry: GridGeometry::from_message(&msg),
                    units: self.units_of(&msg, spec),
                    sources: vec![describe(&msg)],
                })
            }
            BandSelection::Vector(u_band, v_band) => {
                let (u, u_msg) = self.read_band(&data, u_band)?;
                let (v, v_msg) = self.read_band(&data, v_band)?;
                let u = u.map(|x| spec.conversion.apply(x));
                let v = v.map(|x| spec.conversion.apply(x));
                let (speed, components) = wind_components(&u, &v)?;
                Ok(ExtractedField {
                    spec: spec.clone(),
                    field: speed,
                    components: Some(components),
                    geometry: GridGeometry::from_message(&u_msg),
                    units: self.units_of(&u_msg, spec),
                    sources: vec![describe(&u_msg), describe(&v_msg)],
                })
            }
        }
    }

    fn read_band(&self, data: &Bytes, band: u32) -> Result<(Grid, Grib2Message)> {
        let mut reader = Grib2Reader::new(data.clone(), self.tables.clone());
        let msg = match reader.message_at(band as usize)? {
            Some(msg) => msg,
            None => {
                let count = Grib2Reader::new(data.clone(), self.tables.clone()).count_messages()?;
                return Err(PipelineError::raster(format!(
                    "band {} requested but the file has {} bands",
                    band, count
                )));
            }
        };

        let (values, width, height) = msg.unpack_grid()?;
        Ok((Grid::new(values, width, height)?, msg))
    }

    fn units_of(&self, msg: &Grib2Message, spec: &VariableSpec) -> String {
        let source = self
            .tables
            .get_parameter(
                msg.indicator.discipline,
                msg.product_definition.parameter_category,
                msg.product_definition.parameter_number,
            )
            .map(|info| info.units.as_str())
            .unwrap_or("");
        spec.conversion.output_units(source).to_string()
    }
}

async fn read_file(path: &Path) -> Result<Bytes> {
    match fs::read(path).await {
        Ok(data) => Ok(Bytes::from(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PipelineError::CacheMiss(PathBuf::from(path)))
        }
        Err(e) => Err(e.into()),
    }
}

fn describe(msg: &Grib2Message) -> String {
    format!("{} @ {}", msg.parameter(), msg.level())
}

/// Speed `sqrt(u² + v²)` and unit components `u/|w|`, `v/|w|`.
///
/// Calm cells (speed 0) get zero components. NaN in either input
/// propagates to every output at that cell.
pub fn wind_components(u: &Grid, v: &Grid) -> Result<(Grid, WindComponents)> {
    if u.width() != v.width() || u.height() != v.height() {
        return Err(PipelineError::raster(format!(
            "wind component grids differ: {}x{} vs {}x{}",
            u.width(),
            u.height(),
            v.width(),
            v.height()
        )));
    }

    let n = u.data().len();
    let mut speed = Vec::with_capacity(n);
    let mut un = Vec::with_capacity(n);
    let mut vn = Vec::with_capacity(n);

    for (&a, &b) in u.data().iter().zip(v.data()) {
        let s = (a * a + b * b).sqrt();
        speed.push(s);
        if s == 0.0 {
            un.push(0.0);
            vn.push(0.0);
        } else {
            un.push(a / s);
            vn.push(b / s);
        }
    }

    let (w, h) = (u.width(), u.height());
    Ok((
        Grid::new(speed, w, h)?,
        WindComponents {
            u: Grid::new(un, w, h)?,
            v: Grid::new(vn, w, h)?,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::assert_approx_eq;

    #[test]
    fn test_wind_magnitude_and_normalisation() {
        let u = Grid::new(vec![3.0, 0.0, -5.0, f32::NAN], 2, 2).unwrap();
        let v = Grid::new(vec![4.0, 0.0, 0.0, 1.0], 2, 2).unwrap();

        let (speed, comps) = wind_components(&u, &v).unwrap();

        assert_approx_eq!(speed.data()[0], 5.0, 1e-6);
        assert_approx_eq!(comps.u.data()[0], 0.6, 1e-6);
        assert_approx_eq!(comps.v.data()[0], 0.8, 1e-6);

        // Calm
        assert_eq!(speed.data()[1], 0.0);
        assert_eq!(comps.u.data()[1], 0.0);
        assert_eq!(comps.v.data()[1], 0.0);

        assert_approx_eq!(comps.u.data()[2], -1.0, 1e-6);

        assert!(speed.data()[3].is_nan());
        assert!(comps.u.data()[3].is_nan());
        assert!(comps.v.data()[3].is_nan());
    }

    #[test]
    fn test_wind_shape_mismatch() {
        let u = Grid::filled(1.0, 2, 2);
        let v = Grid::filled(1.0, 4, 1);
        assert!(matches!(wind_components(&u, &v), Err(PipelineError::Raster(_))));
    }
}
