//! Core domain types: model runs, forecast horizons and geographic extents.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Hours at which GFS runs are issued.
pub const CYCLE_HOURS: [u8; 4] = [0, 6, 12, 18];

/// Issuance hour of a model run (00, 06, 12 or 18 UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CycleHour(u8);

impl CycleHour {
    pub fn new(hour: i64) -> Result<Self> {
        u8::try_from(hour)
            .ok()
            .filter(|h| CYCLE_HOURS.contains(h))
            .map(Self)
            .ok_or_else(|| {
                PipelineError::validation(format!(
                    "cycle hour must be one of 0, 6, 12, 18, got {}",
                    hour
                ))
            })
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for CycleHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// One issuance of the forecast model, identified by date and cycle hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ForecastRun {
    pub date: NaiveDate,
    pub hour: CycleHour,
}

impl ForecastRun {
    pub fn new(date: NaiveDate, hour: CycleHour) -> Self {
        Self { date, hour }
    }

    /// Parse an 8-digit `YYYYMMDD` date and a cycle hour.
    pub fn parse(date: &str, hour: i64) -> Result<Self> {
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PipelineError::validation(format!(
                "date must be 8 digits (YYYYMMDD), got '{}'",
                date
            )));
        }
        let date = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| {
            PipelineError::validation(format!("'{}' is not a calendar date", date))
        })?;
        Ok(Self::new(date, CycleHour::new(hour)?))
    }

    /// Date formatted as `YYYYMMDD`
    pub fn date_compact(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }
}

impl fmt::Display for ForecastRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}z", self.date.format("%Y%m%d"), self.hour)
    }
}

/// Hours after run issuance for which files are published.
///
/// 3-hourly to 57, 6-hourly to 192, 12-hourly to 384.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ForecastHorizon(u32);

impl ForecastHorizon {
    pub const ANALYSIS: ForecastHorizon = ForecastHorizon(0);
    pub const MAX: u32 = 384;

    pub fn new(hours: u32) -> Result<Self> {
        if Self::is_scheduled(hours) {
            Ok(Self(hours))
        } else {
            Err(PipelineError::validation(format!(
                "{} is not a published forecast horizon",
                hours
            )))
        }
    }

    fn is_scheduled(hours: u32) -> bool {
        match hours {
            0..=57 => hours % 3 == 0,
            60..=192 => hours % 6 == 0,
            204..=384 => hours % 12 == 0,
            _ => false,
        }
    }

    /// Every published horizon in ascending order.
    pub fn schedule() -> impl Iterator<Item = ForecastHorizon> {
        (0..=Self::MAX).filter(|h| Self::is_scheduled(*h)).map(Self)
    }

    pub fn hours(&self) -> u32 {
        self.0
    }

    /// The analysis step (f000) uses a different band layout.
    pub fn is_analysis(&self) -> bool {
        self.0 == 0
    }

    /// Zero-padded three-digit form, e.g. `003`
    pub fn padded(&self) -> String {
        format!("{:03}", self.0)
    }
}

impl fmt::Display for ForecastHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{:03}", self.0)
    }
}

impl FromStr for ForecastHorizon {
    type Err = PipelineError;

    /// Accepts `3`, `003` and `f003`.
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.trim().trim_start_matches(['f', 'F']);
        let hours = digits.parse::<u32>().map_err(|_| {
            PipelineError::validation(format!("'{}' is not a forecast horizon", s))
        })?;
        Self::new(hours)
    }
}

/// Rectangular lon/lat box in degrees.
///
/// Serialised as `[west, east, north, south]`, the argument order of the
/// archive's subregion filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 4]")]
pub struct GeographicExtent {
    pub west: f64,
    pub east: f64,
    pub north: f64,
    pub south: f64,
}

impl GeographicExtent {
    pub fn new(west: f64, east: f64, north: f64, south: f64) -> Result<Self> {
        if !(west < east) {
            return Err(PipelineError::validation(format!(
                "extent west ({}) must be less than east ({})",
                west, east
            )));
        }
        if !(north > south) {
            return Err(PipelineError::validation(format!(
                "extent north ({}) must be greater than south ({})",
                north, south
            )));
        }
        Ok(Self {
            west,
            east,
            north,
            south,
        })
    }

    /// Build from `[west, east, north, south]`.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values {
            [west, east, north, south] => Self::new(*west, *east, *north, *south),
            _ => Err(PipelineError::validation(format!(
                "extent needs 4 components [west, east, north, south], got {}",
                values.len()
            ))),
        }
    }
}

/// Poland
impl Default for GeographicExtent {
    fn default() -> Self {
        Self {
            west: 13.0,
            east: 25.0,
            north: 56.0,
            south: 48.0,
        }
    }
}

impl TryFrom<Vec<f64>> for GeographicExtent {
    type Error = PipelineError;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        Self::from_slice(&values)
    }
}

impl From<GeographicExtent> for [f64; 4] {
    fn from(e: GeographicExtent) -> Self {
        [e.west, e.east, e.north, e.south]
    }
}

impl fmt::Display for GeographicExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[W {}, E {}, N {}, S {}]",
            self.west, self.east, self.north, self.south
        )
    }
}
