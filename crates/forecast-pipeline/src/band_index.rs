//! Named variables and the raster bands that hold them.
//!
//! A GFS 0.25° subregion file has one GRIB2 message per field, and the
//! 1-based message ordinal is the band number. The analysis file (f000)
//! carries fewer fields than forecast files, so the same variable sits at
//! different band numbers depending on the horizon. Both layouts live in
//! one entry per variable and are selected explicitly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result, VariableMiss};

/// One band, or a (u, v) pair for vector quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BandSelection {
    Scalar(u32),
    Vector(u32, u32),
}

impl BandSelection {
    pub fn is_vector(&self) -> bool {
        matches!(self, BandSelection::Vector(..))
    }

    pub fn bands(&self) -> Vec<u32> {
        match *self {
            BandSelection::Scalar(b) => vec![b],
            BandSelection::Vector(u, v) => vec![u, v],
        }
    }
}

/// Conversion applied to decoded values (raw SI units) before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitConversion {
    #[default]
    Identity,
    /// Pa to hPa
    PascalToHectopascal,
    /// K to °C
    KelvinToCelsius,
}

impl UnitConversion {
    pub fn apply(&self, value: f32) -> f32 {
        match self {
            UnitConversion::Identity => value,
            UnitConversion::PascalToHectopascal => value / 100.0,
            UnitConversion::KelvinToCelsius => value - 273.15,
        }
    }

    /// Units after conversion, given the units in the file.
    pub fn output_units<'a>(&self, source_units: &'a str) -> &'a str {
        match self {
            UnitConversion::Identity => source_units,
            UnitConversion::PascalToHectopascal => "hPa",
            UnitConversion::KelvinToCelsius => "°C",
        }
    }
}

/// A resolved variable: what to read and how to convert it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableSpec {
    pub name: String,
    pub bands: BandSelection,
    pub conversion: UnitConversion,
}

/// Both band layouts of one variable, as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableEntry {
    pub name: String,
    /// Band(s) in the f000 file; absent for accumulated fields
    #[serde(default)]
    pub analysis: Option<BandSelection>,
    /// Band(s) in f003 and later files
    #[serde(default)]
    pub forecast: Option<BandSelection>,
    #[serde(default)]
    pub conversion: UnitConversion,
}

/// Lookup from variable name to bands, per horizon class.
#[derive(Debug, Clone)]
pub struct BandIndex {
    entries: BTreeMap<String, VariableEntry>,
}

impl BandIndex {
    pub fn new(entries: impl IntoIterator<Item = VariableEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.name.clone(), entry))
                .collect(),
        }
    }

    /// Built-in table for NOMADS `pgrb2.0p25` files filtered with
    /// `all_lev=on&all_var=on`.
    pub fn gfs_0p25() -> Self {
        use BandSelection::{Scalar, Vector};
        use UnitConversion::*;

        let table: &[(&str, Option<BandSelection>, Option<BandSelection>, UnitConversion)] = &[
            ("Wind gust ground", Some(Scalar(11)), Some(Scalar(14)), Identity),
            ("Wind 250hPa", Some(Vector(146, 147)), Some(Vector(152, 153)), Identity),
            ("Temperature 2m", Some(Scalar(415)), Some(Scalar(435)), KelvinToCelsius),
            ("Dew point 2m", Some(Scalar(417)), Some(Scalar(437)), KelvinToCelsius),
            ("Wind 10m", Some(Vector(420, 421)), Some(Vector(440, 441)), Identity),
            ("Precipitation ground", None, Some(Scalar(451)), Identity),
            ("LI surface", Some(Scalar(432)), Some(Scalar(465)), Identity),
            ("CAPE surface", Some(Scalar(433)), Some(Scalar(466)), Identity),
            ("CIN surface", Some(Scalar(434)), Some(Scalar(467)), Identity),
            ("Pressure sea lvl", Some(Scalar(520)), Some(Scalar(586)), PascalToHectopascal),
        ];

        Self::new(
            table
                .iter()
                .map(|(name, analysis, forecast, conversion)| VariableEntry {
                    name: name.to_string(),
                    analysis: *analysis,
                    forecast: *forecast,
                    conversion: *conversion,
                }),
        )
    }

    /// Resolve `variable` for either the analysis step or a forecast step.
    pub fn bands_for(&self, variable: &str, horizon_is_zero: bool) -> Result<VariableSpec> {
        let entry = self
            .entries
            .get(variable)
            .ok_or_else(|| PipelineError::unknown_variable(variable, VariableMiss::NotInIndex))?;

        let (bands, miss) = if horizon_is_zero {
            (entry.analysis, VariableMiss::AbsentAtAnalysis)
        } else {
            (entry.forecast, VariableMiss::AbsentAtForecast)
        };

        let bands = bands.ok_or_else(|| PipelineError::unknown_variable(variable, miss))?;

        Ok(VariableSpec {
            name: entry.name.clone(),
            bands,
            conversion: entry.conversion,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &VariableEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for BandIndex {
    fn default() -> Self {
        Self::gfs_0p25()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_lookups() {
        let index = BandIndex::gfs_0p25();

        let t2m = index.bands_for("Temperature 2m", true).unwrap();
        assert_eq!(t2m.bands, BandSelection::Scalar(415));
        assert_eq!(t2m.conversion, UnitConversion::KelvinToCelsius);

        let wind = index.bands_for("Wind 250hPa", true).unwrap();
        assert_eq!(wind.bands, BandSelection::Vector(146, 147));

        assert_eq!(
            index.bands_for("Pressure sea lvl", true).unwrap().bands,
            BandSelection::Scalar(520)
        );
    }

    #[test]
    fn test_lookups_are_stable() {
        let index = BandIndex::gfs_0p25();
        let first = index.bands_for("CAPE surface", false).unwrap();
        let second = index.bands_for("CAPE surface", false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_forecast_layout_differs() {
        let index = BandIndex::gfs_0p25();
        let analysis = index.bands_for("Wind 10m", true).unwrap();
        let forecast = index.bands_for("Wind 10m", false).unwrap();
        assert_ne!(analysis.bands, forecast.bands);
        assert!(forecast.bands.is_vector());
    }

    #[test]
    fn test_unknown_variable() {
        let index = BandIndex::gfs_0p25();
        assert!(matches!(
            index.bands_for("Snow depth", false),
            Err(PipelineError::UnknownVariable {
                miss: VariableMiss::NotInIndex,
                ..
            })
        ));
    }

    #[test]
    fn test_precipitation_absent_at_analysis() {
        let index = BandIndex::gfs_0p25();
        assert!(matches!(
            index.bands_for("Precipitation ground", true),
            Err(PipelineError::UnknownVariable {
                miss: VariableMiss::AbsentAtAnalysis,
                ..
            })
        ));
        assert!(index.bands_for("Precipitation ground", false).is_ok());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(UnitConversion::PascalToHectopascal.apply(101_325.0), 1013.25);
        assert!((UnitConversion::KelvinToCelsius.apply(273.15)).abs() < 1e-4);
        assert_eq!(UnitConversion::Identity.apply(-4.5), -4.5);
        assert!(UnitConversion::KelvinToCelsius.apply(f32::NAN).is_nan());
    }

    #[test]
    fn test_entries_from_yaml() {
        let yaml = r#"
- name: Temperature 2m
  analysis: 415
  forecast: 435
  conversion: kelvin_to_celsius
- name: Wind 10m
  analysis: [420, 421]
  forecast: [440, 441]
"#;
        let entries: Vec<VariableEntry> = serde_yaml::from_str(yaml).unwrap();
        let index = BandIndex::new(entries);

        assert_eq!(index.len(), 2);
        assert_eq!(
            index.bands_for("Wind 10m", false).unwrap().bands,
            BandSelection::Vector(440, 441)
        );
        assert_eq!(
            index.bands_for("Temperature 2m", true).unwrap().conversion,
            UnitConversion::KelvinToCelsius
        );
    }
}
