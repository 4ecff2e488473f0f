//! GRIB2 parameter and level lookup tables.
//!
//! Translate numeric (discipline, category, number) codes and fixed-surface
//! types into the names, descriptions and units shown in band listings.

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

/// Human-readable description of a GRIB2 parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    /// NCEP short name (e.g., "TMP", "UGRD")
    pub short_name: String,
    /// Long name (e.g., "Temperature")
    pub long_name: String,
    /// Units as encoded in the file (SI)
    pub units: String,
}

/// Level description - either static text or a template with placeholders
#[derive(Debug, Clone)]
pub enum LevelDescription {
    /// Static description (e.g., "surface", "mean sea level")
    Static(String),
    /// Template with `{value}` or `{value_mb}` placeholder
    Template(String),
}

impl LevelDescription {
    /// `{value}` is the raw level value, `{value_mb}` the value divided by 100
    /// (isobaric levels are encoded in Pa).
    pub fn format(&self, value: u32) -> String {
        match self {
            LevelDescription::Static(s) => s.clone(),
            LevelDescription::Template(t) => t
                .replace("{value}", &value.to_string())
                .replace("{value_mb}", &(value / 100).to_string()),
        }
    }
}

/// GRIB2 parameter and level lookup tables.
#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    parameters: HashMap<ParamKey, ParameterInfo>,
    levels: HashMap<u8, LevelDescription>,
}

impl Grib2Tables {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables covering the fields of an NCEP GFS 0.25° pgrb2 file.
    pub fn ncep() -> Self {
        let mut tables = Self::new();

        let parameters: &[(ParamKey, &str, &str, &str)] = &[
            // Category 0: Temperature
            ((0, 0, 0), "TMP", "Temperature", "K"),
            ((0, 0, 2), "POT", "Potential temperature", "K"),
            ((0, 0, 4), "TMAX", "Maximum temperature", "K"),
            ((0, 0, 5), "TMIN", "Minimum temperature", "K"),
            ((0, 0, 6), "DPT", "Dew point temperature", "K"),
            ((0, 0, 10), "LHTFL", "Latent heat net flux", "W/m^2"),
            ((0, 0, 11), "SHTFL", "Sensible heat net flux", "W/m^2"),
            // Category 1: Moisture
            ((0, 1, 0), "SPFH", "Specific humidity", "kg/kg"),
            ((0, 1, 1), "RH", "Relative humidity", "%"),
            ((0, 1, 3), "PWAT", "Precipitable water", "kg/m^2"),
            ((0, 1, 7), "PRATE", "Precipitation rate", "kg/(m^2 s)"),
            ((0, 1, 8), "APCP", "Total precipitation", "kg/m^2"),
            ((0, 1, 10), "ACPCP", "Convective precipitation", "kg/m^2"),
            ((0, 1, 11), "SNOD", "Snow depth", "m"),
            ((0, 1, 13), "WEASD", "Water equivalent of accumulated snow depth", "kg/m^2"),
            ((0, 1, 22), "CLWMR", "Cloud mixing ratio", "kg/kg"),
            ((0, 1, 192), "CRAIN", "Categorical rain", "-"),
            ((0, 1, 193), "CFRZR", "Categorical freezing rain", "-"),
            ((0, 1, 194), "CICEP", "Categorical ice pellets", "-"),
            ((0, 1, 195), "CSNOW", "Categorical snow", "-"),
            // Category 2: Momentum
            ((0, 2, 0), "WDIR", "Wind direction", "deg"),
            ((0, 2, 1), "WIND", "Wind speed", "m/s"),
            ((0, 2, 2), "UGRD", "u-component of wind", "m/s"),
            ((0, 2, 3), "VGRD", "v-component of wind", "m/s"),
            ((0, 2, 8), "VVEL", "Vertical velocity (pressure)", "Pa/s"),
            ((0, 2, 10), "ABSV", "Absolute vorticity", "1/s"),
            ((0, 2, 22), "GUST", "Wind speed (gust)", "m/s"),
            ((0, 2, 194), "USTM", "u-component storm motion", "m/s"),
            ((0, 2, 195), "VSTM", "v-component storm motion", "m/s"),
            // Category 3: Mass
            ((0, 3, 0), "PRES", "Pressure", "Pa"),
            ((0, 3, 1), "PRMSL", "Pressure reduced to MSL", "Pa"),
            ((0, 3, 5), "HGT", "Geopotential height", "gpm"),
            ((0, 3, 192), "MSLET", "MSLP (Eta model reduction)", "Pa"),
            // Category 6: Cloud
            ((0, 6, 1), "TCDC", "Total cloud cover", "%"),
            ((0, 6, 3), "LCDC", "Low cloud cover", "%"),
            ((0, 6, 4), "MCDC", "Medium cloud cover", "%"),
            ((0, 6, 5), "HCDC", "High cloud cover", "%"),
            // Category 7: Thermodynamic stability
            ((0, 7, 6), "CAPE", "Convective available potential energy", "J/kg"),
            ((0, 7, 7), "CIN", "Convective inhibition", "J/kg"),
            ((0, 7, 8), "HLCY", "Storm relative helicity", "m^2/s^2"),
            ((0, 7, 192), "LFTX", "Surface lifted index", "K"),
            ((0, 7, 193), "4LFTX", "Best (4 layer) lifted index", "K"),
            // Category 14: Trace gases
            ((0, 14, 192), "O3MR", "Ozone mixing ratio", "kg/kg"),
            // Category 16: Forecast radar imagery
            ((0, 16, 195), "REFD", "Reflectivity", "dB"),
            ((0, 16, 196), "REFC", "Composite reflectivity", "dB"),
            // Category 19: Physical atmospheric properties
            ((0, 19, 0), "VIS", "Visibility", "m"),
            // Discipline 2: Land surface
            ((2, 0, 0), "LAND", "Land cover", "proportion"),
            ((2, 0, 192), "SOILW", "Volumetric soil moisture content", "fraction"),
            // Discipline 10: Oceanographic
            ((10, 2, 0), "ICEC", "Ice cover", "proportion"),
        ];

        for ((d, c, n), short, long, units) in parameters {
            tables.add_parameter(
                *d,
                *c,
                *n,
                ParameterInfo {
                    short_name: short.to_string(),
                    long_name: long.to_string(),
                    units: units.to_string(),
                },
            );
        }

        let levels: &[(u8, LevelDescription)] = &[
            (1, LevelDescription::Static("surface".into())),
            (2, LevelDescription::Static("cloud base".into())),
            (3, LevelDescription::Static("cloud top".into())),
            (4, LevelDescription::Static("0C isotherm".into())),
            (6, LevelDescription::Static("max wind".into())),
            (7, LevelDescription::Static("tropopause".into())),
            (10, LevelDescription::Static("entire atmosphere".into())),
            (100, LevelDescription::Template("{value_mb} mb".into())),
            (101, LevelDescription::Static("mean sea level".into())),
            (102, LevelDescription::Template("{value} m above MSL".into())),
            (103, LevelDescription::Template("{value} m above ground".into())),
            (104, LevelDescription::Template("sigma level {value}".into())),
            (106, LevelDescription::Template("{value} m below surface".into())),
            (108, LevelDescription::Template("{value_mb} mb above ground".into())),
            (200, LevelDescription::Static("entire atmosphere".into())),
            (204, LevelDescription::Static("highest tropospheric freezing level".into())),
            (220, LevelDescription::Static("planetary boundary layer".into())),
        ];

        for (level_type, description) in levels {
            tables.add_level(*level_type, description.clone());
        }

        tables
    }

    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, info: ParameterInfo) {
        self.parameters.insert((discipline, category, number), info);
    }

    pub fn add_level(&mut self, level_type: u8, description: LevelDescription) {
        self.levels.insert(level_type, description);
    }

    pub fn get_parameter(&self, discipline: u8, category: u8, number: u8) -> Option<&ParameterInfo> {
        self.parameters.get(&(discipline, category, number))
    }

    /// Look up parameter short name by GRIB2 codes.
    ///
    /// Returns "P{discipline}_{category}_{number}" if not found.
    pub fn get_parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.get_parameter(discipline, category, number)
            .map(|info| info.short_name.clone())
            .unwrap_or_else(|| format!("P{}_{}_{}", discipline, category, number))
    }

    /// Look up level description by type code and value.
    ///
    /// Returns "Level type {type} value {value}" if not found.
    pub fn get_level_description(&self, level_type: u8, level_value: u32) -> String {
        match self.levels.get(&level_type) {
            Some(desc) => desc.format(level_value),
            None => format!("Level type {} value {}", level_type, level_value),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ncep_parameter_lookup() {
        let tables = Grib2Tables::ncep();

        assert_eq!(tables.get_parameter_name(0, 0, 0), "TMP");
        assert_eq!(tables.get_parameter_name(0, 2, 2), "UGRD");
        assert_eq!(tables.get_parameter_name(0, 3, 1), "PRMSL");
        assert_eq!(tables.get_parameter(0, 7, 6).unwrap().units, "J/kg");
    }

    #[test]
    fn test_parameter_not_found() {
        let tables = Grib2Tables::ncep();

        assert_eq!(tables.get_parameter_name(99, 99, 99), "P99_99_99");
        assert!(tables.get_parameter(0, 0, 99).is_none());
    }

    #[test]
    fn test_level_descriptions() {
        let tables = Grib2Tables::ncep();

        assert_eq!(tables.get_level_description(1, 0), "surface");
        assert_eq!(tables.get_level_description(100, 25000), "250 mb");
        assert_eq!(tables.get_level_description(103, 10), "10 m above ground");
        assert_eq!(tables.get_level_description(99, 123), "Level type 99 value 123");
    }

    #[test]
    fn test_empty_tables() {
        let tables = Grib2Tables::new();

        assert!(tables.is_empty());
        assert_eq!(tables.get_parameter_name(0, 0, 0), "P0_0_0");
        assert_eq!(tables.get_level_description(1, 0), "Level type 1 value 0");
    }
}
