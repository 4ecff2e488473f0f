//! Pipeline configuration.
//!
//! Loaded from a YAML file, then overridden from the environment:
//!
//! | Variable | Field |
//! |---|---|
//! | `GFS_CACHE_DIR` | `cache.root` |
//! | `GFS_MIN_VALID_BYTES` | `cache.min_valid_bytes` |
//! | `GFS_FILTER_URL` | `archive.filter_url` |
//! | `GFS_REQUEST_TIMEOUT_SECS` | `archive.request_timeout_secs` |
//! | `GFS_UPSAMPLE_FACTOR` | `resample.factor` |

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::archive::ArchiveConfig;
use crate::band_index::{BandIndex, VariableEntry};
use crate::cache::CacheLayout;
use crate::error::{PipelineError, Result};
use crate::resample::UpsampleFactor;
use crate::types::{ForecastHorizon, GeographicExtent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
    /// Smaller files are treated as "not published yet"
    #[serde(default = "default_min_valid_bytes")]
    pub min_valid_bytes: u64,
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("data/gfs")
}

fn default_min_valid_bytes() -> u64 {
    65_536
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
            min_valid_bytes: default_min_valid_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleConfig {
    #[serde(default = "default_factor")]
    pub factor: u32,
}

fn default_factor() -> u32 {
    UpsampleFactor::DEFAULT.get()
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            factor: default_factor(),
        }
    }
}

/// 6-hourly to five days, then 12-hourly to sixteen days.
pub fn default_horizons() -> Vec<u32> {
    (0..=120).step_by(6).chain((132..=384).step_by(12)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub extent: GeographicExtent,
    #[serde(default = "default_horizons")]
    pub horizons: Vec<u32>,
    #[serde(default)]
    pub resample: ResampleConfig,
    /// Replaces the built-in band table when present
    #[serde(default)]
    pub variables: Option<Vec<VariableEntry>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive: ArchiveConfig::default(),
            cache: CacheConfig::default(),
            extent: GeographicExtent::default(),
            horizons: default_horizons(),
            resample: ResampleConfig::default(),
            variables: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load `path`, falling back to defaults if it does not exist, then
    /// apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                PipelineError::config(format!("failed to read {}: {}", path.display(), e))
            })?;
            info!(path = %path.display(), "Loaded configuration");
            Self::from_yaml(&content)?
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(root) = get("GFS_CACHE_DIR") {
            self.cache.root = PathBuf::from(root);
        }
        if let Some(bytes) = get("GFS_MIN_VALID_BYTES") {
            self.cache.min_valid_bytes = parse_env("GFS_MIN_VALID_BYTES", &bytes)?;
        }
        if let Some(url) = get("GFS_FILTER_URL") {
            self.archive.filter_url = url;
        }
        if let Some(secs) = get("GFS_REQUEST_TIMEOUT_SECS") {
            self.archive.request_timeout_secs = parse_env("GFS_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(factor) = get("GFS_UPSAMPLE_FACTOR") {
            self.resample.factor = parse_env("GFS_UPSAMPLE_FACTOR", &factor)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.min_valid_bytes == 0 {
            return Err(PipelineError::config("cache.min_valid_bytes must be positive"));
        }
        if self.archive.connect_timeout_secs == 0 || self.archive.request_timeout_secs == 0 {
            return Err(PipelineError::config("archive timeouts must be positive"));
        }
        if self.horizons.is_empty() {
            return Err(PipelineError::config("horizons must not be empty"));
        }
        self.horizons().map_err(|e| PipelineError::config(e.to_string()))?;
        self.upsample_factor()
            .map_err(|e| PipelineError::config(e.to_string()))?;
        // Extent invariants are enforced on deserialisation; re-check for
        // values built in code
        GeographicExtent::new(self.extent.west, self.extent.east, self.extent.north, self.extent.south)
            .map_err(|e| PipelineError::config(e.to_string()))?;
        if let Some(variables) = &self.variables {
            if variables.is_empty() {
                return Err(PipelineError::config("variables must not be empty when given"));
            }
        }
        Ok(())
    }

    pub fn horizons(&self) -> Result<Vec<ForecastHorizon>> {
        self.horizons.iter().map(|h| ForecastHorizon::new(*h)).collect()
    }

    pub fn upsample_factor(&self) -> Result<UpsampleFactor> {
        UpsampleFactor::new(self.resample.factor)
    }

    pub fn cache_layout(&self) -> CacheLayout {
        CacheLayout::new(self.cache.root.clone(), self.cache.min_valid_bytes)
    }

    pub fn band_index(&self) -> BandIndex {
        match &self.variables {
            Some(entries) => BandIndex::new(entries.iter().cloned()),
            None => BandIndex::gfs_0p25(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| PipelineError::config(format!("invalid {}='{}': {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_yaml("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.cache.min_valid_bytes, 65_536);
        assert_eq!(config.resample.factor, 50);
        assert_eq!(config.horizons.len(), 43);
        assert_eq!(config.horizons.last(), Some(&384));
        assert!(config.validate().is_ok());
        assert_eq!(config.band_index().len(), 10);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
archive:
  filter_url: http://localhost:8080/filter
  dir_template: "/gfs.{date}/{hour}"
cache:
  root: /tmp/gfs
  min_valid_bytes: 1024
extent: [14, 24, 55, 49]
horizons: [0, 3, 6]
resample:
  factor: 10
variables:
  - name: Temperature 2m
    analysis: 415
    forecast: 435
    conversion: kelvin_to_celsius
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.archive.filter_url, "http://localhost:8080/filter");
        assert_eq!(config.archive.request_timeout_secs, 600);
        assert_eq!(config.cache.root, PathBuf::from("/tmp/gfs"));
        assert_eq!(config.extent.west, 14.0);
        assert_eq!(config.horizons().unwrap().len(), 3);
        assert_eq!(config.upsample_factor().unwrap().get(), 10);
        assert_eq!(config.band_index().len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_extent_in_yaml() {
        assert!(matches!(
            PipelineConfig::from_yaml("extent: [14, 24, 55]"),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.horizons = vec![0, 5];
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.cache.min_valid_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.resample.factor = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GFS_CACHE_DIR", "/var/cache/gfs"),
            ("GFS_MIN_VALID_BYTES", "2048"),
            ("GFS_UPSAMPLE_FACTOR", "8"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.cache.root, PathBuf::from("/var/cache/gfs"));
        assert_eq!(config.cache.min_valid_bytes, 2048);
        assert_eq!(config.resample.factor, 8);
    }

    #[test]
    fn test_invalid_override() {
        let mut config = PipelineConfig::default();
        let result = config.apply_overrides(|k| (k == "GFS_MIN_VALID_BYTES").then(|| "lots".to_string()));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
