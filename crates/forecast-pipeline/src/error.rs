//! Error types for the forecast pipeline.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::ForecastHorizon;

/// Why a variable lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableMiss {
    /// The name is not in the band index at all.
    NotInIndex,
    /// The variable exists but has no band at the analysis step (f000).
    AbsentAtAnalysis,
    /// The variable exists but has no band at forecast steps.
    AbsentAtForecast,
}

impl fmt::Display for VariableMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableMiss::NotInIndex => write!(f, "not in band index"),
            VariableMiss::AbsentAtAnalysis => write!(f, "not available at the analysis step"),
            VariableMiss::AbsentAtForecast => write!(f, "not available at forecast steps"),
        }
    }
}

/// Errors that can occur while acquiring or processing forecast data.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed input, rejected before any I/O.
    #[error("validation error: {0}")]
    Validation(String),

    /// The run catalog could not be reached.
    #[error("catalog unreachable: {0}")]
    CatalogUnreachable(String),

    /// The run catalog was reached but listed nothing usable.
    #[error("catalog format error: {0}")]
    CatalogParse(String),

    /// The horizon is not published yet (or the transfer failed); retry later.
    #[error("horizon {horizon} not yet published: {reason}")]
    NotYetPublished {
        horizon: ForecastHorizon,
        reason: String,
    },

    /// The raw file for a run/horizon is not in the cache.
    #[error("no valid cached file at {}", .0.display())]
    CacheMiss(PathBuf),

    #[error("unknown variable '{name}': {miss}")]
    UnknownVariable { name: String, miss: VariableMiss },

    /// The cached file could not be decoded.
    #[error("raster error: {0}")]
    Raster(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn catalog_unreachable(msg: impl Into<String>) -> Self {
        Self::CatalogUnreachable(msg.into())
    }

    pub fn catalog_parse(msg: impl Into<String>) -> Self {
        Self::CatalogParse(msg.into())
    }

    pub fn not_yet_published(horizon: ForecastHorizon, reason: impl Into<String>) -> Self {
        Self::NotYetPublished {
            horizon,
            reason: reason.into(),
        }
    }

    pub fn unknown_variable(name: impl Into<String>, miss: VariableMiss) -> Self {
        Self::UnknownVariable {
            name: name.into(),
            miss,
        }
    }

    pub fn raster(msg: impl Into<String>) -> Self {
        Self::Raster(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for conditions that may clear up by themselves: an unpublished
    /// horizon, or an unreachable catalog (after a delay).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotYetPublished { .. } | Self::CatalogUnreachable(_)
        )
    }
}

impl From<grib2_parser::Grib2Error> for PipelineError {
    fn from(err: grib2_parser::Grib2Error) -> Self {
        Self::Raster(err.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
