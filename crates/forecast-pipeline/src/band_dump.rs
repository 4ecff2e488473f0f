//! Band listing for GRIB2 files.
//!
//! Used to find the band numbers of new variables: every message is listed
//! with its 1-based ordinal, a human-readable comment and a short
//! description.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use grib2_parser::{Grib2Reader, Grib2Tables};
use serde::Serialize;
use tokio::fs;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BandDescriptor {
    pub band: usize,
    /// e.g. `Temperature [K]`
    pub comment: String,
    /// e.g. `TMP @ 2 m above ground`
    pub description: String,
}

/// Describe every band of the file at `path`.
pub async fn scan_bands(path: &Path, tables: Arc<Grib2Tables>) -> Result<Vec<BandDescriptor>> {
    let data = Bytes::from(fs::read(path).await?);
    describe_bands(data, tables)
}

pub fn describe_bands(data: Bytes, tables: Arc<Grib2Tables>) -> Result<Vec<BandDescriptor>> {
    let mut reader = Grib2Reader::new(data, tables.clone());
    let mut bands = Vec::new();

    while let Some(msg) = reader.next_message()? {
        let discipline = msg.indicator.discipline;
        let category = msg.product_definition.parameter_category;
        let number = msg.product_definition.parameter_number;

        let comment = match tables.get_parameter(discipline, category, number) {
            Some(info) => format!("{} [{}]", info.long_name, info.units),
            None => format!("Parameter {}-{}-{}", discipline, category, number),
        };

        bands.push(BandDescriptor {
            band: bands.len() + 1,
            comment,
            description: format!("{} @ {}", msg.parameter(), msg.level()),
        });
    }

    Ok(bands)
}
