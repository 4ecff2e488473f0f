//! GRIB2 parser implementation (WMO FM 92 GRIB Edition 2).
//!
//! Reads the multi-message files served by the NOMADS GFS subregion filter.
//! Every message carries exactly one field, so the 1-based message ordinal
//! is the band number used by downstream band tables.

pub mod sections;
pub mod tables;
pub mod unpacking;

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::trace;

pub use sections::{
    Bitmap, DataRepresentation, DataSection, GridDefinition, Identification, Indicator,
    ProductDefinition, ScanMode,
};
pub use tables::{Grib2Tables, LevelDescription, ParameterInfo};
pub use unpacking::{unpack_simple, SimplePacking};

/// Errors raised while reading GRIB2 data.
#[derive(Error, Debug)]
pub enum Grib2Error {
    #[error("invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("message at offset {offset} is truncated: needs {expected} bytes, {available} available")]
    Truncated {
        offset: usize,
        expected: u64,
        available: usize,
    },

    #[error("unpacking failed: {0}")]
    UnpackingError(String),
}

pub type Result<T> = std::result::Result<T, Grib2Error>;

/// A single decoded GRIB2 message (one field).
#[derive(Debug, Clone)]
pub struct Grib2Message {
    /// Byte offset of the message within its file
    pub offset: usize,
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    pub bitmap: Bitmap,
    pub data_section: DataSection,
    parameter: String,
    level: String,
    raw: Bytes,
}

impl Grib2Message {
    /// Decode a message from its raw bytes (section 0 through `7777`).
    pub fn parse(raw: Bytes, offset: usize, tables: &Grib2Tables) -> Result<Self> {
        let indicator = sections::parse_indicator(&raw)?;
        let identification = sections::parse_identification(&raw)?;
        let grid_definition = sections::parse_grid_definition(&raw)?;
        let product_definition = sections::parse_product_definition(&raw)?;
        let data_representation = sections::parse_data_representation(&raw)?;
        let bitmap = sections::parse_bitmap(&raw)?;
        let data_section = sections::parse_data_section(&raw)?;

        let parameter = tables.get_parameter_name(
            indicator.discipline,
            product_definition.parameter_category,
            product_definition.parameter_number,
        );
        let level = tables.get_level_description(
            product_definition.level_type,
            product_definition.level_value,
        );

        Ok(Self {
            offset,
            indicator,
            identification,
            grid_definition,
            product_definition,
            data_representation,
            bitmap,
            data_section,
            parameter,
            level,
            raw,
        })
    }

    /// Parameter short name, e.g. "TMP"
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    /// Level description, e.g. "2 m above ground"
    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn valid_time(&self) -> DateTime<Utc> {
        self.identification.reference_time
            + Duration::hours(self.product_definition.forecast_time as i64)
    }

    /// Grid dimensions as (rows, columns)
    pub fn grid_dims(&self) -> (usize, usize) {
        (
            self.grid_definition.num_points_latitude as usize,
            self.grid_definition.num_points_longitude as usize,
        )
    }

    /// Unpack the field in file scanning order. Missing points are NaN.
    pub fn unpack_data(&self) -> Result<Vec<f32>> {
        let (rows, cols) = self.grid_dims();
        let num_points = rows * cols;

        if self.data_representation.template == 0 {
            let bitmap = self.bitmap.is_present().then(|| &self.bitmap.data[..]);
            return unpack_simple(
                &self.data_section.data,
                num_points,
                SimplePacking::from(&self.data_representation),
                bitmap,
            );
        }

        trace!(
            template = self.data_representation.template,
            offset = self.offset,
            "Delegating unpacking to grib crate"
        );
        self.unpack_with_grib_crate()
    }

    /// Unpack the field as a north-up, west-to-east row-major grid.
    ///
    /// Returns (values, width, height).
    pub fn unpack_grid(&self) -> Result<(Vec<f32>, usize, usize)> {
        let (rows, cols) = self.grid_dims();
        let values = self.unpack_data()?;

        if values.len() != rows * cols {
            return Err(Grib2Error::UnpackingError(format!(
                "Decoded {} values for a {}x{} grid",
                values.len(),
                cols,
                rows
            )));
        }

        let values = self
            .grid_definition
            .scan_mode
            .to_north_up(&values, cols, rows);
        Ok((values, cols, rows))
    }

    fn unpack_with_grib_crate(&self) -> Result<Vec<f32>> {
        let grib2 = grib::from_reader(Cursor::new(self.raw.as_ref()))
            .map_err(|e| Grib2Error::UnpackingError(e.to_string()))?;

        let (_, submessage) = grib2
            .iter()
            .next()
            .ok_or_else(|| Grib2Error::UnpackingError("No submessage in message".to_string()))?;

        let decoder = grib::Grib2SubmessageDecoder::from(submessage)
            .map_err(|e| Grib2Error::UnpackingError(e.to_string()))?;
        let values: Vec<f32> = decoder
            .dispatch()
            .map_err(|e| Grib2Error::UnpackingError(e.to_string()))?
            .collect();

        Ok(values)
    }
}

/// Sequential reader over the messages of a GRIB2 file.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
    tables: Arc<Grib2Tables>,
}

impl Grib2Reader {
    pub fn new(data: Bytes, tables: Arc<Grib2Tables>) -> Self {
        Self {
            data,
            offset: 0,
            tables,
        }
    }

    /// Total size of the underlying data in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Read and decode the next message, or None at end of data.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>> {
        match self.next_raw()? {
            Some((offset, raw)) => {
                Grib2Message::parse(raw, offset, &self.tables).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Decode the message with the given 1-based ordinal (band number),
    /// skipping earlier messages without decoding them.
    pub fn message_at(&mut self, band: usize) -> Result<Option<Grib2Message>> {
        if band == 0 {
            return Ok(None);
        }
        for _ in 1..band {
            if self.next_raw()?.is_none() {
                return Ok(None);
            }
        }
        self.next_message()
    }

    /// Count the remaining messages without decoding them.
    pub fn count_messages(&mut self) -> Result<usize> {
        let mut count = 0;
        while self.next_raw()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Locate the next `GRIB` marker and slice out the whole message.
    fn next_raw(&mut self) -> Result<Option<(usize, Bytes)>> {
        let start = match find_magic(&self.data[self.offset.min(self.data.len())..]) {
            Some(rel) => self.offset + rel,
            None => {
                self.offset = self.data.len();
                return Ok(None);
            }
        };

        let indicator = sections::parse_indicator(&self.data[start..])?;
        let available = self.data.len() - start;
        if indicator.message_length < 16 || indicator.message_length > available as u64 {
            return Err(Grib2Error::Truncated {
                offset: start,
                expected: indicator.message_length,
                available,
            });
        }

        let end = start + indicator.message_length as usize;
        self.offset = end;
        Ok(Some((start, self.data.slice(start..end))))
    }
}

fn find_magic(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"GRIB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_data_has_no_messages() {
        let mut reader = Grib2Reader::new(Bytes::new(), Arc::new(Grib2Tables::new()));
        assert!(reader.next_message().unwrap().is_none());
        assert_eq!(reader.count_messages().unwrap(), 0);
    }

    #[test]
    fn test_html_error_page_has_no_messages() {
        let page = Bytes::from_static(b"<html><body>Data file is not present</body></html>");
        let mut reader = Grib2Reader::new(page, Arc::new(Grib2Tables::new()));
        assert!(reader.next_message().unwrap().is_none());
    }

    #[test]
    fn test_truncated_message_is_reported() {
        let mut data = vec![0u8; 20];
        data[0..4].copy_from_slice(b"GRIB");
        data[7] = 2;
        data[8..16].copy_from_slice(&500u64.to_be_bytes());
        let mut reader = Grib2Reader::new(Bytes::from(data), Arc::new(Grib2Tables::new()));
        assert!(matches!(
            reader.next_message(),
            Err(Grib2Error::Truncated { expected: 500, .. })
        ));
    }
}
