//! GRIB2 section parsing.
//!
//! Each GRIB2 message consists of an indicator (section 0), a sequence of
//! length-prefixed sections 1-7, and the `7777` end marker. The functions in
//! this module take the bytes of a single message and decode the fields the
//! reader needs.

use crate::Grib2Error;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub table_version: u8,
    pub local_table_version: u8,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Section 3: Grid Definition Section
///
/// Coordinates are in degrees. Only template 3.0 (regular lat/lon) fills in
/// the geographic fields; other templates report dimensions only.
#[derive(Debug, Clone)]
pub struct GridDefinition {
    pub template: u16,
    pub num_points_longitude: u32,
    pub num_points_latitude: u32,
    pub first_latitude: f64,
    pub first_longitude: f64,
    pub last_latitude: f64,
    pub last_longitude: f64,
    pub longitude_increment: f64,
    pub latitude_increment: f64,
    pub scan_mode: ScanMode,
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub level_type: u8,
    pub level_value: u32,
    pub forecast_time: u32,
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    pub num_data_points: u32,
    pub template: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub indicator: u8,
    pub data: Bytes,
}

impl Bitmap {
    /// Indicator 0 means the bitmap bytes follow in this section.
    pub fn is_present(&self) -> bool {
        self.indicator == 0
    }
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

/// Scanning mode flags (GRIB2 Flag Table 3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanMode {
    /// Points scan in -i direction (east to west)
    pub i_negative: bool,
    /// Points scan in +j direction (south to north)
    pub j_positive: bool,
    /// Adjacent points are in the j direction (column-major)
    pub j_consecutive: bool,
}

impl ScanMode {
    pub fn from_grib2_flag(flag: u8) -> Self {
        Self {
            i_negative: (flag & 0x80) != 0,
            j_positive: (flag & 0x40) != 0,
            j_consecutive: (flag & 0x20) != 0,
        }
    }

    /// Reorder values into row-major order with row 0 northernmost and
    /// column 0 westernmost.
    pub fn to_north_up(&self, values: &[f32], ni: usize, nj: usize) -> Vec<f32> {
        if *self == ScanMode::default() {
            return values.to_vec();
        }

        let mut out = vec![f32::NAN; ni * nj];
        for j in 0..nj {
            for i in 0..ni {
                let src = if self.j_consecutive { i * nj + j } else { j * ni + i };
                let col = if self.i_negative { ni - 1 - i } else { i };
                let row = if self.j_positive { nj - 1 - j } else { j };
                if let Some(&v) = values.get(src) {
                    out[row * ni + col] = v;
                }
            }
        }
        out
    }
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
    if data.len() < 16 {
        return Err(Grib2Error::InvalidFormat(
            "Not enough data for indicator section".to_string(),
        ));
    }

    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(
            "Invalid GRIB magic bytes".to_string(),
        ));
    }

    // Octets 5-6 reserved, 7 discipline, 8 edition, 9-16 total length
    let discipline = data[6];
    let edition = data[7];
    let message_length = u64::from_be_bytes([
        data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
    ]);

    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }

    Ok(Indicator {
        discipline,
        edition,
        message_length,
    })
}

/// Parse Section 1 (Identification), located right after the indicator.
pub fn parse_identification(data: &[u8]) -> Result<Identification, Grib2Error> {
    let offset = find_section(data, 1)?;
    let sec = &data[offset..];

    if sec.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 1,
            reason: "Not enough data".to_string(),
        });
    }

    let center = u16::from_be_bytes([sec[5], sec[6]]);
    let sub_center = u16::from_be_bytes([sec[7], sec[8]]);
    let table_version = sec[9];
    let local_table_version = sec[10];
    let significance_of_reference_time = sec[11];

    let year = u16::from_be_bytes([sec[12], sec[13]]);
    let (month, day, hour, minute, second) = (sec[14], sec[15], sec[16], sec[17], sec[18]);

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    Ok(Identification {
        center,
        sub_center,
        table_version,
        local_table_version,
        significance_of_reference_time,
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: sec[19],
        data_type: sec[20],
    })
}

/// Parse Section 3 (Grid Definition)
pub fn parse_grid_definition(data: &[u8]) -> Result<GridDefinition, Grib2Error> {
    let offset = find_section(data, 3)?;
    let sec = &data[offset..];

    if sec.len() < 14 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: "Not enough data".to_string(),
        });
    }

    // Octets 13-14: grid definition template number, template data from octet 15
    let template = u16::from_be_bytes([sec[12], sec[13]]);
    let gd = &sec[14..];

    let ni = read_u32(gd, 16).unwrap_or(0);
    let nj = read_u32(gd, 20).unwrap_or(0);

    if template != 0 {
        return Ok(GridDefinition {
            template,
            num_points_longitude: ni,
            num_points_latitude: nj,
            first_latitude: 0.0,
            first_longitude: 0.0,
            last_latitude: 0.0,
            last_longitude: 0.0,
            longitude_increment: 0.0,
            latitude_increment: 0.0,
            scan_mode: ScanMode::default(),
        });
    }

    if gd.len() < 58 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("Template 0 needs at least 58 bytes, got {}", gd.len()),
        });
    }

    // Template 3.0 angles are sign-magnitude microdegrees
    let micro = |range: std::ops::Range<usize>| decode_grib2_signed(&gd[range]) as f64 / 1e6;

    Ok(GridDefinition {
        template,
        num_points_longitude: ni,
        num_points_latitude: nj,
        first_latitude: micro(32..36),
        first_longitude: micro(36..40),
        last_latitude: micro(41..45),
        last_longitude: micro(45..49),
        longitude_increment: micro(49..53),
        latitude_increment: micro(53..57),
        scan_mode: ScanMode::from_grib2_flag(gd[57]),
    })
}

/// Parse Section 4 (Product Definition)
///
/// Templates 4.0 and 4.8 (accumulations/averages) share the layout up to
/// the first fixed surface, which is all that is read here.
pub fn parse_product_definition(data: &[u8]) -> Result<ProductDefinition, Grib2Error> {
    let offset = find_section(data, 4)?;
    let sec = &data[offset..];

    if sec.len() < 28 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: "Not enough data".to_string(),
        });
    }

    let template = u16::from_be_bytes([sec[7], sec[8]]);
    let forecast_time = read_u32(sec, 18).unwrap_or(0);
    let level_type = sec[22];
    let scale_factor = decode_grib2_signed(&sec[23..24]);
    let scaled_value = read_u32(sec, 24).unwrap_or(0);

    let level_value = match scale_factor {
        0 => scaled_value,
        sf if sf > 0 => scaled_value / 10u32.saturating_pow(sf as u32),
        sf => scaled_value.saturating_mul(10u32.saturating_pow(sf.unsigned_abs())),
    };

    Ok(ProductDefinition {
        template,
        parameter_category: sec[9],
        parameter_number: sec[10],
        level_type,
        level_value,
        forecast_time,
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(data: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    let offset = find_section(data, 5)?;
    let sec = &data[offset..];

    if sec.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: "Not enough data".to_string(),
        });
    }

    // Octets 12-21 are common to templates 5.0, 5.2, 5.3, 5.40 and 5.41
    Ok(DataRepresentation {
        num_data_points: u32::from_be_bytes([sec[5], sec[6], sec[7], sec[8]]),
        template: u16::from_be_bytes([sec[9], sec[10]]),
        reference_value: f32::from_be_bytes([sec[11], sec[12], sec[13], sec[14]]),
        binary_scale_factor: decode_grib2_signed(&sec[15..17]) as i16,
        decimal_scale_factor: decode_grib2_signed(&sec[17..19]) as i16,
        bits_per_value: sec[19],
    })
}

/// Parse Section 6 (Bitmap). Absent bitmaps are reported with indicator 255.
pub fn parse_bitmap(data: &[u8]) -> Result<Bitmap, Grib2Error> {
    let offset = find_section(data, 6)?;
    let sec = &data[offset..];

    if sec.len() < 6 {
        return Err(Grib2Error::InvalidSection {
            section: 6,
            reason: "Not enough data".to_string(),
        });
    }

    let section_length = read_u32(sec, 0).unwrap_or(0) as usize;
    let indicator = sec[5];

    let bitmap_data = if indicator == 0 && section_length > 6 {
        Bytes::copy_from_slice(&sec[6..section_length])
    } else {
        Bytes::new()
    };

    Ok(Bitmap {
        indicator,
        data: bitmap_data,
    })
}

/// Parse Section 7 (Data)
pub fn parse_data_section(data: &[u8]) -> Result<DataSection, Grib2Error> {
    let offset = find_section(data, 7)?;
    let sec = &data[offset..];

    let section_length = read_u32(sec, 0).unwrap_or(0) as usize;
    if section_length < 5 || section_length > sec.len() {
        return Err(Grib2Error::InvalidSection {
            section: 7,
            reason: "Section length exceeds available data".to_string(),
        });
    }

    Ok(DataSection {
        data: Bytes::copy_from_slice(&sec[5..section_length]),
    })
}

// ===== Helper Functions =====

/// Decode a GRIB2 sign-magnitude integer (MSB is the sign bit).
///
/// Accepts 1, 2 or 4 bytes; any other length decodes to 0.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    match bytes.len() {
        1 => {
            let magnitude = (bytes[0] & 0x7F) as i32;
            if bytes[0] & 0x80 != 0 { -magnitude } else { magnitude }
        }
        2 => {
            let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
            let magnitude = (raw & 0x7FFF) as i32;
            if raw & 0x8000 != 0 { -magnitude } else { magnitude }
        }
        4 => {
            let raw = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            let magnitude = (raw & 0x7FFF_FFFF) as i32;
            if raw & 0x8000_0000 != 0 { -magnitude } else { magnitude }
        }
        _ => 0,
    }
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Find a section by number within a message
fn find_section(data: &[u8], section_num: u8) -> Result<usize, Grib2Error> {
    let mut offset = 16; // After Section 0

    loop {
        if offset + 5 > data.len() || &data[offset..offset + 4] == b"7777" {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Section not found".to_string(),
            });
        }

        let section_length = read_u32(data, offset).unwrap_or(0) as usize;

        if section_length < 5 || offset + section_length > data.len() {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Invalid section length".to_string(),
            });
        }

        if data[offset + 4] == section_num {
            return Ok(offset);
        }

        offset += section_length;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_mode_flags() {
        let mode = ScanMode::from_grib2_flag(0x40);
        assert!(!mode.i_negative);
        assert!(mode.j_positive);
        assert!(!mode.j_consecutive);
    }

    #[test]
    fn test_north_up_flips_south_first_rows() {
        // 2x2 stored south row first
        let values = [1.0, 2.0, 3.0, 4.0];
        let mode = ScanMode::from_grib2_flag(0x40);
        assert_eq!(mode.to_north_up(&values, 2, 2), vec![3.0, 4.0, 1.0, 2.0]);
    }

    #[test]
    fn test_north_up_standard_is_identity() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(ScanMode::default().to_north_up(&values, 3, 2), values.to_vec());
    }

    #[test]
    fn test_indicator_rejects_edition_1() {
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(b"GRIB");
        data[7] = 1;
        assert!(matches!(parse_indicator(&data), Err(Grib2Error::InvalidFormat(_))));
    }
}
