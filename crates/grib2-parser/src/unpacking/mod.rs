//! GRIB2 data unpacking.
//!
//! Simple packing (template 5.0) is decoded here. Complex packing with
//! spatial differencing (5.3), which NOMADS uses for most GFS fields, and
//! the PNG/JPEG2000 variants are delegated to the `grib` crate by
//! [`crate::Grib2Message::unpack_data`].

use crate::sections::DataRepresentation;
use crate::Grib2Error;

/// Parameters of simple packing.
///
/// value = (R + X * 2^E) * 10^(-D)
#[derive(Debug, Clone, Copy)]
pub struct SimplePacking {
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
}

impl From<&DataRepresentation> for SimplePacking {
    fn from(drs: &DataRepresentation) -> Self {
        Self {
            reference_value: drs.reference_value,
            binary_scale_factor: drs.binary_scale_factor,
            decimal_scale_factor: drs.decimal_scale_factor,
            bits_per_value: drs.bits_per_value,
        }
    }
}

/// Unpack simple packed GRIB2 data for `num_points` grid points.
///
/// With a bitmap, only points whose bit is set consume a packed value;
/// the others come back as NaN.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: usize,
    packing: SimplePacking,
    bitmap: Option<&[u8]>,
) -> Result<Vec<f32>, Grib2Error> {
    let binary_scale = 2.0_f32.powi(packing.binary_scale_factor as i32);
    let decimal_scale = 10.0_f32.powi(-(packing.decimal_scale_factor as i32));
    let bits = packing.bits_per_value as usize;

    let mut reader = BitReader::new(packed_data);
    let mut values = Vec::with_capacity(num_points);

    for i in 0..num_points {
        let present = match bitmap {
            Some(bm) => bm.get(i / 8).map_or(true, |byte| (byte >> (7 - i % 8)) & 1 == 1),
            None => true,
        };

        if !present {
            values.push(f32::NAN);
            continue;
        }

        // Zero bits per value: every point is the reference value
        let packed = if bits == 0 {
            0
        } else {
            reader.read(bits).ok_or_else(|| {
                Grib2Error::UnpackingError(format!(
                    "Packed data exhausted at point {} of {}",
                    i, num_points
                ))
            })?
        };

        values.push((packing.reference_value + packed as f32 * binary_scale) * decimal_scale);
    }

    Ok(values)
}

/// MSB-first bit reader over a byte slice.
struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Read up to 32 bits, or None past the end of the data.
    fn read(&mut self, num_bits: usize) -> Option<u32> {
        if num_bits == 0 || num_bits > 32 || self.position + num_bits > self.data.len() * 8 {
            return None;
        }

        let mut result = 0u32;
        for _ in 0..num_bits {
            let byte = self.data[self.position / 8];
            let bit = (byte >> (7 - self.position % 8)) & 1;
            result = (result << 1) | bit as u32;
            self.position += 1;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packing(bits: u8) -> SimplePacking {
        SimplePacking {
            reference_value: 0.0,
            binary_scale_factor: 0,
            decimal_scale_factor: 0,
            bits_per_value: bits,
        }
    }

    #[test]
    fn test_bit_reader() {
        let data = [0b1011_0101];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read(2), Some(0b10));
        assert_eq!(reader.read(2), Some(0b11));
        assert_eq!(reader.read(4), Some(0b0101));
        assert_eq!(reader.read(1), None);
    }

    #[test]
    fn test_simple_unpacking() {
        let values = unpack_simple(&[100, 200], 2, packing(8), None).unwrap();
        assert_eq!(values, vec![100.0, 200.0]);
    }

    #[test]
    fn test_scale_factors() {
        let p = SimplePacking {
            reference_value: 1000.0,
            binary_scale_factor: 1,
            decimal_scale_factor: 1,
            bits_per_value: 8,
        };
        // (1000 + 5 * 2) / 10
        let values = unpack_simple(&[5], 1, p, None).unwrap();
        assert!((values[0] - 101.0).abs() < 1e-4);
    }

    #[test]
    fn test_bitmap_skips_missing_points() {
        // Points 0 and 2 present, 1 missing; only two packed values
        let bitmap = [0b1010_0000];
        let values = unpack_simple(&[7, 9], 3, packing(8), Some(&bitmap)).unwrap();
        assert_eq!(values[0], 7.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 9.0);
    }

    #[test]
    fn test_constant_field() {
        let mut p = packing(0);
        p.reference_value = 288.15;
        let values = unpack_simple(&[], 4, p, None).unwrap();
        assert_eq!(values, vec![288.15; 4]);
    }

    #[test]
    fn test_truncated_data_is_an_error() {
        assert!(matches!(
            unpack_simple(&[1], 2, packing(8), None),
            Err(Grib2Error::UnpackingError(_))
        ));
    }
}
