//! Synthetic GRIB2 generator.
//!
//! Produces structurally valid GRIB2 messages (grid template 3.0, product
//! template 4.0, simple packing 5.0) so parser and pipeline tests can run
//! without downloading real GFS files. NaN values are written as missing
//! points through a section 6 bitmap.

/// Build a single GRIB2 message.
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    // Grid definition
    ni: u32,
    nj: u32,
    la1: f64,
    lo1: f64,
    la2: f64,
    lo2: f64,
    di: f64,
    dj: f64,
    scanning_mode: u8,
    // Product definition
    param_category: u8,
    param_number: u8,
    level_type: u8,
    level_value: u32,
    forecast_hour: u32,
    // Packing
    decimal_scale_factor: i16,
    data_values: Vec<f32>,
}

impl Grib2Builder {
    /// 9x9 quarter-degree GFS subregion spanning 14E-16E, 52N-50N,
    /// scanned north to south like the NOMADS output. Filled with 2 m
    /// temperature of 288.15 K.
    pub fn new_gfs() -> Self {
        let ni = 9;
        let nj = 9;
        Self {
            discipline: 0,
            center: 7, // NCEP
            year: 2024,
            month: 3,
            day: 1,
            hour: 12,
            ni,
            nj,
            la1: 52.0,
            lo1: 14.0,
            la2: 50.0,
            lo2: 16.0,
            di: 0.25,
            dj: 0.25,
            scanning_mode: 0,
            param_category: 0,
            param_number: 0, // TMP
            level_type: 103,
            level_value: 2,
            forecast_hour: 0,
            decimal_scale_factor: 0,
            data_values: vec![288.15; (ni * nj) as usize],
        }
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self
    }

    /// Resize the grid, keeping the north-west corner and the increments.
    pub fn with_grid(mut self, ni: u32, nj: u32) -> Self {
        self.ni = ni;
        self.nj = nj;
        self.la2 = self.la1 - self.dj * (nj.saturating_sub(1)) as f64;
        self.lo2 = self.lo1 + self.di * (ni.saturating_sub(1)) as f64;
        self.data_values = vec![0.0; (ni * nj) as usize];
        self
    }

    pub fn with_origin(mut self, north: f64, west: f64) -> Self {
        self.la1 = north;
        self.lo1 = west;
        self.la2 = north - self.dj * (self.nj.saturating_sub(1)) as f64;
        self.lo2 = west + self.di * (self.ni.saturating_sub(1)) as f64;
        self
    }

    pub fn with_scanning_mode(mut self, flag: u8) -> Self {
        self.scanning_mode = flag;
        self
    }

    pub fn with_discipline(mut self, discipline: u8) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        self.param_category = category;
        self.param_number = number;
        self
    }

    pub fn with_level(mut self, level_type: u8, level_value: u32) -> Self {
        self.level_type = level_type;
        self.level_value = level_value;
        self
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.forecast_hour = hour;
        self
    }

    /// Decimal scale factor D; values are packed as value * 10^D.
    pub fn with_decimal_scale(mut self, d: i16) -> Self {
        self.decimal_scale_factor = d;
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; (self.ni * self.nj) as usize];
        self
    }

    pub fn with_gradient(mut self, min_val: f32, max_val: f32) -> Self {
        let n = (self.ni * self.nj) as usize;
        self.data_values = (0..n)
            .map(|i| min_val + (max_val - min_val) * (i as f32 / n as f32))
            .collect();
        self
    }

    /// Values in scanning order. NaN marks a missing point.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// Build the complete GRIB2 message bytes
    pub fn build(&self) -> Vec<u8> {
        let section1 = self.build_section1();
        let section3 = self.build_section3();
        let section4 = self.build_section4();
        let packing = self.packing();
        let section5 = self.build_section5(&packing);
        let section6 = self.build_section6();
        let section7 = self.build_section7(&packing);

        let message_length = 16
            + section1.len()
            + section3.len()
            + section4.len()
            + section5.len()
            + section6.len()
            + section7.len()
            + 4;

        let mut message = Vec::with_capacity(message_length);

        // Section 0: Indicator
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]);
        message.push(self.discipline);
        message.push(2);
        message.extend_from_slice(&(message_length as u64).to_be_bytes());

        message.extend_from_slice(&section1);
        message.extend_from_slice(&section3);
        message.extend_from_slice(&section4);
        message.extend_from_slice(&section5);
        message.extend_from_slice(&section6);
        message.extend_from_slice(&section7);

        // Section 8: End
        message.extend_from_slice(b"7777");

        message
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);

        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Sub-center
        section.push(2); // Master table version
        section.push(1); // Local table version
        section.push(1); // Significance of reference time (start of forecast)

        section.extend_from_slice(&self.year.to_be_bytes());
        section.push(self.month);
        section.push(self.day);
        section.push(self.hour);
        section.push(0); // Minute
        section.push(0); // Second

        section.push(0); // Production status (operational)
        section.push(1); // Type of data (forecast)

        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let mut section = Vec::new();
        let section_length: u32 = 14 + 58;

        section.extend_from_slice(&section_length.to_be_bytes());
        section.push(3);

        section.push(0); // Source of grid definition
        section.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        section.push(0); // Number of octets for optional list
        section.push(0); // Interpretation of optional list
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 3.0

        section.push(6); // Shape of Earth (spherical, radius 6371229 m)
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        section.extend_from_slice(&self.ni.to_be_bytes());
        section.extend_from_slice(&self.nj.to_be_bytes());
        section.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
        section.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // Subdivisions

        section.extend_from_slice(&sign_magnitude_i32(micro(self.la1)));
        section.extend_from_slice(&sign_magnitude_i32(micro(self.lo1)));
        section.push(48); // Resolution and component flags
        section.extend_from_slice(&sign_magnitude_i32(micro(self.la2)));
        section.extend_from_slice(&sign_magnitude_i32(micro(self.lo2)));
        section.extend_from_slice(&sign_magnitude_i32(micro(self.di)));
        section.extend_from_slice(&sign_magnitude_i32(micro(self.dj)));
        section.push(self.scanning_mode);

        section
    }

    fn build_section4(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&34u32.to_be_bytes());
        section.push(4);

        section.extend_from_slice(&0u16.to_be_bytes()); // Number of coordinate values
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 4.0

        section.push(self.param_category);
        section.push(self.param_number);
        section.push(2); // Type of generating process (forecast)
        section.push(0); // Background generating process
        section.push(96); // Analysis or forecast process (GFS)
        section.extend_from_slice(&0u16.to_be_bytes()); // Hours of cutoff
        section.push(0); // Minutes of cutoff
        section.push(1); // Time range unit (hours)
        section.extend_from_slice(&self.forecast_hour.to_be_bytes());

        section.push(self.level_type);
        section.push(0); // Scale factor
        section.extend_from_slice(&self.level_value.to_be_bytes());

        section.push(255); // No second fixed surface
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        section
    }

    fn build_section5(&self, packing: &Packing) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(5);

        section.extend_from_slice(&(packing.packed_count as u32).to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 5.0

        section.extend_from_slice(&packing.reference_value.to_be_bytes());
        section.extend_from_slice(&sign_magnitude_i16(packing.binary_scale_factor));
        section.extend_from_slice(&sign_magnitude_i16(self.decimal_scale_factor));
        section.push(packing.bits_per_value);
        section.push(0); // Original field type (floating point)

        section
    }

    fn build_section6(&self) -> Vec<u8> {
        let mut section = Vec::new();

        if !self.data_values.iter().any(|v| v.is_nan()) {
            section.extend_from_slice(&6u32.to_be_bytes());
            section.push(6);
            section.push(255); // No bitmap
            return section;
        }

        let mut bitmap = vec![0u8; self.data_values.len().div_ceil(8)];
        for (i, value) in self.data_values.iter().enumerate() {
            if !value.is_nan() {
                bitmap[i / 8] |= 0x80 >> (i % 8);
            }
        }

        section.extend_from_slice(&(6 + bitmap.len() as u32).to_be_bytes());
        section.push(6);
        section.push(0); // Bitmap follows
        section.extend_from_slice(&bitmap);
        section
    }

    fn build_section7(&self, packing: &Packing) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&(5 + packing.data.len() as u32).to_be_bytes());
        section.push(7);
        section.extend_from_slice(&packing.data);
        section
    }

    /// 16-bit simple packing of the present values.
    ///
    /// Packed as X = (value * 10^D - R) / 2^E with R the scaled minimum.
    fn packing(&self) -> Packing {
        let decimal = 10.0_f64.powi(self.decimal_scale_factor as i32);
        let scaled: Vec<f64> = self
            .data_values
            .iter()
            .filter(|v| !v.is_nan())
            .map(|&v| v as f64 * decimal)
            .collect();

        let (min_val, max_val) = scaled
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| {
                (min.min(v), max.max(v))
            });

        if scaled.is_empty() || max_val - min_val == 0.0 {
            return Packing {
                reference_value: if scaled.is_empty() { 0.0 } else { min_val as f32 },
                binary_scale_factor: 0,
                bits_per_value: 0,
                packed_count: scaled.len(),
                data: Vec::new(),
            };
        }

        let reference_value = min_val as f32;
        let range = max_val - reference_value as f64;
        let binary_scale_factor = (range / 65535.0).log2().ceil() as i16;
        let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);

        let mut data = Vec::with_capacity(scaled.len() * 2);
        for v in &scaled {
            let packed = ((v - reference_value as f64) / binary_scale)
                .round()
                .clamp(0.0, 65535.0) as u16;
            data.extend_from_slice(&packed.to_be_bytes());
        }

        Packing {
            reference_value,
            binary_scale_factor,
            bits_per_value: 16,
            packed_count: scaled.len(),
            data,
        }
    }
}

struct Packing {
    reference_value: f32,
    binary_scale_factor: i16,
    bits_per_value: u8,
    packed_count: usize,
    data: Vec<u8>,
}

/// Concatenate messages into a multi-band file.
///
/// Every band defaults to a small constant filler message; selected bands
/// are replaced with the caller's builders. Zero padding may be appended
/// to push the file past a size threshold.
#[derive(Debug, Clone)]
pub struct Grib2FileBuilder {
    bands: Vec<Grib2Builder>,
    padding: usize,
}

impl Grib2FileBuilder {
    /// `band_count` filler bands on the default GFS subregion grid.
    pub fn new(band_count: usize) -> Self {
        Self::with_template(band_count, Grib2Builder::new_gfs())
    }

    /// `band_count` bands cloned from `template`.
    pub fn with_template(band_count: usize, template: Grib2Builder) -> Self {
        Self {
            bands: vec![template; band_count],
            padding: 0,
        }
    }

    /// Replace the 1-based band `index`, growing the file with filler as needed.
    pub fn band(mut self, index: usize, builder: Grib2Builder) -> Self {
        assert!(index >= 1, "bands are 1-based");
        if self.bands.len() < index {
            let filler = self
                .bands
                .last()
                .cloned()
                .unwrap_or_else(Grib2Builder::new_gfs);
            self.bands.resize(index, filler);
        }
        self.bands[index - 1] = builder;
        self
    }

    /// Append zero bytes after the last message.
    pub fn padded(mut self, bytes: usize) -> Self {
        self.padding = bytes;
        self
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for band in &self.bands {
            out.extend_from_slice(&band.build());
        }
        out.resize(out.len() + self.padding, 0);
        out
    }
}

fn micro(degrees: f64) -> i32 {
    (degrees * 1e6).round() as i32
}

/// GRIB2 encodes negative integers as sign-magnitude, not two's complement.
fn sign_magnitude_i32(value: i32) -> [u8; 4] {
    let magnitude = value.unsigned_abs() & 0x7FFF_FFFF;
    let raw = if value < 0 { magnitude | 0x8000_0000 } else { magnitude };
    raw.to_be_bytes()
}

fn sign_magnitude_i16(value: i16) -> [u8; 2] {
    let magnitude = value.unsigned_abs() & 0x7FFF;
    let raw = if value < 0 { magnitude | 0x8000 } else { magnitude };
    raw.to_be_bytes()
}
