//! Common fixtures for pipeline tests.

/// Extents as `[west, east, north, south]`, the argument order of the
/// archive filter.
pub mod extent {
    /// Default charting extent (Poland)
    pub const POLAND: [f64; 4] = [13.0, 25.0, 56.0, 48.0];

    /// A small 2°x2° box used by synthetic files
    pub const SMALL: [f64; 4] = [14.0, 16.0, 52.0, 50.0];

    /// Only three components
    pub const TRUNCATED: [f64; 3] = [13.0, 25.0, 56.0];
}

/// Grid with value `col * 1000 + row`, row-major.
pub fn indexed_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Bytes that look like the small HTML page the filter returns for a
/// horizon that is not published yet.
pub fn not_published_page() -> Vec<u8> {
    b"<html><body><h1>Data file is not present</h1></body></html>".to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_grid() {
        let grid = indexed_grid(3, 2);
        assert_eq!(grid, vec![0.0, 1000.0, 2000.0, 1.0, 1001.0, 2001.0]);
    }
}
