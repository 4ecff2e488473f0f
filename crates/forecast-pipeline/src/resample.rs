//! Grid upsampling and box-average smoothing.
//!
//! Coarse 0.25° fields are expanded by block replication and then smoothed
//! with a uniform `factor x factor` window, which turns the blocky result
//! into something contourable at chart resolution.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::grid::Grid;

/// Positive integer upsampling factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UpsampleFactor(u32);

impl UpsampleFactor {
    pub const DEFAULT: UpsampleFactor = UpsampleFactor(50);

    pub fn new(factor: u32) -> Result<Self> {
        if factor == 0 {
            return Err(PipelineError::validation(
                "upsample factor must be a positive integer, got 0",
            ));
        }
        Ok(Self(factor))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for UpsampleFactor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for UpsampleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for UpsampleFactor {
    type Error = PipelineError;

    fn try_from(value: i64) -> Result<Self> {
        let factor = u32::try_from(value).map_err(|_| {
            PipelineError::validation(format!(
                "upsample factor must be a positive integer, got {}",
                value
            ))
        })?;
        Self::new(factor)
    }
}

impl TryFrom<f64> for UpsampleFactor {
    type Error = PipelineError;

    fn try_from(value: f64) -> Result<Self> {
        if !value.is_finite() || value.fract() != 0.0 || value > u32::MAX as f64 {
            return Err(PipelineError::validation(format!(
                "upsample factor must be a positive integer, got {}",
                value
            )));
        }
        Self::try_from(value as i64)
    }
}

impl FromStr for UpsampleFactor {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let value: i64 = s.trim().parse().map_err(|_| {
            PipelineError::validation(format!(
                "upsample factor must be a positive integer, got '{}'",
                s
            ))
        })?;
        Self::try_from(value)
    }
}

/// Nearest-neighbour expansion: each cell becomes a `factor x factor` block.
pub fn block_expand(grid: &Grid, factor: UpsampleFactor) -> Grid {
    let f = factor.get() as usize;
    let (width, height) = (grid.width(), grid.height());
    let out_width = width * f;

    let mut data = Vec::with_capacity(out_width * height * f);
    for row in grid.data().chunks(width.max(1)).take(height) {
        let expanded: Vec<f32> = row
            .iter()
            .flat_map(|&v| std::iter::repeat(v).take(f))
            .collect();
        for _ in 0..f {
            data.extend_from_slice(&expanded);
        }
    }

    // Dimensions are consistent by construction
    Grid::new(data, out_width, height * f).unwrap_or_else(|_| Grid::filled(f32::NAN, 0, 0))
}

/// Uniform `window x window` mean with reflected edges (`d c b a | a b c d | d c b a`).
///
/// The window around index `i` spans `i - (window - 1 - window / 2)` to
/// `i + window / 2`, so even windows lean one cell towards higher indices.
/// NaN inside a window makes that output NaN.
pub fn box_smooth(grid: &Grid, window: UpsampleFactor) -> Grid {
    let w = window.get() as usize;
    let (width, height) = (grid.width(), grid.height());
    if w == 1 || width == 0 || height == 0 {
        return grid.clone();
    }

    // Rows
    let mut horizontal = vec![0.0_f32; width * height];
    let mut line = vec![0.0_f32; width.max(height)];
    for r in 0..height {
        let src = &grid.data()[r * width..(r + 1) * width];
        mean_filter_1d(src, &mut line[..width], w);
        horizontal[r * width..(r + 1) * width].copy_from_slice(&line[..width]);
    }

    // Columns
    let mut out = vec![0.0_f32; width * height];
    let mut column = vec![0.0_f32; height];
    for c in 0..width {
        for r in 0..height {
            column[r] = horizontal[r * width + c];
        }
        mean_filter_1d(&column, &mut line[..height], w);
        for r in 0..height {
            out[r * width + c] = line[r];
        }
    }

    Grid::new(out, width, height).unwrap_or_else(|_| grid.clone())
}

/// Expand by `factor`, then smooth with a `factor`-wide window.
pub fn resample(grid: &Grid, factor: UpsampleFactor) -> Grid {
    box_smooth(&block_expand(grid, factor), factor)
}

/// 1-D running mean over a reflected signal using a prefix sum.
fn mean_filter_1d(src: &[f32], dst: &mut [f32], w: usize) {
    let n = src.len();
    let before = w - 1 - w / 2;

    // Padded signal covers indices -before ..= n - 1 + w / 2
    let mut prefix = Vec::with_capacity(n + w);
    prefix.push(0.0_f64);
    let mut acc = 0.0_f64;
    for k in 0..(n + w - 1) {
        let idx = k as i64 - before as i64;
        acc += src[reflect(idx, n)] as f64;
        prefix.push(acc);
    }

    // NaN poisons a prefix sum permanently, so windows are checked directly
    // once one has been seen.
    let has_nan = src.iter().any(|v| v.is_nan());

    for (i, out) in dst.iter_mut().enumerate() {
        if has_nan {
            let window_has_nan = (0..w).any(|k| {
                let idx = (i + k) as i64 - before as i64;
                src[reflect(idx, n)].is_nan()
            });
            if window_has_nan {
                *out = f32::NAN;
                continue;
            }
            let sum: f64 = (0..w)
                .map(|k| src[reflect((i + k) as i64 - before as i64, n)] as f64)
                .sum();
            *out = (sum / w as f64) as f32;
        } else {
            *out = ((prefix[i + w] - prefix[i]) / w as f64) as f32;
        }
    }
}

/// Map an out-of-range index into `0..n` by mirror reflection including
/// the edge sample, repeating for windows wider than the signal.
fn reflect(idx: i64, n: usize) -> usize {
    let n = n as i64;
    let period = 2 * n;
    let m = idx.rem_euclid(period);
    (if m < n { m } else { period - 1 - m }) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{assert_approx_eq, assert_grid_approx_eq};

    fn factor(f: u32) -> UpsampleFactor {
        UpsampleFactor::new(f).unwrap()
    }

    #[test]
    fn test_factor_validation() {
        assert!(UpsampleFactor::try_from(0_i64).is_err());
        assert!(UpsampleFactor::try_from(-3_i64).is_err());
        assert!(UpsampleFactor::try_from(2.5_f64).is_err());
        assert!(UpsampleFactor::try_from(f64::NAN).is_err());
        assert!("abc".parse::<UpsampleFactor>().is_err());
        assert_eq!(UpsampleFactor::try_from(4.0_f64).unwrap().get(), 4);
        assert_eq!("50".parse::<UpsampleFactor>().unwrap(), UpsampleFactor::DEFAULT);
    }

    #[test]
    fn test_block_expand_2x2() {
        let grid = Grid::new(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        let expanded = block_expand(&grid, factor(2));

        assert_eq!(expanded.width(), 4);
        assert_eq!(expanded.height(), 4);
        #[rustfmt::skip]
        assert_eq!(expanded.data(), &[
            1.0, 1.0, 2.0, 2.0,
            1.0, 1.0, 2.0, 2.0,
            3.0, 3.0, 4.0, 4.0,
            3.0, 3.0, 4.0, 4.0,
        ]);
    }

    #[test]
    fn test_factor_one_is_identity() {
        let grid = Grid::new(vec![1.0, 5.0, -2.0, 7.0, 0.5, 3.0], 3, 2).unwrap();
        assert_eq!(resample(&grid, factor(1)), grid);
    }

    #[test]
    fn test_reflect() {
        // d c b a | a b c d | d c b a
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(9, 4), 1);
        assert_eq!(reflect(-5, 4), 3);
    }

    #[test]
    fn test_smooth_constant_field_unchanged() {
        let grid = Grid::filled(7.5, 5, 4);
        let smoothed = box_smooth(&grid, factor(3));
        assert!(smoothed.data().iter().all(|&v| (v - 7.5).abs() < 1e-6));
    }

    #[test]
    fn test_smooth_odd_window_1d() {
        // Single row [1, 2, 3, 4] with window 3, reflected: 1 1 2 3 4 4
        let grid = Grid::new(vec![1.0, 2.0, 3.0, 4.0], 4, 1).unwrap();
        let smoothed = box_smooth(&grid, factor(3));
        let expected = [4.0 / 3.0, 2.0, 3.0, 11.0 / 3.0];
        assert_grid_approx_eq!(smoothed.data().to_vec(), expected.to_vec(), 1e-5);
    }

    #[test]
    fn test_smooth_even_window_leans_forward() {
        // Window 2 covers [i, i + 1]: means of (1,2) (2,3) (3,4) (4,4)
        let grid = Grid::new(vec![1.0, 2.0, 3.0, 4.0], 4, 1).unwrap();
        let smoothed = box_smooth(&grid, factor(2));
        assert_grid_approx_eq!(smoothed.data().to_vec(), vec![1.5, 2.5, 3.5, 4.0], 1e-6);
    }

    #[test]
    fn test_smooth_window_wider_than_signal() {
        let grid = Grid::new(vec![0.0, 6.0], 2, 1).unwrap();
        let smoothed = box_smooth(&grid, factor(4));
        // Reflected signal ... 6 0 | 0 6 | 6 0 ...; window offsets -1..=2
        assert_approx_eq!(smoothed.data()[0], 3.0, 1e-6);
        assert_approx_eq!(smoothed.data()[1], 3.0, 1e-6);
    }

    #[test]
    fn test_smooth_propagates_nan() {
        let grid = Grid::new(vec![1.0, f32::NAN, 1.0, 1.0, 1.0, 1.0, 1.0], 7, 1).unwrap();
        let smoothed = box_smooth(&grid, factor(3));
        assert!(smoothed.data()[0].is_nan());
        assert!(smoothed.data()[2].is_nan());
        assert_approx_eq!(smoothed.data()[5], 1.0, 1e-6);
    }

    #[test]
    fn test_resample_dimensions_and_mean() {
        let grid = Grid::new(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        let out = resample(&grid, factor(3));
        assert_eq!((out.width(), out.height()), (6, 6));
        let stats = out.stats().unwrap();
        assert!(stats.min >= 1.0 && stats.max <= 4.0);
    }
}
