//! Row-major numeric grids.

use serde::Serialize;

use crate::error::{PipelineError, Result};

/// A 2-D `f32` field, row-major, row 0 northernmost, column 0 westernmost.
/// Missing values are NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grid {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Grid {
    pub fn new(data: Vec<f32>, width: usize, height: usize) -> Result<Self> {
        if data.len() != width * height {
            return Err(PipelineError::raster(format!(
                "grid data has {} values, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(value: f32, width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.height && col < self.width {
            Some(self.data[row * self.width + col])
        } else {
            None
        }
    }

    /// Apply `f` to every cell.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Min, max and mean over finite cells; None if there are none.
    pub fn stats(&self) -> Option<GridStats> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0_f64;
        let mut count = 0usize;

        for &v in self.data.iter().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
            count += 1;
        }

        (count > 0).then(|| GridStats {
            min,
            max,
            mean: (sum / count as f64) as f32,
            valid_count: count,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub valid_count: usize,
}
