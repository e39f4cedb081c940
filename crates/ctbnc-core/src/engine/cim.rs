//! # Conditional intensity matrices
//!
//! A [`Cim`] is a dense row-major matrix. For a continuous node it is the
//! `k×k` generator of the node's Markov chain under one parent
//! configuration; for a static node it is a single `1×k` probability row.
//!
//! ## Validity
//!
//! - Generator: off-diagonal entries `≥ 0`, diagonal `≤ 0`, every row sums
//!   to 0 within [`CIM_TOLERANCE`].
//! - Distribution: entries in `[0, 1]`, the row sums to 1 within
//!   [`CIM_TOLERANCE`].
//!
//! Non-finite entries are never valid.

use crate::engine::errors::CtbnError;

/// Row-sum tolerance shared by generator and distribution checks.
pub const CIM_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cim {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Cim {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Builds a matrix from row vectors; all rows must share one length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, CtbnError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.is_empty() || cols == 0 {
            return Err(CtbnError::Construction("CIM must not be empty".into()));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(CtbnError::Construction(format!(
                "CIM row {} has {} columns, expected {}",
                i,
                row.len(),
                cols
            )));
        }
        let n_rows = rows.len();
        Ok(Self {
            rows: n_rows,
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }

    /// Checks the generator constraints; returns the first violation.
    pub fn check_generator(&self) -> Result<(), String> {
        if self.rows != self.cols {
            return Err(format!(
                "generator must be square, got {}x{}",
                self.rows, self.cols
            ));
        }
        for i in 0..self.rows {
            let row = self.row(i);
            let mut sum = 0.0;
            for (j, &v) in row.iter().enumerate() {
                if !v.is_finite() {
                    return Err(format!("entry [{}][{}] is not finite ({})", i, j, v));
                }
                if i == j && v > 0.0 {
                    return Err(format!("diagonal entry [{}][{}] = {} is positive", i, j, v));
                }
                if i != j && v < 0.0 {
                    return Err(format!(
                        "off-diagonal entry [{}][{}] = {} is negative",
                        i, j, v
                    ));
                }
                sum += v;
            }
            if sum.abs() > CIM_TOLERANCE {
                return Err(format!("row {} sums to {:.3e}, expected 0", i, sum));
            }
        }
        Ok(())
    }

    /// Checks the probability-row constraints; returns the first violation.
    pub fn check_distribution(&self) -> Result<(), String> {
        if self.rows != 1 {
            return Err(format!("prior must have one row, got {}", self.rows));
        }
        let mut sum = 0.0;
        for (j, &v) in self.row(0).iter().enumerate() {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(format!("probability [{}] = {} outside [0, 1]", j, v));
            }
            sum += v;
        }
        if (sum - 1.0).abs() > CIM_TOLERANCE {
            return Err(format!("probabilities sum to {:.9}, expected 1", sum));
        }
        Ok(())
    }
}
