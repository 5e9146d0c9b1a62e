//! Price forecast collaborator
//!
//! The backend normally computes forecasts itself and streams them as
//! `forecast` records. This module defines the same contract locally so a
//! client can produce an overlay for a chart it already holds:
//! a least-squares polynomial fit over the closing prices, extrapolated in
//! fixed steps past the last observed date.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ForecastConfig;

/// Upper bound on forecast points per request
pub const MAX_HORIZON: usize = 12;

/// Highest polynomial degree accepted by [`PolynomialForecaster`]
pub const MAX_DEGREE: usize = 5;

/// One observed closing price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// One forecast point, as carried by `forecast` records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Forecast failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForecastError {
    /// Fewer distinct observations than the fit needs
    #[error("insufficient data: need at least {required} distinct days, got {available}")]
    InsufficientData { required: usize, available: usize },

    /// Degree outside 1..=MAX_DEGREE
    #[error("invalid polynomial degree {0}")]
    InvalidDegree(usize),

    /// NaN or infinite input or result
    #[error("non-finite value in forecast input or output")]
    NonFinite,

    /// Projected date does not fit in the calendar
    #[error("forecast date out of range")]
    OutOfRange,
}

/// Something that can extrapolate a closing-price series
#[cfg_attr(test, mockall::automock)]
pub trait Forecaster: Send + Sync {
    /// Return up to [`MAX_HORIZON`] future points, ordered by date
    fn forecast(&self, history: &[ClosePoint]) -> Result<Vec<ForecastPoint>, ForecastError>;
}

/// Least-squares polynomial trend forecaster
#[derive(Debug, Clone)]
pub struct PolynomialForecaster {
    degree: usize,
    horizon: usize,
    step_days: u64,
}

impl Default for PolynomialForecaster {
    fn default() -> Self {
        Self::from_config(&ForecastConfig::default())
    }
}

impl PolynomialForecaster {
    /// Create a forecaster from configuration
    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            degree: config.degree,
            horizon: config.horizon.min(MAX_HORIZON),
            step_days: config.step_days,
        }
    }

    fn fit(&self, xs: &[f64], ys: &[f64]) -> Option<Vec<f64>> {
        let m = self.degree + 1;
        let mut matrix = vec![vec![0.0_f64; m + 1]; m];

        for (&x, &y) in xs.iter().zip(ys) {
            let mut powers = vec![1.0_f64; 2 * m - 1];
            for k in 1..powers.len() {
                powers[k] = powers[k - 1] * x;
            }
            for row in 0..m {
                for col in 0..m {
                    matrix[row][col] += powers[row + col];
                }
                matrix[row][m] += powers[row] * y;
            }
        }

        solve(matrix)
    }
}

impl Forecaster for PolynomialForecaster {
    fn forecast(&self, history: &[ClosePoint]) -> Result<Vec<ForecastPoint>, ForecastError> {
        if self.degree == 0 || self.degree > MAX_DEGREE {
            return Err(ForecastError::InvalidDegree(self.degree));
        }
        if history.iter().any(|p| !p.close.is_finite()) {
            return Err(ForecastError::NonFinite);
        }

        let mut points = history.to_vec();
        points.sort_by_key(|p| p.date);

        let required = self.degree + 1;
        let mut distinct = points.iter().map(|p| p.date).collect::<Vec<_>>();
        distinct.dedup();
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Err(ForecastError::InsufficientData { required, available: 0 });
        };
        if distinct.len() < required {
            return Err(ForecastError::InsufficientData {
                required,
                available: distinct.len(),
            });
        }

        // Day offsets scaled to [0, 1] keep the normal equations well conditioned.
        let origin = first.date;
        let span = (last.date - origin).num_days().max(1) as f64;
        let scale = |date: NaiveDate| (date - origin).num_days() as f64 / span;

        let xs: Vec<f64> = points.iter().map(|p| scale(p.date)).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.close).collect();
        let coefficients = self
            .fit(&xs, &ys)
            .ok_or(ForecastError::InsufficientData { required, available: distinct.len() })?;

        debug!(
            degree = self.degree,
            observations = points.len(),
            horizon = self.horizon,
            "fitted forecast trend"
        );

        let mut forecast = Vec::with_capacity(self.horizon);
        for step in 1..=self.horizon as u64 {
            let date = last
                .date
                .checked_add_days(Days::new(self.step_days * step))
                .ok_or(ForecastError::OutOfRange)?;
            let price = evaluate(&coefficients, scale(date));
            if !price.is_finite() {
                return Err(ForecastError::NonFinite);
            }
            forecast.push(ForecastPoint {
                date,
                price: round_cents(price),
            });
        }

        Ok(forecast)
    }
}

/// Gaussian elimination with partial pivoting on an augmented matrix
fn solve(mut matrix: Vec<Vec<f64>>) -> Option<Vec<f64>> {
    const EPSILON: f64 = 1e-12;
    let n = matrix.len();

    for col in 0..n {
        let pivot =
            (col..n).max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))?;
        if matrix[pivot][col].abs() < EPSILON {
            return None;
        }
        matrix.swap(col, pivot);

        for row in col + 1..n {
            let factor = matrix[row][col] / matrix[col][col];
            for k in col..=n {
                matrix[row][k] -= factor * matrix[col][k];
            }
        }
    }

    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| matrix[row][k] * solution[k]).sum();
        solution[row] = (matrix[row][n] - tail) / matrix[row][row];
    }
    Some(solution)
}

fn evaluate(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
