//! Outlier tolerant straight line fits.
//!
//! [`RansacRegressor`] fits a line through every candidate pair of points,
//! keeps the candidate that explains the most points within the residual
//! threshold, then refits ordinary least squares on that consensus set.
//! Stints are short, so when the number of pairs is within `max_trials` every
//! pair is tried and the result involves no randomness at all. Larger inputs
//! draw `max_trials` pairs from an RNG seeded with `seed` (42 by default), so
//! repeated fits over the same data always agree.

use std::cmp::Ordering;

use rand::{SeedableRng, rngs::StdRng, seq::index};
use snafu::Snafu;

use super::median;
use crate::config::RegressionSettings;

/// Residual threshold floor, keeps exact fits working when the MAD is zero
const MIN_RESIDUAL_THRESHOLD: f64 = 1e-6;

#[derive(Debug, Snafu, PartialEq)]
pub enum FitError {
    #[snafu(display("Need at least 2 points with matching lengths, got {x_len} x and {y_len} y values"))]
    TooFewPoints { x_len: usize, y_len: usize },
    #[snafu(display("No candidate line found a consensus set"))]
    NoConsensus,
    #[snafu(display("Fitted model has non-finite coefficients"))]
    NonFiniteModel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Points used by the final least squares fit
    pub inliers: usize,
}

/// Ordinary least squares. `None` when all x values are equal.
pub fn least_squares(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    if x.len() != y.len() || x.is_empty() {
        return None;
    }
    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;
    let (sxy, sxx) = x.iter().zip(y).fold((0., 0.), |(sxy, sxx), (xi, yi)| {
        let dx = xi - x_mean;
        (sxy + dx * (yi - y_mean), sxx + dx * dx)
    });
    if sxx == 0. {
        return None;
    }
    let slope = sxy / sxx;
    Some(LinearFit {
        slope,
        intercept: y_mean - slope * x_mean,
        inliers: x.len(),
    })
}

struct Candidate {
    inliers: Vec<usize>,
    residual_sq: f64,
}

#[derive(Debug, Clone)]
pub struct RansacRegressor {
    max_trials: usize,
    seed: u64,
    /// Fixed residual threshold, the median absolute deviation of y when unset
    residual_threshold: Option<f64>,
}

impl Default for RansacRegressor {
    fn default() -> Self {
        Self::new(&RegressionSettings::default())
    }
}

impl RansacRegressor {
    pub fn new(settings: &RegressionSettings) -> Self {
        Self {
            max_trials: settings.max_trials,
            seed: settings.seed,
            residual_threshold: settings.residual_threshold_s,
        }
    }

    pub fn fit(&self, x: &[f64], y: &[f64]) -> Result<LinearFit, FitError> {
        if x.len() != y.len() || x.len() < 2 {
            return Err(FitError::TooFewPoints {
                x_len: x.len(),
                y_len: y.len(),
            });
        }

        let threshold = self
            .residual_threshold
            .unwrap_or_else(|| median_absolute_deviation(y))
            .max(MIN_RESIDUAL_THRESHOLD);

        let mut best: Option<Candidate> = None;
        for (i, j) in self.candidate_pairs(x.len()) {
            if x[i] == x[j] {
                continue;
            }
            let slope = (y[j] - y[i]) / (x[j] - x[i]);
            let intercept = y[i] - slope * x[i];
            if !slope.is_finite() || !intercept.is_finite() {
                continue;
            }

            let mut candidate = Candidate {
                inliers: Vec::new(),
                residual_sq: 0.,
            };
            for (k, (xk, yk)) in x.iter().zip(y).enumerate() {
                let residual = yk - (intercept + slope * xk);
                if residual.abs() <= threshold {
                    candidate.inliers.push(k);
                    candidate.residual_sq += residual * residual;
                }
            }

            let better = match &best {
                None => true,
                Some(current) => match candidate.inliers.len().cmp(&current.inliers.len()) {
                    Ordering::Greater => true,
                    Ordering::Equal => candidate.residual_sq < current.residual_sq,
                    Ordering::Less => false,
                },
            };
            if better {
                best = Some(candidate);
            }
        }

        let best = best.ok_or(FitError::NoConsensus)?;
        let inlier_x: Vec<f64> = best.inliers.iter().map(|k| x[*k]).collect();
        let inlier_y: Vec<f64> = best.inliers.iter().map(|k| y[*k]).collect();
        let fit = least_squares(&inlier_x, &inlier_y).ok_or(FitError::NoConsensus)?;
        if !fit.slope.is_finite() || !fit.intercept.is_finite() {
            return Err(FitError::NonFiniteModel);
        }
        Ok(fit)
    }

    fn candidate_pairs(&self, n: usize) -> Vec<(usize, usize)> {
        let total_pairs = n * (n - 1) / 2;
        if total_pairs <= self.max_trials {
            return (0..n)
                .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
                .collect();
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.max_trials)
            .map(|_| {
                let picked = index::sample(&mut rng, n, 2);
                (picked.index(0), picked.index(1))
            })
            .collect()
    }
}

fn median_absolute_deviation(values: &[f64]) -> f64 {
    let Some(center) = median(values) else {
        return 0.;
    };
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations).unwrap_or(0.)
}
