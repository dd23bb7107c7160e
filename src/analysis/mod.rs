//! Race strategy analytics over complete lap tables.
//!
//! Every analyzer here is a pure, synchronous transform: the same lap table
//! always produces the same result. Stint and driver results that lack enough
//! clean laps are left out of the output instead of being reported as errors.

pub mod comparison;
pub mod degradation;
pub mod fuel;
pub mod outliers;
pub mod regression;
pub mod scoring;
pub mod segmenter;
pub mod stints;

use std::cmp::Ordering;

use crate::laps::{Compound, Lap};

/// A lap with a pace figure the outlier filter can judge.
pub trait TimedLap {
    fn lap_number(&self) -> u32;
    /// Pace used for filtering, `None` when the lap has no valid time
    fn pace_s(&self) -> Option<f64>;
}

impl TimedLap for Lap {
    fn lap_number(&self) -> u32 {
        self.lap_number
    }

    fn pace_s(&self) -> Option<f64> {
        self.lap_time_s
    }
}

/// Anything the stint scorer can evaluate.
pub trait ScorableStint {
    fn compound(&self) -> Compound;
    fn stint_length(&self) -> usize;
    /// Standard deviation of clean lap times (s)
    fn consistency(&self) -> f64;
    /// Signed degradation rate (s/lap), positive when slowing down
    fn degradation_rate(&self) -> f64;
}

/// Which variance estimator to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deviation {
    /// Divide by n
    Population,
    /// Divide by n - 1
    Sample,
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.)
    } else {
        Some(sorted[mid])
    }
}

pub(crate) fn std_dev(values: &[f64], deviation: Deviation) -> Option<f64> {
    let avg = mean(values)?;
    let denominator = match deviation {
        Deviation::Population => values.len(),
        Deviation::Sample => values.len().checked_sub(1).filter(|n| *n > 0)?,
    };
    let sum_sq = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>();
    Some((sum_sq / denominator as f64).sqrt())
}

pub(crate) fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// Round to a fixed number of decimals for stable output.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Seconds are reported with 3 decimals
pub(crate) fn round_s(value: f64) -> f64 {
    round_to(value, 3)
}

/// Rates (s/lap, %/lap) are reported with 4 decimals
pub(crate) fn round_rate(value: f64) -> f64 {
    round_to(value, 4)
}

/// Scores and percentages are reported with 1 decimal
pub(crate) fn round_score(value: f64) -> f64 {
    round_to(value, 1)
}
