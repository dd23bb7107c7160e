use itertools::Itertools;
use log::{debug, warn};
use serde::Serialize;

use super::{
    Deviation, ScorableStint, mean, min,
    outliers::OutlierFilter,
    regression::RansacRegressor,
    round_rate, round_s,
    scoring::{PerformanceEvaluation, StintScorer},
    segmenter::{Stint, segment},
    std_dev,
};
use crate::{
    config::{AnalysisConfig, FuelModel},
    laps::{Compound, Lap},
};

const MIN_STINT_LAPS: usize = 2;
const MIN_TREND_LAPS: usize = 3;

/// Lightweight per-stint summary, available for stints too short for a
/// degradation fit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StintSummary {
    pub stint_number: u32,
    pub compound: Compound,
    pub start_lap: u32,
    pub end_lap: u32,
    /// Laps in the stint before outlier filtering
    pub stint_length: usize,
    pub clean_laps: usize,
    pub tyre_age_start: u32,
    pub avg_lap_time: f64,
    pub best_lap_time: f64,
    /// Sample standard deviation of the clean lap times
    pub consistency: f64,
    /// Lap time trend over the stint (s/lap), absent below 3 clean laps
    pub degradation_rate: Option<f64>,
    /// Average lap time less half the fuel burned over the stint
    pub fuel_corrected_pace: f64,
}

impl ScorableStint for StintSummary {
    fn compound(&self) -> Compound {
        self.compound
    }

    fn stint_length(&self) -> usize {
        self.stint_length
    }

    fn consistency(&self) -> f64 {
        self.consistency
    }

    fn degradation_rate(&self) -> f64 {
        self.degradation_rate.unwrap_or(0.)
    }
}

pub struct StintPerformanceAnalyzer {
    filter: OutlierFilter,
    regressor: RansacRegressor,
    fuel: FuelModel,
    scorer: StintScorer,
}

impl Default for StintPerformanceAnalyzer {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl StintPerformanceAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            // stints are judged on their own median, the opening lap stays in
            filter: OutlierFilter::new(&config.outliers, false),
            regressor: RansacRegressor::new(&config.regression),
            fuel: config.fuel.clone(),
            scorer: StintScorer::new(config),
        }
    }

    pub fn analyze_all_stints(&self, laps: &[Lap]) -> Vec<StintSummary> {
        segment(laps)
            .iter()
            .filter(|stint| stint.length() >= MIN_STINT_LAPS)
            .filter_map(|stint| self.summarise(stint))
            .collect()
    }

    pub fn evaluate_stint_performance(&self, summary: &StintSummary) -> PerformanceEvaluation {
        self.scorer.evaluate(summary)
    }

    fn summarise(&self, stint: &Stint) -> Option<StintSummary> {
        let times = self
            .filter
            .apply(&stint.laps)
            .into_iter()
            .filter_map(|lap| lap.lap_time_s)
            .collect_vec();
        if times.len() < MIN_STINT_LAPS {
            debug!(
                "Dropping stint {}: {} clean laps",
                stint.stint_number,
                times.len()
            );
            return None;
        }

        let avg_lap_time = mean(&times)?;
        let degradation_rate = (times.len() >= MIN_TREND_LAPS).then(|| {
            let positions = (0..times.len()).map(|i| i as f64).collect_vec();
            match self.regressor.fit(&positions, &times) {
                Ok(fit) => round_rate(fit.slope),
                Err(e) => {
                    warn!("Stint {} trend fit failed: {e}", stint.stint_number);
                    0.
                }
            }
        });
        let fuel_burned_s = stint.length() as f64
            * self.fuel.consumption_kg_per_lap
            * self.fuel.fuel_effect_s_per_kg;

        Some(StintSummary {
            stint_number: stint.stint_number,
            compound: stint.compound,
            start_lap: stint.start_lap,
            end_lap: stint.end_lap,
            stint_length: stint.length(),
            clean_laps: times.len(),
            tyre_age_start: stint.tyre_age_start,
            avg_lap_time: round_s(avg_lap_time),
            best_lap_time: round_s(min(&times)?),
            consistency: round_s(std_dev(&times, Deviation::Sample)?),
            degradation_rate,
            fuel_corrected_pace: round_s(avg_lap_time - fuel_burned_s / 2.),
        })
    }
}
