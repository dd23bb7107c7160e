use std::fmt;

use itertools::Itertools;
use log::debug;
use serde::{Serialize, Serializer};

use super::{
    Deviation, TimedLap, mean, min, outliers::OutlierFilter, round_s, round_score,
    segmenter::segment, std_dev,
};
use crate::{
    config::{AnalysisConfig, FuelModel},
    laps::{Compound, Lap},
};

/// A lap with its estimated fuel load and the lap time that load costs.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FuelCorrectedLap {
    pub lap_number: u32,
    pub compound: Compound,
    pub tyre_age: u32,
    pub lap_time_s: Option<f64>,
    /// Race laps still to run after this one, never negative
    pub laps_remaining: u32,
    pub estimated_fuel_load_kg: f64,
    pub fuel_correction_s: f64,
    /// Lap time with an empty tank
    pub corrected_lap_time_s: Option<f64>,
    /// Gap to the best corrected lap in the table
    pub delta_to_best_s: Option<f64>,
}

impl TimedLap for FuelCorrectedLap {
    fn lap_number(&self) -> u32 {
        self.lap_number
    }

    fn pace_s(&self) -> Option<f64> {
        self.corrected_lap_time_s
    }
}

impl FuelCorrectedLap {
    fn rounded(self) -> Self {
        Self {
            estimated_fuel_load_kg: round_s(self.estimated_fuel_load_kg),
            fuel_correction_s: round_s(self.fuel_correction_s),
            corrected_lap_time_s: self.corrected_lap_time_s.map(round_s),
            delta_to_best_s: self.delta_to_best_s.map(round_s),
            ..self
        }
    }
}

/// Fuel corrected pace over a set of clean laps.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PaceSummary {
    pub avg_corrected_pace: Option<f64>,
    pub best_corrected_lap: Option<f64>,
    /// Sample standard deviation, needs at least two laps
    pub consistency_std: Option<f64>,
    pub laps_analyzed: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StintPace {
    pub stint_number: u32,
    pub compound: Compound,
    pub stint_length: usize,
    pub avg_corrected_pace: f64,
    pub best_corrected_lap: f64,
    pub consistency: f64,
    pub avg_fuel_load_kg: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TruePaceAdvantage {
    pub qualifying_time: f64,
    pub race_pace: f64,
    pub fuel_effect: f64,
    pub corrected_race_pace: f64,
    /// Corrected race pace minus qualifying time, the part fuel does not explain
    pub true_pace_loss: f64,
    pub true_pace_loss_pct: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuelCall {
    Push,
    FuelSave,
    Maintain,
}

impl fmt::Display for FuelCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuelCall::Push => write!(f, "Push"),
            FuelCall::FuelSave => write!(f, "Fuel Save"),
            FuelCall::Maintain => write!(f, "Maintain"),
        }
    }
}

impl Serialize for FuelCall {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FuelStrategy {
    pub best_corrected_pace: f64,
    pub avg_corrected_pace: f64,
    /// Average minus best corrected pace
    pub pace_margin: f64,
    pub consistency: Option<f64>,
    pub potential_fuel_saving_kg: f64,
    pub recommendation: FuelCall,
}

/// Consistency below this (s) means the car can be pushed
const PUSH_CONSISTENCY_S: f64 = 0.2;
/// Pace margin above this (s) leaves room to save fuel
const FUEL_SAVE_MARGIN_S: f64 = 0.5;
const MIN_STINT_PACE_LAPS: usize = 2;

pub struct FuelCorrector {
    model: FuelModel,
    filter: OutlierFilter,
}

impl Default for FuelCorrector {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl FuelCorrector {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            model: config.fuel.clone(),
            filter: OutlierFilter::new(&config.outliers, true),
        }
    }

    pub fn model(&self) -> &FuelModel {
        &self.model
    }

    /// Linear burn-down: the car carries `(race_laps - lap) x consumption` kg,
    /// and every kg costs `fuel_effect` seconds.
    fn correct(&self, laps: &[Lap], race_laps: u32) -> Vec<FuelCorrectedLap> {
        let mut corrected = laps
            .iter()
            .map(|lap| {
                let laps_remaining = race_laps.saturating_sub(lap.lap_number);
                let estimated_fuel_load_kg =
                    f64::from(laps_remaining) * self.model.consumption_kg_per_lap;
                let fuel_correction_s = estimated_fuel_load_kg * self.model.fuel_effect_s_per_kg;
                FuelCorrectedLap {
                    lap_number: lap.lap_number,
                    compound: lap.compound,
                    tyre_age: lap.tyre_age,
                    lap_time_s: lap.lap_time_s,
                    laps_remaining,
                    estimated_fuel_load_kg,
                    fuel_correction_s,
                    corrected_lap_time_s: lap.lap_time_s.map(|t| t - fuel_correction_s),
                    delta_to_best_s: None,
                }
            })
            .collect_vec();

        let best = min(&corrected.iter().filter_map(|l| l.corrected_lap_time_s).collect_vec());
        if let Some(best) = best {
            for lap in corrected.iter_mut() {
                lap.delta_to_best_s = lap.corrected_lap_time_s.map(|t| t - best);
            }
        }
        corrected
    }

    pub fn calculate_fuel_corrected_pace(&self, laps: &[Lap], race_laps: u32) -> Vec<FuelCorrectedLap> {
        self.correct(laps, race_laps)
            .into_iter()
            .map(FuelCorrectedLap::rounded)
            .collect()
    }

    /// Clean corrected times: the outlier filter runs on corrected times of
    /// exactly the laps given.
    fn clean_corrected_times(&self, corrected: &[FuelCorrectedLap]) -> Vec<f64> {
        self.filter
            .apply(corrected)
            .into_iter()
            .filter_map(|lap| lap.corrected_lap_time_s)
            .collect()
    }

    /// Unrounded mean clean corrected lap time.
    pub(crate) fn mean_corrected_pace(&self, laps: &[Lap], race_laps: u32) -> Option<f64> {
        mean(&self.clean_corrected_times(&self.correct(laps, race_laps)))
    }

    pub fn pace_summary(&self, laps: &[Lap], race_laps: u32) -> PaceSummary {
        let corrected = self.correct(laps, race_laps);
        let times = self.clean_corrected_times(&corrected);
        PaceSummary {
            avg_corrected_pace: mean(&times).map(round_s),
            best_corrected_lap: min(&times).map(round_s),
            consistency_std: std_dev(&times, Deviation::Sample).map(round_s),
            laps_analyzed: times.len(),
        }
    }

    /// Mean clean lap time before any fuel correction.
    pub fn race_pace(&self, laps: &[Lap]) -> Option<f64> {
        let times = self
            .filter
            .apply(laps)
            .into_iter()
            .filter_map(|lap| lap.lap_time_s)
            .collect_vec();
        mean(&times).map(round_s)
    }

    /// Corrected pace per stint, filtering each stint on its own.
    pub fn analyze_stint_pace(&self, laps: &[Lap], race_laps: u32) -> Vec<StintPace> {
        segment(laps)
            .into_iter()
            .filter_map(|stint| {
                let corrected = self.correct(&stint.laps, race_laps);
                let clean = self.filter.apply(&corrected);
                if clean.len() < MIN_STINT_PACE_LAPS {
                    debug!(
                        "Skipping stint {} pace: {} clean laps",
                        stint.stint_number,
                        clean.len()
                    );
                    return None;
                }
                let times = clean.iter().filter_map(|l| l.corrected_lap_time_s).collect_vec();
                let loads = clean.iter().map(|l| l.estimated_fuel_load_kg).collect_vec();
                Some(StintPace {
                    stint_number: stint.stint_number,
                    compound: stint.compound,
                    stint_length: stint.length(),
                    avg_corrected_pace: round_s(mean(&times)?),
                    best_corrected_lap: round_s(min(&times)?),
                    consistency: round_s(std_dev(&times, Deviation::Sample)?),
                    avg_fuel_load_kg: round_s(mean(&loads)?),
                })
            })
            .collect()
    }

    /// Compare a low fuel qualifying lap with race pace carrying `fuel_load_kg`.
    pub fn true_pace_advantage(
        &self,
        qualifying_time: f64,
        race_pace: f64,
        fuel_load_kg: f64,
    ) -> TruePaceAdvantage {
        let fuel_effect = fuel_load_kg * self.model.fuel_effect_s_per_kg;
        let corrected_race_pace = race_pace - fuel_effect;
        let true_pace_loss = corrected_race_pace - qualifying_time;
        TruePaceAdvantage {
            qualifying_time: round_s(qualifying_time),
            race_pace: round_s(race_pace),
            fuel_effect: round_s(fuel_effect),
            corrected_race_pace: round_s(corrected_race_pace),
            true_pace_loss: round_s(true_pace_loss),
            true_pace_loss_pct: round_score(true_pace_loss / qualifying_time * 100.),
        }
    }

    /// `None` when no lap survives the outlier filter.
    pub fn estimate_fuel_strategy(&self, laps: &[Lap], race_laps: u32) -> Option<FuelStrategy> {
        let corrected = self.correct(laps, race_laps);
        let times = self.clean_corrected_times(&corrected);

        let best_pace = min(&times)?;
        let avg_pace = mean(&times)?;
        let consistency = std_dev(&times, Deviation::Sample);
        let pace_margin = avg_pace - best_pace;

        let recommendation = match consistency {
            Some(c) if c < PUSH_CONSISTENCY_S => FuelCall::Push,
            _ if pace_margin > FUEL_SAVE_MARGIN_S => FuelCall::FuelSave,
            _ => FuelCall::Maintain,
        };

        Some(FuelStrategy {
            best_corrected_pace: round_s(best_pace),
            avg_corrected_pace: round_s(avg_pace),
            pace_margin: round_s(pace_margin),
            consistency: consistency.map(round_s),
            potential_fuel_saving_kg: round_score(pace_margin / self.model.fuel_effect_s_per_kg),
            recommendation,
        })
    }
}
