use std::{collections::BTreeMap, fmt};

use itertools::Itertools;
use log::debug;
use serde::{
    Serialize, Serializer,
    ser::{Error as _, SerializeMap},
};

use super::{
    fuel::{FuelCorrector, PaceSummary},
    mean,
    outliers::OutlierFilter,
    round_s, round_score,
    stints::{StintPerformanceAnalyzer, StintSummary},
};
use crate::{
    config::{AnalysisConfig, UndercutModel},
    laps::{Lap, LapTable},
};

/// Writes `{ first: .., second: .., <summary_key>: .. }`, the driver keyed
/// layout of every pairwise result. Fails when two of the keys collide, as a
/// driver named after the summary key or the same driver twice would.
fn serialize_pair<S, D, C>(
    serializer: S,
    first: (&str, &D),
    second: (&str, &D),
    summary: (&str, &C),
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    D: Serialize,
    C: Serialize,
{
    if first.0 == second.0 || first.0 == summary.0 || second.0 == summary.0 {
        return Err(S::Error::custom(format!(
            "duplicate report key: drivers {:?} and {:?} next to {:?}",
            first.0, second.0, summary.0
        )));
    }
    let mut map = serializer.serialize_map(Some(3))?;
    map.serialize_entry(first.0, first.1)?;
    map.serialize_entry(second.0, second.1)?;
    map.serialize_entry(summary.0, summary.1)?;
    map.end()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaceDelta {
    /// First minus second driver's average corrected pace, negative when the first is faster
    pub pace_delta: f64,
    pub advantage_pct: f64,
    pub faster_driver: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PaceComparison {
    pub first_driver: String,
    pub first: PaceSummary,
    pub second_driver: String,
    pub second: PaceSummary,
    /// Absent when either driver has no clean laps
    pub comparison: Option<PaceDelta>,
}

impl Serialize for PaceComparison {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_pair(
            serializer,
            (self.first_driver.as_str(), &self.first),
            (self.second_driver.as_str(), &self.second),
            ("comparison", &self.comparison),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriverStrategy {
    pub num_stints: usize,
    pub stints: Vec<StintSummary>,
    pub avg_stint_length: f64,
    pub total_laps: usize,
}

impl DriverStrategy {
    fn new(stints: Vec<StintSummary>) -> Self {
        let lengths = stints.iter().map(|s| s.stint_length as f64).collect_vec();
        Self {
            num_stints: stints.len(),
            avg_stint_length: mean(&lengths).map(round_score).unwrap_or(0.),
            total_laps: stints.iter().map(|s| s.stint_length).sum(),
            stints,
        }
    }

    /// One stop fewer than there are stints
    pub fn pit_stops(&self) -> usize {
        self.num_stints.saturating_sub(1)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StrategyAnalysis {
    /// Pit stops per driver
    pub stops: BTreeMap<String, usize>,
    pub strategy_difference: usize,
    /// Driver with more stops, absent when both stopped equally often
    pub more_aggressive: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StrategyComparison {
    pub first_driver: String,
    pub first: DriverStrategy,
    pub second_driver: String,
    pub second: DriverStrategy,
    pub strategy_analysis: StrategyAnalysis,
}

impl Serialize for StrategyComparison {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_pair(
            serializer,
            (self.first_driver.as_str(), &self.first),
            (self.second_driver.as_str(), &self.second),
            ("strategy_analysis", &self.strategy_analysis),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UndercutCall {
    PitNow,
    StayOut,
    InsufficientData,
}

impl fmt::Display for UndercutCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndercutCall::PitNow => write!(f, "Pit now for undercut"),
            UndercutCall::StayOut => write!(f, "Stay out"),
            UndercutCall::InsufficientData => write!(f, "Insufficient data"),
        }
    }
}

impl Serialize for UndercutCall {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UndercutAnalysis {
    pub undercut_viable: bool,
    pub leader_pace: Option<f64>,
    pub follower_pace: Option<f64>,
    /// Follower minus leader recent pace
    pub pace_deficit: Option<f64>,
    pub estimated_undercut_gain: f64,
    pub recommendation: UndercutCall,
}

/// Pairwise comparisons between two drivers' lap tables.
pub struct PaceComparator {
    fuel: FuelCorrector,
    stints: StintPerformanceAnalyzer,
    recent_filter: OutlierFilter,
    undercut: UndercutModel,
}

impl Default for PaceComparator {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl PaceComparator {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            fuel: FuelCorrector::new(config),
            stints: StintPerformanceAnalyzer::new(config),
            recent_filter: OutlierFilter::new(&config.outliers, false),
            undercut: config.undercut.clone(),
        }
    }

    /// Both drivers are corrected to an empty tank over the same race
    /// distance and filtered independently before averaging.
    pub fn compare_race_pace(
        &self,
        first: &LapTable,
        second: &LapTable,
        race_laps: u32,
    ) -> PaceComparison {
        let first_pace = self.fuel.pace_summary(&first.laps, race_laps);
        let second_pace = self.fuel.pace_summary(&second.laps, race_laps);

        let comparison = match (
            self.fuel.mean_corrected_pace(&first.laps, race_laps),
            self.fuel.mean_corrected_pace(&second.laps, race_laps),
        ) {
            (Some(a), Some(b)) => {
                let delta = a - b;
                Some(PaceDelta {
                    pace_delta: round_s(delta),
                    advantage_pct: round_score(delta.abs() / b * 100.),
                    faster_driver: if a < b {
                        first.driver.clone()
                    } else {
                        second.driver.clone()
                    },
                })
            }
            _ => {
                debug!(
                    "No pace delta between {} and {}: missing clean laps",
                    first.driver, second.driver
                );
                None
            }
        };

        PaceComparison {
            first_driver: first.driver.clone(),
            first: first_pace,
            second_driver: second.driver.clone(),
            second: second_pace,
            comparison,
        }
    }

    pub fn compare_stint_strategies(&self, first: &LapTable, second: &LapTable) -> StrategyComparison {
        let first_strategy = DriverStrategy::new(self.stints.analyze_all_stints(&first.laps));
        let second_strategy = DriverStrategy::new(self.stints.analyze_all_stints(&second.laps));

        let first_stops = first_strategy.pit_stops();
        let second_stops = second_strategy.pit_stops();
        let more_aggressive = match first_stops.cmp(&second_stops) {
            std::cmp::Ordering::Greater => Some(first.driver.clone()),
            std::cmp::Ordering::Less => Some(second.driver.clone()),
            std::cmp::Ordering::Equal => None,
        };

        StrategyComparison {
            strategy_analysis: StrategyAnalysis {
                stops: BTreeMap::from([
                    (first.driver.clone(), first_stops),
                    (second.driver.clone(), second_stops),
                ]),
                strategy_difference: first_stops.abs_diff(second_stops),
                more_aggressive,
            },
            first_driver: first.driver.clone(),
            first: first_strategy,
            second_driver: second.driver.clone(),
            second: second_strategy,
        }
    }

    /// Mean clean lap time over the last `recent_window_laps` laps, ending
    /// with `current_lap`.
    fn recent_pace(&self, laps: &[Lap], current_lap: u32) -> Option<f64> {
        let window_start = current_lap
            .saturating_add(1)
            .saturating_sub(self.undercut.recent_window_laps);
        let recent = laps
            .iter()
            .filter(|lap| (window_start..=current_lap).contains(&lap.lap_number))
            .cloned()
            .collect_vec();
        let times = self
            .recent_filter
            .apply(&recent)
            .into_iter()
            .filter_map(|lap| lap.lap_time_s)
            .collect_vec();
        mean(&times)
    }

    /// Static undercut model: the fresh tyre gain less half the pit loss has
    /// to beat the follower's current pace deficit.
    pub fn analyze_undercut(&self, leader: &[Lap], follower: &[Lap], current_lap: u32) -> UndercutAnalysis {
        // only half of the stationary time separates the two cars
        let undercut_gain = self.undercut.fresh_tyre_advantage_s - self.undercut.pit_loss_s / 2.;

        let (Some(leader_pace), Some(follower_pace)) = (
            self.recent_pace(leader, current_lap),
            self.recent_pace(follower, current_lap),
        ) else {
            return UndercutAnalysis {
                undercut_viable: false,
                leader_pace: None,
                follower_pace: None,
                pace_deficit: None,
                estimated_undercut_gain: round_s(undercut_gain),
                recommendation: UndercutCall::InsufficientData,
            };
        };

        let pace_deficit = follower_pace - leader_pace;
        let undercut_viable = undercut_gain > pace_deficit;
        UndercutAnalysis {
            undercut_viable,
            leader_pace: Some(round_s(leader_pace)),
            follower_pace: Some(round_s(follower_pace)),
            pace_deficit: Some(round_s(pace_deficit)),
            estimated_undercut_gain: round_s(undercut_gain),
            recommendation: if undercut_viable {
                UndercutCall::PitNow
            } else {
                UndercutCall::StayOut
            },
        }
    }
}
