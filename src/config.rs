use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::{StintlabError, laps::Compound};

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_DIR_NAME: &str = "stintlab";

/// Linear fuel burn-down model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FuelModel {
    /// Lap time penalty per kg of fuel carried (s/kg)
    pub fuel_effect_s_per_kg: f64,
    /// Fuel burned per lap (kg)
    pub consumption_kg_per_lap: f64,
    /// Race distance used when the session does not provide one
    pub default_race_laps: u32,
    /// Starting fuel load used by the qualifying vs race pace comparison (kg)
    pub start_fuel_kg: f64,
}

impl Default for FuelModel {
    fn default() -> Self {
        Self {
            fuel_effect_s_per_kg: 0.035,
            consumption_kg_per_lap: 1.6,
            default_race_laps: 57,
            start_fuel_kg: 110.,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OutlierSettings {
    /// Laps at or above `median_factor` x median lap time are discarded
    pub median_factor: f64,
}

impl Default for OutlierSettings {
    fn default() -> Self {
        Self { median_factor: 1.5 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RegressionSettings {
    pub max_trials: usize,
    /// Seed of the sampling RNG. Only used once the candidate pairs outnumber `max_trials`
    pub seed: u64,
    /// Fixed inlier threshold (s), the median absolute deviation of the lap times when unset
    pub residual_threshold_s: Option<f64>,
}

impl Default for RegressionSettings {
    fn default() -> Self {
        Self {
            max_trials: 100,
            seed: 42,
            residual_threshold_s: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CliffSettings {
    /// Laps spanned by each windowed gradient
    pub window: usize,
    /// Last gradient must exceed `ratio` x the mean of the earlier gradients
    pub ratio: f64,
    /// Absolute floor for the last gradient (s/lap)
    pub min_gradient_s: f64,
    pub min_laps: usize,
}

impl Default for CliffSettings {
    fn default() -> Self {
        Self {
            window: 3,
            ratio: 2.,
            min_gradient_s: 0.1,
            min_laps: 5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExpectedStintLengths {
    pub soft: u32,
    pub medium: u32,
    pub hard: u32,
    /// Intermediates, wets and unknown compounds
    pub other: u32,
}

impl Default for ExpectedStintLengths {
    fn default() -> Self {
        Self {
            soft: 15,
            medium: 25,
            hard: 35,
            other: 20,
        }
    }
}

impl ExpectedStintLengths {
    pub fn for_compound(&self, compound: Compound) -> u32 {
        match compound {
            Compound::Soft => self.soft,
            Compound::Medium => self.medium,
            Compound::Hard => self.hard,
            Compound::Intermediate | Compound::Wet | Compound::Unknown => self.other,
        }
    }
}

/// Reference constants for stint scoring and the rule based recommendations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScoringReference {
    pub expected_lengths: ExpectedStintLengths,
    /// Points lost per second of lap time standard deviation
    pub consistency_penalty_per_s: f64,
    /// Typical degradation rate (s/lap)
    pub degradation_reference_s: f64,
    /// Points lost when degrading at exactly the reference rate
    pub degradation_penalty: f64,
    pub length_weight: f64,
    pub consistency_weight: f64,
    pub degradation_weight: f64,
    pub excellent_threshold: f64,
    pub good_threshold: f64,
    pub average_threshold: f64,
    pub below_average_threshold: f64,
    pub short_stint_laps: u32,
    pub high_variation_s: f64,
    pub high_degradation_s: f64,
    pub praise_score: f64,
    pub review_score: f64,
}

impl Default for ScoringReference {
    fn default() -> Self {
        Self {
            expected_lengths: ExpectedStintLengths::default(),
            consistency_penalty_per_s: 100.,
            degradation_reference_s: 0.05,
            degradation_penalty: 50.,
            length_weight: 0.3,
            consistency_weight: 0.4,
            degradation_weight: 0.3,
            excellent_threshold: 90.,
            good_threshold: 75.,
            average_threshold: 60.,
            below_average_threshold: 40.,
            short_stint_laps: 10,
            high_variation_s: 0.5,
            high_degradation_s: 0.1,
            praise_score: 85.,
            review_score: 50.,
        }
    }
}

/// Simplified static undercut model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct UndercutModel {
    /// Round-trip pit stop time loss (s). Only half of it is charged to the undercut
    pub pit_loss_s: f64,
    /// Out-lap gain from fresh tyres (s)
    pub fresh_tyre_advantage_s: f64,
    /// Laps before the decision lap used to measure recent pace
    pub recent_window_laps: u32,
}

impl Default for UndercutModel {
    fn default() -> Self {
        Self {
            pit_loss_s: 22.,
            fresh_tyre_advantage_s: 1.5,
            recent_window_laps: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub fuel: FuelModel,
    pub outliers: OutlierSettings,
    pub regression: RegressionSettings,
    pub cliff: CliffSettings,
    pub scoring: ScoringReference,
    pub undercut: UndercutModel,
}

impl AnalysisConfig {
    pub fn from_path(config_path: &Path) -> Result<Self, StintlabError> {
        let file = std::fs::File::open(config_path)
            .map_err(|e| StintlabError::ConfigIOError { source: e })?;
        let config = serde_json::from_reader(file)
            .map_err(|e| StintlabError::ConfigSerializeError { source: e })?;
        info!("Loaded analysis config from {:?}", config_path);
        Ok(config)
    }

    /// Read the user's config file, if there is one.
    pub fn from_local_file() -> Result<Option<Self>, StintlabError> {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(None);
        };
        let config_path = config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Self::from_path(&config_path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn save(&self) -> Result<(), StintlabError> {
        let config_path = dirs::config_dir()
            .ok_or(StintlabError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME);
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), StintlabError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StintlabError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| StintlabError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| StintlabError::ConfigSerializeError { source: e })
    }
}
