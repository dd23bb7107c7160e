use super::{TimedLap, median};
use crate::config::OutlierSettings;

/// Drops laps that do not show representative pace: laps without a valid time,
/// pit and incident laps (at or above `median_factor` x the median of the
/// input), and optionally the race's opening lap.
///
/// The median depends on the scope of the input, so run the filter again for
/// every scope (session, stint, recent window) instead of filtering once.
#[derive(Debug, Clone)]
pub struct OutlierFilter {
    median_factor: f64,
    exclude_opening_lap: bool,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self::new(&OutlierSettings::default(), true)
    }
}

impl OutlierFilter {
    pub fn new(settings: &OutlierSettings, exclude_opening_lap: bool) -> Self {
        Self {
            median_factor: settings.median_factor,
            exclude_opening_lap,
        }
    }

    /// Same thresholds, with or without dropping lap number 1.
    pub fn with_opening_lap_excluded(&self, exclude_opening_lap: bool) -> Self {
        Self {
            exclude_opening_lap,
            ..self.clone()
        }
    }

    pub fn apply<'a, T: TimedLap>(&self, laps: &'a [T]) -> Vec<&'a T> {
        let timed: Vec<(&T, f64)> = laps
            .iter()
            .filter_map(|lap| lap.pace_s().map(|t| (lap, t)))
            .collect();

        let times: Vec<f64> = timed.iter().map(|(_, t)| *t).collect();
        let Some(median_time) = median(&times) else {
            return Vec::new();
        };
        let threshold = median_time * self.median_factor;

        timed
            .into_iter()
            .filter(|(_, t)| *t < threshold)
            .filter(|(lap, _)| !self.exclude_opening_lap || lap.lap_number() > 1)
            .map(|(lap, _)| lap)
            .collect()
    }
}
