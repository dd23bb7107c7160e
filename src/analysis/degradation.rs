use std::collections::HashSet;

use itertools::Itertools;
use log::{debug, warn};
use serde::Serialize;

use super::{
    Deviation, ScorableStint, mean, min,
    outliers::OutlierFilter,
    regression::RansacRegressor,
    round_rate, round_s, round_score,
    segmenter::{Stint, segment},
    std_dev,
};
use crate::{
    config::{AnalysisConfig, CliffSettings},
    laps::{Compound, Lap},
};

/// Fewer clean laps than this and a stint gets no degradation figures
const MIN_DEGRADATION_LAPS: usize = 3;
/// Tyre ages used for the linear lap time projections
const PREDICTION_HORIZONS: [f64; 2] = [10., 20.];

/// Degradation figures for one stint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StintMetrics {
    pub stint_number: u32,
    pub compound: Compound,
    pub start_lap: u32,
    pub end_lap: u32,
    /// Laps run in the stint, before outlier filtering
    pub stint_length: usize,
    /// Laps left after outlier filtering
    pub clean_laps: usize,
    pub tyre_age_start: u32,
    /// Slope of lap time against tyre age (s/lap), positive when slowing down
    pub degradation_rate: f64,
    /// Degradation rate relative to the first clean lap (% per lap)
    pub degradation_pct: f64,
    /// Last clean lap time minus first clean lap time (s)
    pub total_degradation: f64,
    pub first_lap_time: f64,
    pub last_lap_time: f64,
    pub avg_lap_time: f64,
    pub best_lap_time: f64,
    /// Standard deviation of the clean lap times (s)
    pub consistency: f64,
    pub predicted_lap_10: f64,
    pub predicted_lap_20: f64,
}

impl ScorableStint for StintMetrics {
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
        self.degradation_rate
    }
}

/// Unrounded stint figures, aggregated before the reported values are rounded.
#[derive(Clone, Copy, Debug)]
struct StintFigures {
    degradation_rate: f64,
    degradation_pct: f64,
    first_lap_time: f64,
    avg_lap_time: f64,
    consistency: f64,
}

/// A stint's reported metrics with the figures they were rounded from.
struct AnalyzedStint {
    metrics: StintMetrics,
    figures: StintFigures,
}

/// Mean stint figures for one compound.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompoundComparison {
    pub compound: Compound,
    pub stints: usize,
    pub degradation_rate: f64,
    pub degradation_pct: f64,
    pub avg_lap_time: f64,
    pub consistency: f64,
    pub stint_length: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "laps")]
pub enum StintLengthPrediction {
    /// No stint on the compound had enough clean laps
    NoData,
    /// Lap times do not get slower, the target is never reached
    NoDegradation,
    /// Laps until the target lap time is exceeded
    Laps(u32),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StintCliff {
    pub stint_number: u32,
    pub compound: Compound,
    pub cliff_lap: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DegradationReport {
    pub driver: String,
    pub total_laps: usize,
    pub stints: usize,
    pub stint_details: Vec<StintMetrics>,
    pub compound_comparison: Vec<CompoundComparison>,
    /// Mean degradation rate over all analyzed stints, 0 when there are none
    pub average_degradation: f64,
    pub most_consistent_stint: Option<StintMetrics>,
    pub cliffs: Vec<StintCliff>,
}

pub struct TyreDegradationAnalyzer {
    filter: OutlierFilter,
    regressor: RansacRegressor,
    cliff: CliffSettings,
}

impl Default for TyreDegradationAnalyzer {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl TyreDegradationAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            filter: OutlierFilter::new(&config.outliers, true),
            regressor: RansacRegressor::new(&config.regression),
            cliff: config.cliff.clone(),
        }
    }

    /// Degradation metrics for every stint with at least 3 clean laps.
    ///
    /// Stints come from the unfiltered laps, the outlier filter then runs over
    /// the whole table and each stint keeps its surviving laps.
    pub fn calculate_degradation(&self, laps: &[Lap]) -> Vec<StintMetrics> {
        self.analyze_stints(laps)
            .into_iter()
            .map(|stint| stint.metrics)
            .collect()
    }

    fn analyze_stints(&self, laps: &[Lap]) -> Vec<AnalyzedStint> {
        let clean_lap_numbers: HashSet<u32> = self
            .filter
            .apply(laps)
            .into_iter()
            .map(|lap| lap.lap_number)
            .collect();

        segment(laps)
            .iter()
            .filter_map(|stint| {
                let clean: Vec<&Lap> = stint
                    .laps
                    .iter()
                    .filter(|lap| clean_lap_numbers.contains(&lap.lap_number))
                    .collect();
                self.analyze_stint(stint, &clean)
            })
            .collect()
    }

    fn analyze_stint(&self, stint: &Stint, clean: &[&Lap]) -> Option<AnalyzedStint> {
        if clean.len() < MIN_DEGRADATION_LAPS {
            debug!(
                "Skipping stint {} ({}): {} clean laps",
                stint.stint_number,
                stint.compound,
                clean.len()
            );
            return None;
        }

        let tyre_ages: Vec<f64> = clean.iter().map(|lap| f64::from(lap.tyre_age)).collect();
        let times: Vec<f64> = clean.iter().filter_map(|lap| lap.lap_time_s).collect();

        let degradation_rate = match self.regressor.fit(&tyre_ages, &times) {
            Ok(fit) => fit.slope,
            Err(e) => {
                warn!(
                    "Degradation fit failed for stint {}, using 0 s/lap: {}",
                    stint.stint_number, e
                );
                0.
            }
        };

        let first_lap_time = *times.first()?;
        let last_lap_time = *times.last()?;
        let [predicted_lap_10, predicted_lap_20] =
            PREDICTION_HORIZONS.map(|horizon| first_lap_time + degradation_rate * horizon);
        let figures = StintFigures {
            degradation_rate,
            degradation_pct: degradation_rate / first_lap_time * 100.,
            first_lap_time,
            avg_lap_time: mean(&times)?,
            consistency: std_dev(&times, Deviation::Population)?,
        };

        let metrics = StintMetrics {
            stint_number: stint.stint_number,
            compound: stint.compound,
            start_lap: stint.start_lap,
            end_lap: stint.end_lap,
            stint_length: stint.length(),
            clean_laps: clean.len(),
            tyre_age_start: stint.tyre_age_start,
            degradation_rate: round_rate(figures.degradation_rate),
            degradation_pct: round_rate(figures.degradation_pct),
            total_degradation: round_s(last_lap_time - first_lap_time),
            first_lap_time: round_s(first_lap_time),
            last_lap_time: round_s(last_lap_time),
            avg_lap_time: round_s(figures.avg_lap_time),
            best_lap_time: round_s(min(&times)?),
            consistency: round_s(figures.consistency),
            predicted_lap_10: round_s(predicted_lap_10),
            predicted_lap_20: round_s(predicted_lap_20),
        };
        Some(AnalyzedStint { metrics, figures })
    }

    pub fn compare_tyre_compounds(&self, laps: &[Lap]) -> Vec<CompoundComparison> {
        self.analyze_stints(laps)
            .into_iter()
            .into_group_map_by(|stint| stint.metrics.compound)
            .into_iter()
            .sorted_by_key(|(compound, _)| *compound)
            .filter_map(|(compound, stints)| {
                let field = |f: fn(&AnalyzedStint) -> f64| -> Option<f64> {
                    mean(&stints.iter().map(f).collect_vec())
                };
                Some(CompoundComparison {
                    compound,
                    stints: stints.len(),
                    degradation_rate: round_rate(field(|s| s.figures.degradation_rate)?),
                    degradation_pct: round_rate(field(|s| s.figures.degradation_pct)?),
                    avg_lap_time: round_s(field(|s| s.figures.avg_lap_time)?),
                    consistency: round_s(field(|s| s.figures.consistency)?),
                    stint_length: round_score(field(|s| s.metrics.stint_length as f64)?),
                })
            })
            .collect()
    }

    /// How many laps a compound lasts before lap times pass `target_lap_time`,
    /// projected from its mean degradation rate.
    pub fn predict_optimal_stint_length(
        &self,
        laps: &[Lap],
        target_lap_time: f64,
        compound: Compound,
    ) -> StintLengthPrediction {
        let compound_laps = laps
            .iter()
            .filter(|lap| lap.compound == compound)
            .cloned()
            .collect_vec();

        let stints = self.analyze_stints(&compound_laps);
        let rates = stints.iter().map(|s| s.figures.degradation_rate).collect_vec();
        let first_laps = stints.iter().map(|s| s.figures.first_lap_time).collect_vec();
        let (Some(avg_rate), Some(avg_first_lap)) = (mean(&rates), mean(&first_laps)) else {
            return StintLengthPrediction::NoData;
        };

        if avg_rate <= 0. {
            return StintLengthPrediction::NoDegradation;
        }

        let laps_until_target = ((target_lap_time - avg_first_lap) / avg_rate).trunc();
        StintLengthPrediction::Laps(laps_until_target.max(1.) as u32)
    }

    /// Look for a sudden degradation increase at the end of one stint's laps.
    ///
    /// Gradients are taken over a rolling window of clean laps. A cliff needs
    /// the last gradient to be both `ratio` x the mean of the earlier ones and
    /// above the absolute floor. Returns the lap number of the clean lap
    /// `window` laps from the end.
    pub fn detect_cliff(&self, laps: &[Lap]) -> Option<u32> {
        let window = self.cliff.window;
        if window == 0 || laps.len() < self.cliff.min_laps {
            return None;
        }

        let clean = self.filter.apply(laps);
        if clean.len() < self.cliff.min_laps || clean.len() <= window {
            return None;
        }

        let times = clean.iter().filter_map(|lap| lap.lap_time_s).collect_vec();
        let gradients = (0..times.len() - window)
            .map(|i| (times[i + window] - times[i]) / window as f64)
            .collect_vec();
        if gradients.len() < 3 {
            return None;
        }

        let (last_gradient, earlier) = gradients.split_last()?;
        let avg_gradient = mean(earlier)?;
        if *last_gradient > avg_gradient * self.cliff.ratio
            && *last_gradient > self.cliff.min_gradient_s
        {
            return Some(clean[clean.len() - window].lap_number);
        }
        None
    }

    pub fn generate_degradation_report(&self, laps: &[Lap], driver: &str) -> DegradationReport {
        let analyzed = self.analyze_stints(laps);
        let average_degradation = mean(
            &analyzed
                .iter()
                .map(|s| s.figures.degradation_rate)
                .collect_vec(),
        )
        .map(round_rate)
        .unwrap_or(0.);
        let most_consistent_stint = analyzed
            .iter()
            .min_by(|a, b| a.figures.consistency.total_cmp(&b.figures.consistency))
            .map(|s| s.metrics.clone());
        let stint_details = analyzed.into_iter().map(|s| s.metrics).collect_vec();
        let cliffs = segment(laps)
            .iter()
            .map(|stint| StintCliff {
                stint_number: stint.stint_number,
                compound: stint.compound,
                cliff_lap: self.detect_cliff(&stint.laps),
            })
            .collect();

        DegradationReport {
            driver: driver.to_string(),
            total_laps: laps.len(),
            stints: stint_details.len(),
            compound_comparison: self.compare_tyre_compounds(laps),
            stint_details,
            average_degradation,
            most_consistent_stint,
            cliffs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Laps numbered from `first_lap`, tyre age from 1, one compound.
    fn stint_laps(first_lap: u32, compound: Compound, times: &[f64]) -> Vec<Lap> {
        times
            .iter()
            .enumerate()
            .map(|(i, t)| Lap::new("NOR", first_lap + i as u32, Some(*t), compound, i as u32 + 1))
            .collect()
    }

    #[test]
    fn test_linear_series_rate() {
        let laps = stint_laps(5, Compound::Medium, &[90., 90.5, 91., 91.5]);
        let metrics = TyreDegradationAnalyzer::default().calculate_degradation(&laps);

        assert_eq!(metrics.len(), 1);
        let stint = &metrics[0];
        assert_eq!(stint.degradation_rate, 0.5);
        assert_eq!(stint.degradation_pct, round_rate(0.5 / 90. * 100.));
        assert_eq!(stint.total_degradation, 1.5);
        assert_eq!(stint.avg_lap_time, 90.75);
        assert_eq!(stint.best_lap_time, 90.);
        assert_eq!(stint.predicted_lap_10, 95.);
        assert_eq!(stint.predicted_lap_20, 100.);
        assert_eq!(stint.consistency, 0.559);
        assert_eq!((stint.start_lap, stint.end_lap), (5, 8));
    }

    #[test]
    fn test_short_stints_are_dropped() {
        let mut laps = stint_laps(2, Compound::Soft, &[89., 89.2, 89.4, 89.6, 89.8]);
        laps.extend(stint_laps(7, Compound::Hard, &[90., 90.1]));
        let metrics = TyreDegradationAnalyzer::default().calculate_degradation(&laps);

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].compound, Compound::Soft);
        assert_eq!(metrics[0].stint_number, 1);
    }

    #[test]
    fn test_pit_laps_are_filtered_before_fitting() {
        let mut laps = stint_laps(2, Compound::Soft, &[89., 89.1, 89.2, 89.3, 140.]);
        laps[0].lap_time_s = None;
        laps.extend(stint_laps(7, Compound::Hard, &[145., 90., 90.05, 90.1, 90.15]));
        let metrics = TyreDegradationAnalyzer::default().calculate_degradation(&laps);

        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].stint_length, 5);
        assert_eq!(metrics[0].clean_laps, 3);
        assert_eq!(metrics[0].degradation_rate, 0.1);
        assert_eq!(metrics[1].stint_number, 2);
        assert_eq!(metrics[1].clean_laps, 4);
        assert_eq!(metrics[1].degradation_rate, 0.05);
        assert_eq!(metrics[1].first_lap_time, 90.);
    }

    #[test]
    fn test_degenerate_fit_falls_back_to_zero_rate() {
        let mut laps = stint_laps(3, Compound::Hard, &[90., 90.4, 90.9]);
        for lap in laps.iter_mut() {
            lap.tyre_age = 4;
        }
        let metrics = TyreDegradationAnalyzer::default().calculate_degradation(&laps);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].degradation_rate, 0.);
        assert_eq!(metrics[0].predicted_lap_10, 90.);
    }

    #[test]
    fn test_empty_input() {
        let analyzer = TyreDegradationAnalyzer::default();
        assert!(analyzer.calculate_degradation(&[]).is_empty());
        let report = analyzer.generate_degradation_report(&[], "PIA");
        assert_eq!(report.stints, 0);
        assert_eq!(report.average_degradation, 0.);
        assert!(report.most_consistent_stint.is_none());
    }

    #[test]
    fn test_compound_comparison_groups_stints() {
        let mut laps = stint_laps(2, Compound::Soft, &[89., 89.2, 89.4, 89.6]);
        laps.extend(stint_laps(6, Compound::Hard, &[90., 90.05, 90.1, 90.15]));
        laps.extend(stint_laps(10, Compound::Soft, &[89.5, 89.8, 90.1, 90.4]));

        let comparison = TyreDegradationAnalyzer::default().compare_tyre_compounds(&laps);
        assert_eq!(comparison.len(), 2);
        assert_eq!(comparison[0].compound, Compound::Soft);
        assert_eq!(comparison[0].stints, 2);
        assert_eq!(comparison[0].degradation_rate, 0.25);
        assert_eq!(comparison[0].stint_length, 4.);
        assert_eq!(comparison[1].compound, Compound::Hard);
        assert_eq!(comparison[1].degradation_rate, 0.05);
    }

    #[test]
    fn test_optimal_stint_length() {
        let mut laps = stint_laps(2, Compound::Medium, &[90., 90.5, 91., 91.5]);
        laps.extend(stint_laps(6, Compound::Hard, &[92., 91.9, 91.8, 91.7]));
        let analyzer = TyreDegradationAnalyzer::default();

        assert_eq!(
            analyzer.predict_optimal_stint_length(&laps, 95., Compound::Medium),
            StintLengthPrediction::Laps(10)
        );
        assert_eq!(
            analyzer.predict_optimal_stint_length(&laps, 89., Compound::Medium),
            StintLengthPrediction::Laps(1)
        );
        assert_eq!(
            analyzer.predict_optimal_stint_length(&laps, 95., Compound::Hard),
            StintLengthPrediction::NoDegradation
        );
        assert_eq!(
            analyzer.predict_optimal_stint_length(&laps, 95., Compound::Soft),
            StintLengthPrediction::NoData
        );
    }

    #[test]
    fn test_slow_degradation_survives_rounding() {
        // 0.00004 s/lap rounds to a zero reported rate
        let laps = stint_laps(2, Compound::Hard, &[90., 90.00004, 90.00008, 90.00012]);
        let analyzer = TyreDegradationAnalyzer::default();

        let metrics = analyzer.calculate_degradation(&laps);
        assert_eq!(metrics[0].degradation_rate, 0.);
        assert_eq!(
            analyzer.predict_optimal_stint_length(&laps, 90.00101, Compound::Hard),
            StintLengthPrediction::Laps(25)
        );
    }

    #[test]
    fn test_cliff_detected_at_end_of_stint() {
        let laps = stint_laps(
            10,
            Compound::Soft,
            &[90., 90.05, 90.1, 90.15, 90.2, 90.25, 90.3, 91.5],
        );
        assert_eq!(TyreDegradationAnalyzer::default().detect_cliff(&laps), Some(15));
    }

    #[test]
    fn test_no_cliff_on_steady_degradation() {
        let laps = stint_laps(10, Compound::Soft, &[90., 90.1, 90.2, 90.3, 90.4, 90.5, 90.6, 90.7]);
        assert_eq!(TyreDegradationAnalyzer::default().detect_cliff(&laps), None);
    }

    #[test]
    fn test_no_cliff_below_absolute_floor() {
        let laps = stint_laps(10, Compound::Soft, &[90., 90.01, 90.02, 90.03, 90.04, 90.05, 90.2]);
        assert_eq!(TyreDegradationAnalyzer::default().detect_cliff(&laps), None);
    }

    #[test]
    fn test_cliff_needs_enough_laps() {
        let laps = stint_laps(10, Compound::Soft, &[90., 90.1, 90.2, 92.]);
        assert_eq!(TyreDegradationAnalyzer::default().detect_cliff(&laps), None);
        // 5 laps clear the minimum but leave only 2 gradients
        let laps = stint_laps(10, Compound::Soft, &[90., 90.1, 90.2, 90.3, 92.]);
        assert_eq!(TyreDegradationAnalyzer::default().detect_cliff(&laps), None);
    }

    #[test]
    fn test_report_picks_most_consistent_stint() {
        let mut laps = stint_laps(2, Compound::Soft, &[89., 89.9, 89.2, 90.]);
        laps.extend(stint_laps(6, Compound::Hard, &[90., 90.05, 90.1, 90.15]));
        let report = TyreDegradationAnalyzer::default().generate_degradation_report(&laps, "NOR");

        assert_eq!(report.driver, "NOR");
        assert_eq!(report.total_laps, 8);
        assert_eq!(report.stints, 2);
        assert_eq!(report.most_consistent_stint.unwrap().compound, Compound::Hard);
        assert_eq!(report.cliffs.len(), 2);
        assert!(report.cliffs.iter().all(|c| c.cliff_lap.is_none()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_degradation_is_idempotent(
            times in prop::collection::vec(85.0f64..95.0f64, 3..40),
            switch_at in 0usize..40,
        ) {
            let mut laps = stint_laps(1, Compound::Medium, &times);
            for lap in laps.iter_mut().skip(switch_at) {
                lap.compound = Compound::Hard;
            }
            let analyzer = TyreDegradationAnalyzer::default();
            prop_assert_eq!(analyzer.calculate_degradation(&laps), analyzer.calculate_degradation(&laps));
        }

        #[test]
        fn prop_recovers_synthetic_rate(
            base in 80.0f64..100.0f64,
            rate in -0.2f64..0.5f64,
            n in 4usize..30,
        ) {
            let times: Vec<f64> = (0..n).map(|i| base + rate * i as f64).collect();
            let laps = stint_laps(2, Compound::Hard, &times);
            let metrics = TyreDegradationAnalyzer::default().calculate_degradation(&laps);
            prop_assert_eq!(metrics.len(), 1);
            prop_assert!((metrics[0].degradation_rate - rate).abs() < 1e-3);
        }
    }
}
