use std::fmt;

use serde::{Serialize, Serializer};

use super::{ScorableStint, round_score};
use crate::config::{AnalysisConfig, ScoringReference};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rating {
    Poor,
    BelowAverage,
    Average,
    Good,
    Excellent,
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rating::Excellent => write!(f, "Excellent"),
            Rating::Good => write!(f, "Good"),
            Rating::Average => write!(f, "Average"),
            Rating::BelowAverage => write!(f, "Below Average"),
            Rating::Poor => write!(f, "Poor"),
        }
    }
}

impl Serialize for Rating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Rule based remarks attached to an evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StintAdvice {
    TooShort,
    HighVariation,
    HighDegradation,
    ImprovingPace,
    ExcellentExecution,
    ReviewTelemetry,
    GoodStint,
}

impl fmt::Display for StintAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StintAdvice::TooShort => "Stint too short - consider extending next stint",
            StintAdvice::HighVariation => "High lap time variation - focus on consistency",
            StintAdvice::HighDegradation => {
                "High degradation - consider earlier pit stop or tyre saving"
            }
            StintAdvice::ImprovingPace => "Improving pace through stint - good tyre management",
            StintAdvice::ExcellentExecution => {
                "Excellent stint execution - maintain this performance"
            }
            StintAdvice::ReviewTelemetry => "Review telemetry for areas of improvement",
            StintAdvice::GoodStint => "Good stint performance",
        };
        write!(f, "{text}")
    }
}

impl Serialize for StintAdvice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PerformanceEvaluation {
    pub overall_score: f64,
    pub length_score: f64,
    pub consistency_score: f64,
    pub degradation_score: f64,
    pub rating: Rating,
    pub recommendations: Vec<StintAdvice>,
}

/// Turns stint length, consistency and degradation into a 0-100 score.
///
/// Each component score is clamped to [0, 100] before weighting, so with
/// weights summing to one the overall score stays within the same bounds.
/// The rating and the advice use the unrounded overall score.
#[derive(Debug, Clone, Default)]
pub struct StintScorer {
    reference: ScoringReference,
}

impl StintScorer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            reference: config.scoring.clone(),
        }
    }

    pub fn evaluate<S: ScorableStint>(&self, stint: &S) -> PerformanceEvaluation {
        let reference = &self.reference;

        let expected_length = reference
            .expected_lengths
            .for_compound(stint.compound())
            .max(1);
        let length_score =
            (100. * stint.stint_length() as f64 / f64::from(expected_length)).clamp(0., 100.);
        let consistency_score =
            (100. - reference.consistency_penalty_per_s * stint.consistency()).clamp(0., 100.);
        let degradation_score = (100.
            - reference.degradation_penalty * stint.degradation_rate().abs()
                / reference.degradation_reference_s)
            .clamp(0., 100.);

        let overall_score = reference.length_weight * length_score
            + reference.consistency_weight * consistency_score
            + reference.degradation_weight * degradation_score;

        PerformanceEvaluation {
            overall_score: round_score(overall_score),
            length_score: round_score(length_score),
            consistency_score: round_score(consistency_score),
            degradation_score: round_score(degradation_score),
            rating: self.rating(overall_score),
            recommendations: self.recommendations(stint, overall_score),
        }
    }

    pub fn rating(&self, score: f64) -> Rating {
        let reference = &self.reference;
        if score >= reference.excellent_threshold {
            Rating::Excellent
        } else if score >= reference.good_threshold {
            Rating::Good
        } else if score >= reference.average_threshold {
            Rating::Average
        } else if score >= reference.below_average_threshold {
            Rating::BelowAverage
        } else {
            Rating::Poor
        }
    }

    fn recommendations<S: ScorableStint>(&self, stint: &S, score: f64) -> Vec<StintAdvice> {
        let reference = &self.reference;
        let mut advice = Vec::new();

        if stint.stint_length() < reference.short_stint_laps as usize {
            advice.push(StintAdvice::TooShort);
        }
        if stint.consistency() > reference.high_variation_s {
            advice.push(StintAdvice::HighVariation);
        }
        let rate = stint.degradation_rate();
        if rate > reference.high_degradation_s {
            advice.push(StintAdvice::HighDegradation);
        } else if rate < 0. {
            advice.push(StintAdvice::ImprovingPace);
        }
        if score > reference.praise_score {
            advice.push(StintAdvice::ExcellentExecution);
        } else if score < reference.review_score {
            advice.push(StintAdvice::ReviewTelemetry);
        }

        if advice.is_empty() {
            advice.push(StintAdvice::GoodStint);
        }
        advice
    }
}
