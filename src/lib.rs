// Library interface for stintlab
// The CLI and the integration tests both go through these re-exports

pub mod analysis;
pub mod config;
pub mod errors;
pub mod laps;
pub mod writer;

// Re-export commonly used types
pub use analysis::{
    comparison::{PaceComparator, PaceComparison, StrategyComparison, UndercutAnalysis, UndercutCall},
    degradation::{DegradationReport, StintMetrics, TyreDegradationAnalyzer},
    fuel::{FuelCorrectedLap, FuelCorrector, FuelStrategy},
    scoring::{PerformanceEvaluation, Rating, StintScorer},
    stints::{StintPerformanceAnalyzer, StintSummary},
};
pub use config::AnalysisConfig;
pub use errors::StintlabError;
pub use laps::{Compound, Lap, LapTable};
