use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, arg};
use log::{error, info};
use serde::Serialize;

use stintlab::{
    AnalysisConfig, FuelCorrectedLap, FuelCorrector, FuelStrategy, LapTable, PaceComparator,
    PaceComparison, PerformanceEvaluation, StintPerformanceAnalyzer, StintSummary,
    StrategyComparison, StintlabError, TyreDegradationAnalyzer,
    analysis::fuel::{StintPace, TruePaceAdvantage},
    laps::{load_lap_table, load_session_laps},
    writer::write_report,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Analysis config file, defaults to the user's stintlab config
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tyre degradation per stint, compound comparison and cliff laps
    Degradation {
        #[arg(short, long)]
        laps: PathBuf,
        #[arg(short, long)]
        driver: String,
    },
    /// Fuel corrected laps, stint pace and fuel strategy
    Fuel {
        #[arg(short, long)]
        laps: PathBuf,
        #[arg(short, long)]
        driver: String,
        #[arg(short, long)]
        race_laps: Option<u32>,
        /// Qualifying lap time (s) to compare race pace against
        #[arg(short, long)]
        qualifying_time: Option<f64>,
    },
    /// Stint summaries with performance evaluations
    Stints {
        #[arg(short, long)]
        laps: PathBuf,
        #[arg(short, long)]
        driver: String,
    },
    /// Fuel corrected pace and strategy comparison between two drivers
    Compare {
        #[arg(short, long)]
        laps: PathBuf,
        #[arg(short, long)]
        first: String,
        #[arg(short, long)]
        second: String,
        #[arg(short, long)]
        race_laps: Option<u32>,
    },
    /// Undercut verdict for the follower at the given lap
    Undercut {
        #[arg(short, long)]
        laps: PathBuf,
        #[arg(long)]
        leader: String,
        #[arg(long)]
        follower: String,
        #[arg(long)]
        lap: u32,
    },
}

#[derive(Serialize)]
struct FuelReport {
    driver: String,
    race_laps: u32,
    corrected_laps: Vec<FuelCorrectedLap>,
    stint_pace: Vec<StintPace>,
    strategy: Option<FuelStrategy>,
    true_pace: Option<TruePaceAdvantage>,
}

#[derive(Serialize)]
struct EvaluatedStint {
    #[serde(flatten)]
    summary: StintSummary,
    evaluation: PerformanceEvaluation,
}

#[derive(Serialize)]
struct StintsReport {
    driver: String,
    stints: Vec<EvaluatedStint>,
}

#[derive(Serialize)]
struct CompareReport {
    race_pace: PaceComparison,
    strategy: StrategyComparison,
}

fn load_config(config_path: Option<&Path>) -> Result<AnalysisConfig, StintlabError> {
    match config_path {
        Some(path) => AnalysisConfig::from_path(path),
        None => Ok(AnalysisConfig::from_local_file()?.unwrap_or_default()),
    }
}

fn session_tables(
    lap_file: &Path,
    first: &str,
    second: &str,
) -> Result<(LapTable, LapTable), StintlabError> {
    let mut session = load_session_laps(lap_file)?;
    let mut take = |driver: &str| {
        session
            .remove(driver)
            .ok_or_else(|| StintlabError::UnknownDriver {
                driver: driver.to_string(),
            })
    };
    let first_table = take(first)?;
    let second_table = take(second)?;
    Ok((first_table, second_table))
}

fn run(cli: &Args) -> Result<(), StintlabError> {
    let config = load_config(cli.config.as_deref())?;
    let output = cli.output.as_deref();

    match &cli.command {
        Commands::Degradation { laps, driver } => {
            let table = load_lap_table(laps, driver)?;
            let report = TyreDegradationAnalyzer::new(&config)
                .generate_degradation_report(&table.laps, &table.driver);
            write_report(&report, output)
        }
        Commands::Fuel {
            laps,
            driver,
            race_laps,
            qualifying_time,
        } => {
            let table = load_lap_table(laps, driver)?;
            let race_laps = race_laps.unwrap_or(config.fuel.default_race_laps);
            let corrector = FuelCorrector::new(&config);
            let true_pace = qualifying_time.zip(corrector.race_pace(&table.laps)).map(
                |(qualifying_time, race_pace)| {
                    corrector.true_pace_advantage(
                        qualifying_time,
                        race_pace,
                        corrector.model().start_fuel_kg,
                    )
                },
            );
            let report = FuelReport {
                race_laps,
                corrected_laps: corrector.calculate_fuel_corrected_pace(&table.laps, race_laps),
                stint_pace: corrector.analyze_stint_pace(&table.laps, race_laps),
                strategy: corrector.estimate_fuel_strategy(&table.laps, race_laps),
                true_pace,
                driver: table.driver,
            };
            write_report(&report, output)
        }
        Commands::Stints { laps, driver } => {
            let table = load_lap_table(laps, driver)?;
            let analyzer = StintPerformanceAnalyzer::new(&config);
            let stints = analyzer
                .analyze_all_stints(&table.laps)
                .into_iter()
                .map(|summary| EvaluatedStint {
                    evaluation: analyzer.evaluate_stint_performance(&summary),
                    summary,
                })
                .collect();
            write_report(
                &StintsReport {
                    driver: table.driver,
                    stints,
                },
                output,
            )
        }
        Commands::Compare {
            laps,
            first,
            second,
            race_laps,
        } => {
            let (first, second) = session_tables(laps, first, second)?;
            let race_laps = race_laps.unwrap_or(config.fuel.default_race_laps);
            let comparator = PaceComparator::new(&config);
            let report = CompareReport {
                race_pace: comparator.compare_race_pace(&first, &second, race_laps),
                strategy: comparator.compare_stint_strategies(&first, &second),
            };
            write_report(&report, output)
        }
        Commands::Undercut {
            laps,
            leader,
            follower,
            lap,
        } => {
            let (leader, follower) = session_tables(laps, leader, follower)?;
            let analysis =
                PaceComparator::new(&config).analyze_undercut(&leader.laps, &follower.laps, *lap);
            info!(
                "{} vs {} at lap {}: {}",
                leader.driver, follower.driver, lap, analysis.recommendation
            );
            write_report(&analysis, output)
        }
    }
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    if let Err(e) = run(&cli) {
        error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
