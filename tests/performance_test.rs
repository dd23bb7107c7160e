use std::time::Instant;

use stintlab::{
    Compound, FuelCorrector, Lap, LapTable, PaceComparator, StintPerformanceAnalyzer, StintScorer,
    TyreDegradationAnalyzer,
};

/// A 70 lap two stop race with a traffic lap every 9 laps and no time on
/// the pit laps.
fn synthetic_race(driver: &str, pace_offset: f64) -> Vec<Lap> {
    (1..=70u32)
        .map(|lap_number| {
            let (compound, first_lap) = match lap_number {
                1..=20 => (Compound::Soft, 1),
                21..=45 => (Compound::Medium, 21),
                _ => (Compound::Hard, 46),
            };
            let tyre_age = lap_number - first_lap + 1;
            let lap_time = match lap_number {
                20 | 21 | 45 | 46 => None,
                n if n % 9 == 0 => Some(93.5 + pace_offset),
                _ => Some(
                    90. + pace_offset
                        + 0.06 * f64::from(tyre_age)
                        + 0.056 * f64::from(70 - lap_number),
                ),
            };
            Lap::new(driver, lap_number, lap_time, compound, tyre_age)
        })
        .collect()
}

/// A whole grid through every analyzer should take well under a second,
/// even in a debug build.
#[test]
fn test_full_grid_analysis() {
    let grid: Vec<LapTable> = (0..20)
        .map(|i| {
            let driver = format!("D{i:02}");
            let laps = synthetic_race(&driver, f64::from(i) * 0.05);
            LapTable::new(driver, laps).unwrap()
        })
        .collect();

    let degradation = TyreDegradationAnalyzer::default();
    let fuel = FuelCorrector::default();
    let stints = StintPerformanceAnalyzer::default();
    let scorer = StintScorer::default();
    let comparator = PaceComparator::default();

    let start = Instant::now();
    let mut evaluated = 0;
    for table in &grid {
        let report = degradation.generate_degradation_report(&table.laps, &table.driver);
        evaluated += report
            .stint_details
            .iter()
            .map(|stint| scorer.evaluate(stint))
            .count();
        fuel.calculate_fuel_corrected_pace(&table.laps, 70);
        fuel.analyze_stint_pace(&table.laps, 70);
        stints.analyze_all_stints(&table.laps);
    }
    for pair in grid.windows(2) {
        comparator.compare_race_pace(&pair[0], &pair[1], 70);
        comparator.compare_stint_strategies(&pair[0], &pair[1]);
        comparator.analyze_undercut(&pair[0].laps, &pair[1].laps, 40);
    }
    let elapsed = start.elapsed();

    println!("Analyzed {} drivers in {:?}", grid.len(), elapsed);
    assert_eq!(evaluated, 60);
    assert!(
        elapsed.as_millis() < 1000,
        "Grid analysis too slow: {}ms (target: <1000ms)",
        elapsed.as_millis()
    );
}

/// Traffic laps must not move the robust degradation estimate.
#[test]
fn test_traffic_laps_do_not_bias_degradation() {
    let laps = synthetic_race("VER", 0.);
    let metrics = TyreDegradationAnalyzer::default().calculate_degradation(&laps);
    assert_eq!(metrics.len(), 3);
    for stint in &metrics {
        // tyre wear less the fuel burned per lap
        assert!(
            (stint.degradation_rate - 0.004).abs() < 1e-9,
            "stint {} rate {}",
            stint.stint_number,
            stint.degradation_rate
        );
    }
}

/// Repeated runs over one table give identical results.
#[test]
fn test_repeated_analysis_is_stable() {
    let laps = synthetic_race("HAM", 0.2);
    let analyzer = TyreDegradationAnalyzer::default();
    let first = analyzer.calculate_degradation(&laps);
    for _ in 0..50 {
        assert_eq!(analyzer.calculate_degradation(&laps), first);
    }
}
