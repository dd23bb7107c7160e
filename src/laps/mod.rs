pub mod loader;

use std::{collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::StintlabError;

pub use loader::{load_lap_table, load_session_laps};

/// Column names used by the session fetcher's lap tables.
pub const COL_DRIVER: &str = "Driver";
pub const COL_LAP_NUMBER: &str = "LapNumber";
pub const COL_LAP_TIME: &str = "LapTime";
pub const COL_COMPOUND: &str = "Compound";
pub const COL_TYRE_LIFE: &str = "TyreLife";
pub const COL_SECTOR_TIMES: [&str; 3] = ["Sector1Time", "Sector2Time", "Sector3Time"];

/// Tyre compound fitted for a lap.
///
/// Anything the fetcher reports outside the five racing compounds (test
/// compounds, missing data) ends up as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
    Unknown,
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compound::Soft => write!(f, "SOFT"),
            Compound::Medium => write!(f, "MEDIUM"),
            Compound::Hard => write!(f, "HARD"),
            Compound::Intermediate => write!(f, "INTERMEDIATE"),
            Compound::Wet => write!(f, "WET"),
            Compound::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl FromStr for Compound {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "SOFT" => Compound::Soft,
            "MEDIUM" => Compound::Medium,
            "HARD" => Compound::Hard,
            "INTERMEDIATE" | "INTER" => Compound::Intermediate,
            "WET" => Compound::Wet,
            _ => Compound::Unknown,
        })
    }
}

/// One completed timed lap for a driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    pub driver: String,
    /// 1-based lap number, unique per driver
    pub lap_number: u32,
    /// Lap time in seconds. `None` for in/out laps and laps without a valid time
    pub lap_time_s: Option<f64>,
    pub compound: Compound,
    /// Laps driven on this set of tyres
    pub tyre_age: u32,
    pub sector_times_s: [Option<f64>; 3],
}

impl Lap {
    pub fn new(
        driver: impl Into<String>,
        lap_number: u32,
        lap_time_s: Option<f64>,
        compound: Compound,
        tyre_age: u32,
    ) -> Self {
        Self {
            driver: driver.into(),
            lap_number,
            lap_time_s: lap_time_s.filter(|t| is_valid_time(*t)),
            compound,
            tyre_age,
            sector_times_s: [None; 3],
        }
    }
}

pub(crate) fn is_valid_time(t: f64) -> bool {
    t.is_finite() && t > 0.
}

/// All laps of one driver, ordered by lap number.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LapTable {
    pub driver: String,
    pub laps: Vec<Lap>,
}

impl LapTable {
    /// Build a table from already typed laps. Laps are sorted by lap number and
    /// lap numbers must be unique.
    pub fn new(driver: impl Into<String>, mut laps: Vec<Lap>) -> Result<Self, StintlabError> {
        let driver = driver.into();
        laps.sort_by_key(|lap| lap.lap_number);
        let mut seen = HashSet::new();
        for lap in &laps {
            if !seen.insert(lap.lap_number) {
                return Err(StintlabError::DuplicateLap {
                    driver: driver.clone(),
                    lap_number: lap.lap_number,
                });
            }
        }
        Ok(Self { driver, laps })
    }

    /// Validate raw fetcher records into a typed table.
    ///
    /// Required columns must be present on every record (a `null` lap time is
    /// fine, a missing `LapTime` key is not).
    pub fn from_records(
        driver: impl Into<String>,
        records: &[Map<String, Value>],
    ) -> Result<Self, StintlabError> {
        let driver = driver.into();
        let laps = records
            .iter()
            .enumerate()
            .map(|(row, record)| parse_lap(row, record, &driver))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(driver, laps)
    }

    pub fn is_empty(&self) -> bool {
        self.laps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.laps.len()
    }
}

fn required<'a>(
    row: usize,
    record: &'a Map<String, Value>,
    column: &str,
) -> Result<&'a Value, StintlabError> {
    record.get(column).ok_or(StintlabError::MissingColumn {
        column: column.to_string(),
        row,
    })
}

fn as_count(row: usize, value: &Value, column: &str) -> Result<u32, StintlabError> {
    let invalid = |reason: String| StintlabError::InvalidLapRecord { row, reason };
    let number = value
        .as_f64()
        .ok_or_else(|| invalid(format!("{column} is not a number: {value}")))?;
    if !number.is_finite() || number < 0. || number.fract() != 0. || number > u32::MAX as f64 {
        return Err(invalid(format!("{column} is not a lap count: {number}")));
    }
    Ok(number as u32)
}

fn as_optional_time(row: usize, value: Option<&Value>, column: &str) -> Result<Option<f64>, StintlabError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(|t| Some(t).filter(|t| is_valid_time(*t)))
            .ok_or_else(|| StintlabError::InvalidLapRecord {
                row,
                reason: format!("{column} is not a time in seconds: {v}"),
            }),
    }
}

fn parse_lap(row: usize, record: &Map<String, Value>, driver: &str) -> Result<Lap, StintlabError> {
    let lap_number = as_count(row, required(row, record, COL_LAP_NUMBER)?, COL_LAP_NUMBER)?;
    if lap_number == 0 {
        return Err(StintlabError::InvalidLapRecord {
            row,
            reason: "LapNumber must be positive".to_string(),
        });
    }
    let lap_time_s = as_optional_time(row, Some(required(row, record, COL_LAP_TIME)?), COL_LAP_TIME)?;
    let compound = match required(row, record, COL_COMPOUND)? {
        Value::String(s) => s.parse().unwrap_or(Compound::Unknown),
        _ => Compound::Unknown,
    };
    let tyre_age = match required(row, record, COL_TYRE_LIFE)? {
        Value::Null => 0,
        v => as_count(row, v, COL_TYRE_LIFE)?,
    };

    let mut sector_times_s = [None; 3];
    for (slot, column) in sector_times_s.iter_mut().zip(COL_SECTOR_TIMES) {
        *slot = as_optional_time(row, record.get(column), column)?;
    }

    Ok(Lap {
        driver: driver.to_string(),
        lap_number,
        lap_time_s,
        compound,
        tyre_age,
        sector_times_s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_records_are_sorted_and_typed() {
        let records = vec![
            record(json!({"LapNumber": 2, "LapTime": 91.2, "Compound": "soft", "TyreLife": 2.0})),
            record(json!({"LapNumber": 1, "LapTime": null, "Compound": "SOFT", "TyreLife": 1,
                "Sector1Time": 30.1})),
        ];
        let table = LapTable::from_records("VER", &records).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.laps[0].lap_number, 1);
        assert_eq!(table.laps[0].lap_time_s, None);
        assert_eq!(table.laps[0].sector_times_s[0], Some(30.1));
        assert_eq!(table.laps[1].compound, Compound::Soft);
        assert_eq!(table.laps[1].tyre_age, 2);
    }

    #[test]
    fn test_missing_column_fails_fast() {
        let records = vec![record(json!({"LapNumber": 1, "Compound": "SOFT", "TyreLife": 1}))];
        let err = LapTable::from_records("VER", &records).unwrap_err();
        assert!(matches!(err, StintlabError::MissingColumn { ref column, row: 0 } if column == COL_LAP_TIME));
    }

    #[test]
    fn test_invalid_lap_number_rejected() {
        let records = vec![record(json!({"LapNumber": 0, "LapTime": 90.0, "Compound": "SOFT", "TyreLife": 1}))];
        assert!(matches!(
            LapTable::from_records("VER", &records),
            Err(StintlabError::InvalidLapRecord { row: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_lap_rejected() {
        let laps = vec![
            Lap::new("VER", 3, Some(90.), Compound::Hard, 1),
            Lap::new("VER", 3, Some(90.5), Compound::Hard, 2),
        ];
        assert!(matches!(
            LapTable::new("VER", laps),
            Err(StintlabError::DuplicateLap { lap_number: 3, .. })
        ));
    }

    #[test]
    fn test_non_positive_lap_time_is_missing() {
        let lap = Lap::new("LEC", 4, Some(-1.), Compound::Medium, 4);
        assert_eq!(lap.lap_time_s, None);
        let lap = Lap::new("LEC", 4, Some(f64::NAN), Compound::Medium, 4);
        assert_eq!(lap.lap_time_s, None);
    }

    #[test]
    fn test_compound_parsing() {
        assert_eq!("Medium".parse::<Compound>().unwrap(), Compound::Medium);
        assert_eq!("INTER".parse::<Compound>().unwrap(), Compound::Intermediate);
        assert_eq!("TEST_UNKNOWN".parse::<Compound>().unwrap(), Compound::Unknown);
        assert_eq!(Compound::Wet.to_string(), "WET");
    }
}
