use std::{collections::BTreeMap, path::Path};

use itertools::Itertools;
use log::info;
use serde_json::{Map, Value};

use super::{COL_DRIVER, LapTable};
use crate::StintlabError;

type Record = Map<String, Value>;

fn read_records(source_file: &Path) -> Result<Vec<Record>, StintlabError> {
    serde_jsonlines::json_lines(source_file)
        .map_err(|e| StintlabError::LapFileError { source: e })?
        .collect::<Result<Vec<Record>, std::io::Error>>()
        .map_err(|e| StintlabError::LapFileError { source: e })
}

/// Load every driver's laps from a JSON-lines lap file.
///
/// Records without a `Driver` column are grouped under an empty driver name.
pub fn load_session_laps(source_file: &Path) -> Result<BTreeMap<String, LapTable>, StintlabError> {
    let records = read_records(source_file)?;
    let record_count = records.len();

    let by_driver = records.into_iter().into_group_map_by(|record| {
        record
            .get(COL_DRIVER)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    });

    let tables = by_driver
        .into_iter()
        .map(|(driver, records)| {
            LapTable::from_records(driver.clone(), &records).map(|table| (driver, table))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    info!(
        "Loaded {:?}, found {} drivers with a total of {} laps",
        source_file,
        tables.len(),
        record_count
    );
    Ok(tables)
}

/// Load a single driver's lap table from a JSON-lines lap file.
pub fn load_lap_table(source_file: &Path, driver: &str) -> Result<LapTable, StintlabError> {
    load_session_laps(source_file)?
        .remove(driver)
        .ok_or_else(|| StintlabError::UnknownDriver {
            driver: driver.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_groups_by_driver() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"Driver": "VER", "LapNumber": 1, "LapTime": 95.1, "Compound": "SOFT", "TyreLife": 1}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"Driver": "HAM", "LapNumber": 1, "LapTime": 95.4, "Compound": "MEDIUM", "TyreLife": 1}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"Driver": "VER", "LapNumber": 2, "LapTime": 93.9, "Compound": "SOFT", "TyreLife": 2}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let tables = load_session_laps(file.path()).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables["VER"].len(), 2);
        assert_eq!(tables["HAM"].laps[0].driver, "HAM");

        let ver = load_lap_table(file.path(), "VER").unwrap();
        assert_eq!(ver.laps[1].lap_time_s, Some(93.9));
        assert!(matches!(
            load_lap_table(file.path(), "LEC"),
            Err(StintlabError::UnknownDriver { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = load_session_laps(Path::new("/nonexistent/laps.jsonl"));
        assert!(matches!(result, Err(StintlabError::LapFileError { .. })));
    }
}
