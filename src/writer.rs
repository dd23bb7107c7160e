use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use log::info;
use serde::Serialize;

use crate::StintlabError;

/// Write `report` as pretty printed JSON to `output`, or to stdout when no
/// output file is given.
pub fn write_report<T: Serialize>(report: &T, output: Option<&Path>) -> Result<(), StintlabError> {
    match output {
        Some(path) => {
            let report_file =
                File::create(path).map_err(|e| StintlabError::WriterError { source: e })?;
            write_json(report, BufWriter::new(report_file))?;
            info!("Report written to {:?}", path);
            Ok(())
        }
        None => write_json(report, io::stdout().lock()),
    }
}

fn write_json<T: Serialize, W: Write>(report: &T, mut writer: W) -> Result<(), StintlabError> {
    serde_json::to_writer_pretty(&mut writer, report)
        .map_err(|e| StintlabError::ReportSerializeError { source: e })?;
    writeln!(writer).map_err(|e| StintlabError::WriterError { source: e })?;
    writer
        .flush()
        .map_err(|e| StintlabError::WriterError { source: e })
}
