// Error types for stintlab

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum StintlabError {
    // Lap table ingestion errors
    #[snafu(display("Missing required column {column} in lap record {row}"))]
    MissingColumn { column: String, row: usize },
    #[snafu(display("Invalid lap record {row}: {reason}"))]
    InvalidLapRecord { row: usize, reason: String },
    #[snafu(display("Duplicate lap {lap_number} for driver {driver}"))]
    DuplicateLap { driver: String, lap_number: u32 },
    #[snafu(display("No laps found for driver {driver}"))]
    UnknownDriver { driver: String },
    #[snafu(display("Error loading lap file"))]
    LapFileError { source: io::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Report writer errors
    #[snafu(display("Error writing report"))]
    WriterError { source: io::Error },
    #[snafu(display("Error serializing report"))]
    ReportSerializeError { source: serde_json::Error },
}
