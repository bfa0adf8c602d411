use thiserror::Error;

use crate::construct::{DatasetKind, MemberKind};

#[derive(Error, Debug)]
pub enum TgisError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error in <{statement}>: {message}")]
    Persistence { statement: String, message: String },
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Parse error: {message}")]
    Parse { message: String },
    #[error("Map <{map}> of type {map_kind} can not be registered in space time {dataset_kind} dataset <{dataset}>")]
    TypeMismatch {
        map: String,
        map_kind: MemberKind,
        dataset: String,
        dataset_kind: DatasetKind,
    },
    #[error("Only maps from the same mapset can be registered: <{map}> is not in the mapset of <{dataset}>")]
    MapsetMismatch { map: String, dataset: String },
    #[error("Map <{map}> has {found} time, but space time dataset <{dataset}> requires {expected} time")]
    TemporalTypeMismatch {
        map: String,
        dataset: String,
        found: String,
        expected: String,
    },
    #[error("Map <{0}> has no valid time")]
    InvalidTime(String),
    #[error("Time stamp {0} lies outside the years 0000 to 9999")]
    OutOfRange(String),
    #[error("Malformed interval: end time {end} is earlier than start time {start}")]
    MalformedInterval { start: String, end: String },
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Map <{0}> not found in temporal database")]
    UnknownMap(String),
    #[error("Space time dataset <{0}> not found in temporal database")]
    UnknownDataset(String),
    #[error("Space time dataset <{0}> already exists")]
    DatasetExists(String),
}

pub type Result<T> = std::result::Result<T, TgisError>;

impl TgisError {
    pub fn persistence(statement: &str, e: impl std::fmt::Display) -> Self {
        Self::Persistence {
            statement: statement.trim().to_string(),
            message: e.to_string(),
        }
    }
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::DataCorruption { message: message.into() }
    }
}

// Helper conversions
impl From<rusqlite::Error> for TgisError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence {
            statement: String::new(),
            message: e.to_string(),
        }
    }
}
impl From<::config::ConfigError> for TgisError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
