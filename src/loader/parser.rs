use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Parses a JSON file into a given type `T`.
///
/// Errors are converted into `crate::error::Error` variants:
/// - `Error::IoError` if the file cannot be read.
/// - `Error::DeserializationError` if the JSON is malformed.
pub fn parse_json_file<T: DeserializeOwned>(file_path: &str) -> Result<T> {
    let data = fs::read_to_string(file_path)?;

    let parsed_data: T = serde_json::from_str(&data)?;

    Ok(parsed_data)
}

/// Parses a JSON-lines file, one `T` per non-blank line.
pub fn parse_json_lines<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<Vec<T>> {
    let data = fs::read_to_string(file_path)?;

    data.lines().filter(|line| !line.trim().is_empty()).map(|line| serde_json::from_str(line).map_err(Into::into)).collect()
}

/// Reads an event log that is either a JSON array or JSON lines.
pub fn parse_events_file<T: DeserializeOwned>(file_path: &str) -> Result<Vec<T>> {
    let data = fs::read_to_string(file_path)?;

    if data.trim_start().starts_with('[') { Ok(serde_json::from_str(&data)?) } else { parse_json_lines(file_path) }
}
