//! Result extraction
//!
//! Reads recognized text lines back out of a persisted result document.

use std::path::Path;

use crate::error::{Error, Result};

/// Read the ordered `rec_texts` lines from a persisted JSON document.
///
/// An absent `rec_texts` field yields an empty sequence; a missing file or
/// malformed document is a `Parse` error.
pub fn read_recognized_lines(json_path: &Path) -> Result<Vec<String>> {
    let content =
        std::fs::read_to_string(json_path).map_err(|e| Error::parse(json_path, e))?;
    let doc: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| Error::parse(json_path, e))?;

    match doc.get("rec_texts") {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| Error::parse(json_path, e)),
    }
}
