//! JSON Lines seed records
//!
//! One `{"content": "...", "metadata": {...}}` object per line. Blank lines
//! are skipped; the first malformed line aborts loading.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

use super::RetrievalError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedRecord {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

pub fn parse_seed(text: &str) -> Result<Vec<SeedRecord>, RetrievalError> {
    let mut records = Vec::new();
    for (offset, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: SeedRecord =
            serde_json::from_str(line).map_err(|e| RetrievalError::Seed {
                line: offset + 1,
                message: e.to_string(),
            })?;
        records.push(record);
    }
    Ok(records)
}

pub fn load_seed(path: &Path) -> Result<Vec<SeedRecord>, RetrievalError> {
    let text = std::fs::read_to_string(path)?;
    let records = parse_seed(&text)?;
    tracing::info!(path = %path.display(), count = records.len(), "Loaded seed records");
    Ok(records)
}
