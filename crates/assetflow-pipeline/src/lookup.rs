//! Host-supplied lookup tables (e.g. animation name → id).

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// A name → value table. Iteration follows insertion order.
pub type LookupTable = IndexMap<String, Value>;

/// Lookup tables by name.
pub type LookupTables = HashMap<String, LookupTable>;

/// Load a lookup table from a JSON file.
///
/// `pointer` is an RFC 6901 JSON pointer (e.g. `/byPath`) selecting the
/// object inside the document that holds the table.
pub fn load_lookup_table(path: &Path, pointer: Option<&str>) -> Result<LookupTable> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::LookupTable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let document: Value = serde_json::from_str(&content).map_err(|e| PipelineError::LookupTable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let selected = match pointer {
        Some(pointer) if !pointer.is_empty() => {
            document
                .pointer(pointer)
                .ok_or_else(|| PipelineError::LookupTable {
                    path: path.to_path_buf(),
                    reason: format!("pointer '{}' not found", pointer),
                })?
        }
        _ => &document,
    };

    match selected {
        Value::Object(map) => {
            let table: LookupTable = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            debug!(path = %path.display(), entries = table.len(), "Loaded lookup table");
            Ok(table)
        }
        _ => Err(PipelineError::LookupTable {
            path: path.to_path_buf(),
            reason: "table is not a JSON object".to_string(),
        }),
    }
}
