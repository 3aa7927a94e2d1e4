//! Newline-delimited JSON row bodies.

use serde_json::Value;
use tablemap_common::{Row, TableError, TableResult};

/// Parse a rows body: one JSON array per line, blank lines skipped.
///
/// Line numbers in errors are one-based.
pub fn parse_rows(body: &str) -> TableResult<Vec<Row>> {
    let mut rows = Vec::new();
    for (index, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(Value::Array(cells)) => rows.push(cells),
            Ok(other) => {
                return Err(TableError::RowParse {
                    line: index + 1,
                    message: format!("expected a JSON array, got {}", json_kind(&other)),
                })
            }
            Err(e) => {
                return Err(TableError::RowParse {
                    line: index + 1,
                    message: e.to_string(),
                })
            }
        }
    }
    Ok(rows)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
