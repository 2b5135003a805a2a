//! CSV partition reading.
//!
//! The header row names the columns. Cells are typed per value:
//!
//! | Cell | Value |
//! |------|-------|
//! | empty | `null` |
//! | `12000001`, `-4` | integer |
//! | `0.5`, `1e3` | float |
//! | `007`, `abc` | string |

use std::path::Path;

use serde_json::{Number, Value};

use yata_core::Row;

use crate::error::{EngineError, Result};
use crate::query::{ColumnInfo, ColumnType};

/// Read a CSV file into typed rows, returning the columns in header order.
pub fn read_csv(path: &Path) -> Result<(Vec<ColumnInfo>, Vec<Row>)> {
    if !path.exists() {
        return Err(EngineError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Row::new();
        for (i, header) in headers.iter().enumerate() {
            let value = record.get(i).map(parse_cell).unwrap_or(Value::Null);
            row.insert(header.clone(), value);
        }
        rows.push(row);
    }

    let columns = infer_columns(&headers, &rows);
    tracing::debug!(path = %path.display(), rows = rows.len(), "CSV source read");
    Ok((columns, rows))
}

/// Type a single CSV cell.
pub fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if has_leading_zero(trimmed) {
        return Value::String(raw.to_string());
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if trimmed.bytes().any(|b| b.is_ascii_digit())
        && trimmed
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

/// `007` and `-01` are identifiers, not numbers.
fn has_leading_zero(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s).as_bytes();
    digits.len() > 1 && digits[0] == b'0' && digits[1].is_ascii_digit()
}

/// Infer one type per column from its non-null values.
pub fn infer_columns(names: &[String], rows: &[Row]) -> Vec<ColumnInfo> {
    names
        .iter()
        .map(|name| {
            let mut data_type: Option<ColumnType> = None;
            for value in rows.iter().filter_map(|r| r.get(name)) {
                let observed = match value {
                    Value::Null => continue,
                    Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Bigint,
                    Value::Number(_) => ColumnType::Double,
                    Value::Bool(_) => ColumnType::Boolean,
                    _ => ColumnType::Varchar,
                };
                data_type = Some(match (data_type, observed) {
                    (None, t) => t,
                    (Some(a), b) if a == b => a,
                    (Some(ColumnType::Bigint), ColumnType::Double)
                    | (Some(ColumnType::Double), ColumnType::Bigint) => ColumnType::Double,
                    _ => ColumnType::Varchar,
                });
            }
            ColumnInfo {
                name: name.clone(),
                data_type: data_type.unwrap_or(ColumnType::Varchar),
            }
        })
        .collect()
}

/// Column names of in-process rows, in order of first appearance.
pub fn column_names(rows: &[Row]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell(""), Value::Null);
        assert_eq!(parse_cell("  "), Value::Null);
        assert_eq!(parse_cell("12000001"), json!(12000001));
        assert_eq!(parse_cell("-4"), json!(-4));
        assert_eq!(parse_cell("0"), json!(0));
        assert_eq!(parse_cell("0.5"), json!(0.5));
        assert_eq!(parse_cell("007"), json!("007"));
        assert_eq!(parse_cell("Officer A"), json!("Officer A"));
        assert_eq!(parse_cell("inf"), json!("inf"));
        assert_eq!(parse_cell("NaN"), json!("NaN"));
        assert_eq!(parse_cell("2024-01-15"), json!("2024-01-15"));
    }

    #[test]
    fn test_read_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("officers.csv");
        std::fs::write(
            &path,
            "node_id,name,score\n12000001,Officer A,0.5\n12000002,\"Officer, B\",\n",
        )
        .unwrap();

        let (columns, rows) = read_csv(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["node_id"], json!(12000001));
        assert_eq!(rows[1]["name"], json!("Officer, B"));
        assert_eq!(rows[1]["score"], Value::Null);

        let types: Vec<_> = columns.iter().map(|c| c.data_type).collect();
        assert_eq!(
            types,
            vec![ColumnType::Bigint, ColumnType::Varchar, ColumnType::Double]
        );
    }

    #[test]
    fn test_read_csv_missing_file() {
        let err = read_csv(Path::new("/nonexistent/nodes.csv")).unwrap_err();
        assert!(matches!(err, EngineError::SourceNotFound { .. }));
    }

    #[test]
    fn test_infer_mixed_columns() {
        let rows: Vec<Row> = vec![
            json!({"a": 1, "b": 1, "c": null}),
            json!({"a": 2.5, "b": "x", "c": null}),
        ]
        .into_iter()
        .map(|v| match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        })
        .collect();

        let names = column_names(&rows);
        assert_eq!(names, vec!["a", "b", "c"]);
        let columns = infer_columns(&names, &rows);
        assert_eq!(columns[0].data_type, ColumnType::Double);
        assert_eq!(columns[1].data_type, ColumnType::Varchar);
        assert_eq!(columns[2].data_type, ColumnType::Varchar);
    }
}
