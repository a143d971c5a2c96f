use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One named set of variable values driving one fan-out iteration of a
/// data-driven test. Constructed once at file load and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub values: BTreeMap<String, Value>,
}

impl DataSet {
    pub fn new(name: Option<String>, values: BTreeMap<String, Value>) -> Self {
        Self { name, values }
    }

    /// Label used in results: the row name, or `row N` for unnamed rows.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("row {}", index + 1))
    }
}

/// Load data rows from an external file, dispatching on extension.
///
/// JSON files hold an array of `{name?, values}` objects or plain objects
/// (each object becoming one row). CSV files hold a header row naming the
/// variables followed by one row per iteration.
///
/// # Errors
///
/// Returns an error if the file cannot be read, has an unsupported
/// extension, or does not parse.
pub fn load_data_file(path: &Path) -> Result<Vec<DataSet>, String> {
    let input = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read data file '{}': {e}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_json_rows(&input)
            .map_err(|e| format!("invalid data file '{}': {e}", path.display())),
        Some("csv") => parse_csv_rows(&input)
            .map_err(|e| format!("invalid data file '{}': {e}", path.display())),
        other => Err(format!(
            "unsupported data file extension '{}' (expected: json, csv)",
            other.unwrap_or("")
        )),
    }
}

fn parse_json_rows(input: &str) -> Result<Vec<DataSet>, String> {
    let value: Value = serde_json::from_str(input).map_err(|e| e.to_string())?;
    let Value::Array(rows) = value else {
        return Err("expected a top-level array of rows".into());
    };

    let mut datasets = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        let Value::Object(obj) = row else {
            return Err(format!("row {} is not an object", i + 1));
        };
        // `{name?, values}` shape, or a plain object of values.
        if let Some(Value::Object(values)) = obj.get("values") {
            let name = obj.get("name").and_then(Value::as_str).map(str::to_owned);
            datasets.push(DataSet::new(
                name,
                values.clone().into_iter().collect(),
            ));
        } else {
            datasets.push(DataSet::new(None, obj.into_iter().collect()));
        }
    }
    Ok(datasets)
}

fn parse_csv_rows(input: &str) -> Result<Vec<DataSet>, String> {
    let mut lines = input.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or("empty CSV file")?;
    let columns = split_csv_line(header);
    if columns.is_empty() {
        return Err("CSV header has no columns".into());
    }

    let mut datasets = Vec::new();
    for (i, line) in lines.enumerate() {
        let fields = split_csv_line(line);
        if fields.len() != columns.len() {
            return Err(format!(
                "row {} has {} fields, header has {}",
                i + 1,
                fields.len(),
                columns.len()
            ));
        }
        let values = columns
            .iter()
            .cloned()
            .zip(fields.into_iter().map(Value::String))
            .collect();
        datasets.push(DataSet::new(None, values));
    }
    Ok(datasets)
}

/// Split one CSV line on commas, honoring double-quoted fields with `""`
/// escapes. Values stay strings; typed rows belong in JSON data files.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(current.trim().to_owned());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_owned());
    fields
}
