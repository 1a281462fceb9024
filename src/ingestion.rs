use crate::error::{ExpenseDashboardError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;

/// A single cell of an incoming expense row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Empty,
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl RawValue {
    /// Converts a JSON cell as delivered by a hosted table API.
    /// Lists (multi-selects, linked records) are flattened to a comma-joined string.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Empty),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| Self::from_json(item).as_text())
                    .collect();
                if parts.is_empty() {
                    Self::Empty
                } else {
                    Self::Text(parts.join(", "))
                }
            }
            Value::Object(_) => Self::Text(value.to_string()),
        }
    }

    /// Trimmed textual form, or `None` when the cell carries no value.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            Self::Empty => return None,
            Self::Bool(b) => b.to_string(),
            Self::Number(n) if n.is_finite() => n.to_string(),
            Self::Number(_) => return None,
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Text(s) => s.trim().to_string(),
        };

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_text().is_none()
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

/// One expense line item keyed by raw field name.
pub type RawRecord = BTreeMap<String, RawValue>;

/// Reads a delimited file with a header row. Every cell is kept as text;
/// blank cells become `RawValue::Empty` and short rows simply lack the trailing fields.
pub fn records_from_csv<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut records = Vec::new();

    for row in csv_reader.records() {
        let row = row?;
        let record: RawRecord = headers
            .iter()
            .zip(row.iter())
            .map(|(header, cell)| {
                let value = if cell.trim().is_empty() {
                    RawValue::Empty
                } else {
                    RawValue::Text(cell.to_string())
                };
                (header.to_string(), value)
            })
            .collect();
        records.push(record);
    }

    Ok(records)
}

#[derive(Debug, Clone, Deserialize)]
struct HostedRecord {
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum HostedPayload {
    Page { records: Vec<HostedRecord> },
    List(Vec<HostedRecord>),
}

/// Parses records fetched from a hosted spreadsheet-like service.
///
/// Accepts either a single API page (`{"records": [...]}`) or a bare list of
/// records, each shaped as `{"id": ..., "fields": {...}}`. Fields a record
/// leaves unset are simply absent from its `RawRecord`.
pub fn records_from_airtable_json(json: &str) -> Result<Vec<RawRecord>> {
    let payload: HostedPayload = serde_json::from_str(json).map_err(|e| {
        ExpenseDashboardError::MalformedSource(format!(
            "Expected a list of {{\"id\", \"fields\"}} records: {}",
            e
        ))
    })?;

    let records = match payload {
        HostedPayload::Page { records } => records,
        HostedPayload::List(records) => records,
    };

    Ok(records
        .into_iter()
        .map(|record| {
            record
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), RawValue::from_json(value)))
                .collect()
        })
        .collect())
}
