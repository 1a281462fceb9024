use crate::error::{ExpenseDashboardError, Result};
use crate::ingestion::{RawRecord, RawValue};
use crate::schema::{DashboardConfig, Dimension, FieldMapping, Granularity};
use crate::utils::{month_start, quarter_start};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d %b %Y",
    "%b %d, %Y",
    "%d-%b-%Y",
];

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹', '₩', '₽', '¢'];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// An expense line that passed cleaning. Always carries a finite amount, a
/// valid date and non-empty vendor and category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub vendor: String,
    pub category: String,
    pub amount: f64,
    pub invoice_date: NaiveDate,
    pub period_month: NaiveDate,
    pub period_quarter: NaiveDate,
    pub description: Option<String>,
    /// Remaining non-empty raw fields, rendered as text.
    pub extra: BTreeMap<String, String>,
}

impl NormalizedRecord {
    pub fn new(vendor: &str, category: &str, amount: f64, invoice_date: NaiveDate) -> Self {
        Self {
            vendor: vendor.to_string(),
            category: category.to_string(),
            amount,
            invoice_date,
            period_month: month_start(invoice_date),
            period_quarter: quarter_start(invoice_date),
            description: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn period(&self, granularity: Granularity) -> NaiveDate {
        match granularity {
            Granularity::Monthly => self.period_month,
            Granularity::Quarterly => self.period_quarter,
        }
    }

    pub fn dimension_value(&self, dimension: &Dimension) -> Option<&str> {
        match dimension {
            Dimension::Vendor => Some(&self.vendor),
            Dimension::Category => Some(&self.category),
            Dimension::Description => self
                .description
                .as_deref()
                .or_else(|| self.extra.get(Dimension::Description.name()).map(String::as_str)),
            Dimension::Field(name) => self.extra.get(name).map(String::as_str),
        }
    }

    /// Group key for `dimensions`; a dimension the record lacks contributes an empty part
    /// so that every record still lands in exactly one bucket.
    pub fn dimension_key(&self, dimensions: &[Dimension]) -> Vec<String> {
        dimensions
            .iter()
            .map(|d| self.dimension_value(d).unwrap_or_default().to_string())
            .collect()
    }

    /// Re-emits the record under the raw field names of `fields`.
    pub fn to_raw(&self, fields: &FieldMapping) -> RawRecord {
        let mut raw: RawRecord = self
            .extra
            .iter()
            .map(|(name, value)| (name.clone(), RawValue::Text(value.clone())))
            .collect();

        raw.insert(fields.vendor.clone(), RawValue::Text(self.vendor.clone()));
        raw.insert(fields.category.clone(), RawValue::Text(self.category.clone()));
        raw.insert(fields.amount.clone(), RawValue::Number(self.amount));
        raw.insert(fields.date.clone(), RawValue::Date(self.invoice_date));

        if let (Some(name), Some(description)) = (&fields.description, &self.description) {
            raw.insert(name.clone(), RawValue::Text(description.clone()));
        }

        raw
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropSummary {
    pub input: usize,
    pub kept: usize,
    /// Amount present but not parseable as a number.
    pub invalid_amount: usize,
    /// Date present but not parseable.
    pub invalid_date: usize,
    /// Some required field absent or blank.
    pub missing_required: usize,
}

impl DropSummary {
    pub fn dropped(&self) -> usize {
        self.input.saturating_sub(self.kept)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedSet {
    pub records: Vec<NormalizedRecord>,
    pub drops: DropSummary,
}

impl NormalizedSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_amount(&self) -> f64 {
        self.records.iter().map(|r| r.amount).sum()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.invoice_date).max()
    }
}

enum DropReason {
    InvalidAmount,
    InvalidDate,
    MissingRequired,
}

pub struct Normalizer<'a> {
    fields: &'a FieldMapping,
    extra_required: &'a [String],
}

impl<'a> Normalizer<'a> {
    pub fn new(fields: &'a FieldMapping, extra_required: &'a [String]) -> Self {
        Self {
            fields,
            extra_required,
        }
    }

    pub fn from_config(config: &'a DashboardConfig) -> Self {
        Self::new(&config.fields, &config.extra_required_fields)
    }

    pub fn normalize(&self, raw_records: &[RawRecord]) -> Result<NormalizedSet> {
        self.check_schema(raw_records)?;

        let mut records = Vec::with_capacity(raw_records.len());
        let mut drops = DropSummary {
            input: raw_records.len(),
            ..DropSummary::default()
        };

        for raw in raw_records {
            match self.normalize_one(raw) {
                Ok(record) => records.push(record),
                Err(DropReason::InvalidAmount) => drops.invalid_amount += 1,
                Err(DropReason::InvalidDate) => drops.invalid_date += 1,
                Err(DropReason::MissingRequired) => drops.missing_required += 1,
            }
        }
        drops.kept = records.len();

        debug!(
            "Normalized {} of {} records ({} bad amount, {} bad date, {} missing fields)",
            drops.kept,
            drops.input,
            drops.invalid_amount,
            drops.invalid_date,
            drops.missing_required
        );
        if drops.kept == 0 && drops.input > 0 {
            warn!("Every one of {} records was dropped during cleaning", drops.input);
        }

        Ok(NormalizedSet { records, drops })
    }

    /// A required column missing from every record is a configuration problem,
    /// not a data problem. An empty batch has no schema to check.
    fn check_schema(&self, raw_records: &[RawRecord]) -> Result<()> {
        if raw_records.is_empty() {
            return Ok(());
        }

        for (role, field) in self.fields.required_with(self.extra_required) {
            if !raw_records.iter().any(|r| r.contains_key(field)) {
                return Err(ExpenseDashboardError::MissingField {
                    field: field.to_string(),
                    role: role.to_string(),
                });
            }
        }

        Ok(())
    }

    fn normalize_one(&self, raw: &RawRecord) -> std::result::Result<NormalizedRecord, DropReason> {
        let amount_cell = raw.get(&self.fields.amount);
        let date_cell = raw.get(&self.fields.date);

        let amount = amount_cell.and_then(parse_amount);
        let invoice_date = date_cell.and_then(parse_date);
        let vendor = raw.get(&self.fields.vendor).and_then(RawValue::as_text);
        let category = raw.get(&self.fields.category).and_then(RawValue::as_text);
        let extras_present = self
            .extra_required
            .iter()
            .all(|field| raw.get(field).is_some_and(|v| !v.is_empty()));

        let (amount, invoice_date, vendor, category) =
            match (amount, invoice_date, vendor, category) {
                (Some(a), Some(d), Some(v), Some(c)) if extras_present => (a, d, v, c),
                (amount, invoice_date, _, _) => {
                    let present = |cell: Option<&RawValue>| cell.is_some_and(|v| !v.is_empty());
                    return Err(if amount.is_none() && present(amount_cell) {
                        DropReason::InvalidAmount
                    } else if invoice_date.is_none() && present(date_cell) {
                        DropReason::InvalidDate
                    } else {
                        DropReason::MissingRequired
                    });
                }
            };

        let description = self
            .fields
            .description
            .as_ref()
            .and_then(|name| raw.get(name))
            .and_then(RawValue::as_text);

        let extra = raw
            .iter()
            .filter(|(name, _)| !self.fields.is_mapped(name))
            .filter_map(|(name, value)| value.as_text().map(|text| (name.clone(), text)))
            .collect();

        Ok(NormalizedRecord {
            vendor,
            category,
            amount,
            invoice_date,
            period_month: month_start(invoice_date),
            period_quarter: quarter_start(invoice_date),
            description,
            extra,
        })
    }
}

pub fn normalize(
    raw_records: &[RawRecord],
    fields: &FieldMapping,
    extra_required: &[String],
) -> Result<NormalizedSet> {
    Normalizer::new(fields, extra_required).normalize(raw_records)
}

pub fn parse_amount(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Number(n) if n.is_finite() => Some(*n),
        RawValue::Text(s) => parse_amount_text(s),
        _ => None,
    }
}

/// Strips currency symbols and `,` then parses; accounting-style `(12.50)` is negative.
pub fn parse_amount_text(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && !CURRENCY_SYMBOLS.contains(c))
        .collect();
    let cleaned = cleaned.trim();

    let value = match cleaned.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => -inner.trim().parse::<f64>().ok()?,
        None => cleaned.parse::<f64>().ok()?,
    };

    value.is_finite().then_some(value)
}

pub fn parse_date(value: &RawValue) -> Option<NaiveDate> {
    match value {
        RawValue::Date(d) => Some(*d),
        RawValue::Text(s) => parse_date_text(s),
        _ => None,
    }
}

pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}
