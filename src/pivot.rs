//! Wide monthly pivot tables with a trailing-12-month total column.
//!
//! Month columns run contiguously from a fixed start month through the month
//! of the latest date, zero-filled, so the column set only depends on those
//! two dates and never on how sparse the data is.

use crate::error::{ExpenseDashboardError, Result};
use crate::normalize::NormalizedRecord;
use crate::schema::Dimension;
use crate::utils::{
    month_label, month_start, month_starts_in_period, months_before, months_between,
};
use chrono::{Local, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TRAILING_TOTAL_LABEL: &str = "Trailing 12 Months Total";

const TRAILING_MONTHS: u32 = 12;

/// Upper bound on the number of month columns in one table.
pub const MAX_PIVOT_MONTHS: i32 = 1200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotRow {
    /// One value per index dimension.
    pub key: Vec<String>,
    pub trailing_12_total: f64,
    /// One amount per entry of `PivotTable::months`.
    pub monthly: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotTable {
    pub index_names: Vec<Dimension>,
    /// Month starts of the value columns, ascending.
    pub months: Vec<NaiveDate>,
    pub start: NaiveDate,
    pub latest: NaiveDate,
    /// First day covered by the trailing-12 column.
    pub window_start: NaiveDate,
    pub rows: Vec<PivotRow>,
}

impl PivotTable {
    pub fn month_labels(&self) -> Vec<String> {
        self.months.iter().map(|m| month_label(*m)).collect()
    }

    /// Index column names, the trailing total, then one label per month.
    pub fn column_headers(&self) -> Vec<String> {
        self.index_names
            .iter()
            .map(|d| d.name().to_string())
            .chain(std::iter::once(TRAILING_TOTAL_LABEL.to_string()))
            .chain(self.month_labels())
            .collect()
    }

    pub fn row(&self, key: &[&str]) -> Option<&PivotRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn trailing_total(&self) -> f64 {
        self.rows.iter().map(|r| r.trailing_12_total).sum()
    }

    /// Column sums of the month cells.
    pub fn month_totals(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.months.len()];
        for row in &self.rows {
            for (total, value) in totals.iter_mut().zip(&row.monthly) {
                *total += value;
            }
        }
        totals
    }
}

pub struct PivotBuilder {
    index_dims: Vec<Dimension>,
    start: NaiveDate,
    latest: Option<NaiveDate>,
}

impl PivotBuilder {
    pub fn new(index_dims: Vec<Dimension>, start: NaiveDate) -> Self {
        Self {
            index_dims,
            start,
            latest: None,
        }
    }

    /// Pins the end of the month range and trailing window. Without it the
    /// latest invoice date of the records is used, or today if there are none.
    #[must_use]
    pub fn with_latest(mut self, latest: Option<NaiveDate>) -> Self {
        self.latest = latest;
        self
    }

    pub fn build<'a, I>(&self, records: I) -> Result<PivotTable>
    where
        I: IntoIterator<Item = &'a NormalizedRecord>,
    {
        if self.index_dims.is_empty() {
            return Err(ExpenseDashboardError::InvalidGrouping(
                "Pivot needs at least one index dimension".to_string(),
            ));
        }

        let records: Vec<&NormalizedRecord> = records.into_iter().collect();

        let latest = match self.latest {
            Some(latest) => latest,
            None => records
                .iter()
                .map(|r| r.invoice_date)
                .max()
                .unwrap_or_else(|| Local::now().date_naive()),
        };

        let span = months_between(month_start(self.start), month_start(latest)) + 1;
        if span > MAX_PIVOT_MONTHS {
            return Err(ExpenseDashboardError::InvalidPeriod(format!(
                "Pivot from {} to {} spans {} months, more than the {} allowed",
                self.start, latest, span, MAX_PIVOT_MONTHS
            )));
        }

        let months = month_starts_in_period(self.start, latest);
        let column_of: BTreeMap<NaiveDate, usize> =
            months.iter().enumerate().map(|(i, m)| (*m, i)).collect();
        let window_start = month_start(months_before(latest, TRAILING_MONTHS)?);

        // Pass one: month buckets from the start date on.
        let mut monthly: BTreeMap<Vec<String>, Vec<f64>> = BTreeMap::new();
        for record in records.iter().filter(|r| r.invoice_date >= self.start) {
            let cells = monthly
                .entry(record.dimension_key(&self.index_dims))
                .or_insert_with(|| vec![0.0; months.len()]);
            if let Some(&col) = column_of.get(&record.period_month) {
                cells[col] += record.amount;
            }
        }

        // Pass two: trailing window totals.
        let mut trailing: BTreeMap<Vec<String>, f64> = BTreeMap::new();
        for record in records
            .iter()
            .filter(|r| r.invoice_date >= window_start && r.invoice_date <= latest)
        {
            *trailing
                .entry(record.dimension_key(&self.index_dims))
                .or_insert(0.0) += record.amount;
        }

        let mut keys: Vec<Vec<String>> = monthly.keys().cloned().collect();
        keys.extend(trailing.keys().filter(|k| !monthly.contains_key(*k)).cloned());
        keys.sort();

        let rows: Vec<PivotRow> = keys
            .into_iter()
            .map(|key| PivotRow {
                trailing_12_total: trailing.get(&key).copied().unwrap_or(0.0),
                monthly: monthly
                    .remove(&key)
                    .unwrap_or_else(|| vec![0.0; months.len()]),
                key,
            })
            .collect();

        debug!(
            "Pivot on {:?}: {} rows x {} months ({} to {}, trailing from {})",
            self.index_dims,
            rows.len(),
            months.len(),
            self.start,
            latest,
            window_start
        );

        Ok(PivotTable {
            index_names: self.index_dims.clone(),
            months,
            start: self.start,
            latest,
            window_start,
            rows,
        })
    }
}

pub fn build_pivot<'a, I>(
    records: I,
    index_dims: &[Dimension],
    start_period: NaiveDate,
    latest_period: Option<NaiveDate>,
) -> Result<PivotTable>
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    PivotBuilder::new(index_dims.to_vec(), start_period)
        .with_latest(latest_period)
        .build(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_single_record_zero_fill() {
        let records = vec![NormalizedRecord::new("A", "X", 30.0, ymd(2024, 2, 15))];
        let table = build_pivot(
            &records,
            &[Dimension::Vendor],
            ymd(2024, 1, 1),
            Some(ymd(2024, 3, 1)),
        )
        .unwrap();

        assert_eq!(table.month_labels(), vec!["Jan 2024", "Feb 2024", "Mar 2024"]);
        assert_eq!(table.rows.len(), 1);

        let row = table.row(&["A"]).unwrap();
        assert!((row.trailing_12_total - 30.0).abs() < 0.01);
        assert_eq!(row.monthly, vec![0.0, 30.0, 0.0]);
    }

    #[test]
    fn test_column_count_matches_month_span() {
        let records = vec![
            NormalizedRecord::new("A", "X", 1.0, ymd(2023, 6, 3)),
            NormalizedRecord::new("B", "X", 2.0, ymd(2024, 9, 30)),
        ];
        let start = ymd(2023, 1, 1);
        let table = build_pivot(&records, &[Dimension::Vendor], start, None).unwrap();

        assert_eq!(table.latest, ymd(2024, 9, 30));
        let expected = months_between(start, table.latest) + 1;
        assert_eq!(table.months.len() as i32, expected);
        for row in &table.rows {
            assert_eq!(row.monthly.len(), table.months.len());
        }
    }

    #[test]
    fn test_trailing_window_bounds() {
        let records = vec![
            // Before the window start (2023-03-01).
            NormalizedRecord::new("A", "X", 1.0, ymd(2023, 2, 28)),
            // First day of the window.
            NormalizedRecord::new("A", "X", 10.0, ymd(2023, 3, 1)),
            NormalizedRecord::new("A", "X", 100.0, ymd(2024, 3, 20)),
            // After latest.
            NormalizedRecord::new("A", "X", 1000.0, ymd(2024, 3, 25)),
        ];

        let table = build_pivot(
            &records,
            &[Dimension::Vendor],
            ymd(2024, 1, 1),
            Some(ymd(2024, 3, 20)),
        )
        .unwrap();

        assert_eq!(table.window_start, ymd(2023, 3, 1));
        let row = table.row(&["A"]).unwrap();
        assert!((row.trailing_12_total - 110.0).abs() < 0.01);
        assert_eq!(row.monthly, vec![0.0, 0.0, 1100.0]);
    }

    #[test]
    fn test_rows_from_either_pass_are_merged() {
        let records = vec![
            // Only in the trailing window (before the fixed start).
            NormalizedRecord::new("Old", "X", 40.0, ymd(2023, 11, 5)),
            NormalizedRecord::new("New", "X", 7.0, ymd(2024, 2, 1)),
        ];

        let table = build_pivot(
            &records,
            &[Dimension::Vendor],
            ymd(2024, 1, 1),
            Some(ymd(2024, 2, 29)),
        )
        .unwrap();

        let keys: Vec<&str> = table.rows.iter().map(|r| r.key[0].as_str()).collect();
        assert_eq!(keys, vec!["New", "Old"]);

        let old = table.row(&["Old"]).unwrap();
        assert!((old.trailing_12_total - 40.0).abs() < 0.01);
        assert_eq!(old.monthly, vec![0.0, 0.0]);

        let new = table.row(&["New"]).unwrap();
        assert_eq!(new.monthly, vec![0.0, 7.0]);
    }

    #[test]
    fn test_multi_dimension_index() {
        let records = vec![
            NormalizedRecord::new("A", "X", 5.0, ymd(2024, 1, 2)),
            NormalizedRecord::new("A", "Y", 6.0, ymd(2024, 1, 3)),
            NormalizedRecord::new("A", "X", 4.0, ymd(2024, 2, 3)),
        ];

        let table = build_pivot(
            &records,
            &[Dimension::Vendor, Dimension::Category],
            ymd(2024, 1, 1),
            None,
        )
        .unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.row(&["A", "X"]).unwrap().monthly, vec![5.0, 4.0]);
        assert_eq!(
            table.column_headers(),
            vec!["Vendor", "Category", TRAILING_TOTAL_LABEL, "Jan 2024", "Feb 2024"]
        );
        assert_eq!(table.month_totals(), vec![11.0, 4.0]);
    }

    #[test]
    fn test_start_after_latest_yields_only_trailing_column() {
        let records = vec![NormalizedRecord::new("A", "X", 25.0, ymd(2023, 6, 1))];
        let table = build_pivot(&records, &[Dimension::Vendor], ymd(2024, 1, 1), None).unwrap();

        assert!(table.months.is_empty());
        assert_eq!(table.column_headers(), vec!["Vendor", TRAILING_TOTAL_LABEL]);

        let row = table.row(&["A"]).unwrap();
        assert!(row.monthly.is_empty());
        assert!((row.trailing_12_total - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_records_fall_back_to_today() {
        let records: Vec<NormalizedRecord> = Vec::new();
        let start = ymd(2024, 1, 1);
        let table = build_pivot(&records, &[Dimension::Vendor], start, None).unwrap();

        let today = Local::now().date_naive();
        assert!(table.is_empty());
        assert!(table.latest >= today.pred_opt().unwrap());
        assert_eq!(
            table.months.len() as i32,
            months_between(start, table.latest) + 1
        );
        assert_eq!(table.trailing_total(), 0.0);
    }

    #[test]
    fn test_far_future_latest_is_rejected() {
        let records = vec![
            NormalizedRecord::new("A", "X", 1.0, ymd(2024, 1, 5)),
            NormalizedRecord::new("A", "X", 2.0, NaiveDate::MAX),
        ];

        let result = build_pivot(&records, &[Dimension::Vendor], ymd(2024, 1, 1), None);
        assert!(matches!(result, Err(ExpenseDashboardError::InvalidPeriod(_))));
    }

    #[test]
    fn test_widest_allowed_span() {
        let records = vec![NormalizedRecord::new("A", "X", 1.0, ymd(2024, 1, 5))];
        let start = ymd(1924, 2, 1);

        let table = build_pivot(&records, &[Dimension::Vendor], start, None).unwrap();
        assert_eq!(table.months.len() as i32, MAX_PIVOT_MONTHS);

        let too_wide = build_pivot(&records, &[Dimension::Vendor], ymd(1924, 1, 1), None);
        assert!(matches!(too_wide, Err(ExpenseDashboardError::InvalidPeriod(_))));
    }

    #[test]
    fn test_empty_index_is_rejected() {
        let records: Vec<NormalizedRecord> = Vec::new();
        assert!(matches!(
            build_pivot(&records, &[], ymd(2024, 1, 1), None),
            Err(ExpenseDashboardError::InvalidGrouping(_))
        ));
    }
}
