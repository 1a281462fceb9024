use crate::error::{ExpenseDashboardError, Result};
use crate::normalize::NormalizedRecord;
use crate::schema::{Dimension, Granularity};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One (period, group key) bucket of the long-form series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub period: NaiveDate,
    /// One value per grouping dimension, in grouping order.
    pub key: Vec<String>,
    pub amount: f64,
}

impl SeriesPoint {
    /// Presentation key, e.g. `"Travel - Acme"`.
    pub fn display_key(&self, separator: &str) -> String {
        self.key.join(separator)
    }
}

/// Everything a chart needs: the buckets plus axis and title text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSeries {
    pub granularity: Granularity,
    pub title: String,
    pub dimensions: Vec<Dimension>,
    pub points: Vec<SeriesPoint>,
}

impl ChartSeries {
    pub fn total(&self) -> f64 {
        self.points.iter().map(|p| p.amount).sum()
    }

    /// Series labels in first-seen order, joined with `separator`.
    pub fn series_labels(&self, separator: &str) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for point in &self.points {
            let label = point.display_key(separator);
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }
}

/// Sums amounts per (period, group key). Output is ordered by period, then key.
pub fn aggregate<'a, I>(
    records: I,
    granularity: Granularity,
    group_dims: &[Dimension],
) -> Result<Vec<SeriesPoint>>
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    if group_dims.is_empty() {
        return Err(ExpenseDashboardError::InvalidGrouping(
            "Aggregation needs at least one grouping dimension".to_string(),
        ));
    }

    let mut buckets: BTreeMap<(NaiveDate, Vec<String>), f64> = BTreeMap::new();
    for record in records {
        let key = (record.period(granularity), record.dimension_key(group_dims));
        *buckets.entry(key).or_insert(0.0) += record.amount;
    }

    debug!(
        "Aggregated into {} {} buckets over {:?}",
        buckets.len(),
        granularity,
        group_dims
    );

    Ok(buckets
        .into_iter()
        .map(|((period, key), amount)| SeriesPoint {
            period,
            key,
            amount,
        })
        .collect())
}

pub fn chart_series<'a, I>(
    records: I,
    granularity: Granularity,
    group_dims: &[Dimension],
) -> Result<ChartSeries>
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    let points = aggregate(records, granularity, group_dims)?;

    Ok(ChartSeries {
        granularity,
        title: format!("Expenses Grouped by {}", granularity),
        dimensions: group_dims.to_vec(),
        points,
    })
}
