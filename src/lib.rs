//! # Expense Dashboard
//!
//! A library for turning raw expense rows (from an uploaded CSV or a hosted
//! spreadsheet-like table) into the data behind an expense dashboard: a
//! period-bucketed series for charting and monthly pivot tables with a
//! trailing-12-month total.
//!
//! ## Core Concepts
//!
//! - **Raw Records**: Rows keyed by field name, with no fixed schema
//! - **Normalization**: Amounts stripped of currency symbols and `,` and parsed, dates parsed tolerantly,
//!   incomplete rows dropped, month and quarter keys derived
//! - **Selections**: Allowed values per dimension (vendor, category, any raw field)
//! - **Chart Series**: Long-form (period, key, amount) buckets at monthly or quarterly granularity
//! - **Pivot Tables**: One row per key, zero-filled month columns from a fixed start
//!   through the latest date, plus a trailing-12-month total
//!
//! Every call recomputes from the inputs; nothing is cached or mutated in place.
//!
//! ## Example
//!
//! ```rust,ignore
//! use expense_dashboard::*;
//!
//! let raw = records_from_csv(std::fs::File::open("expenses.csv")?)?;
//! let config = DashboardConfig {
//!     granularity: Granularity::Quarterly,
//!     group_by: vec![Dimension::Category],
//!     selections: Selections::new().with(Dimension::Vendor, ["Acme", "Globex"]),
//!     ..DashboardConfig::default()
//! };
//!
//! let view = process_dashboard(&config, &raw)?;
//! for point in &view.chart.points {
//!     println!("{} {} {:.2}", point.period, point.display_key(" - "), point.amount);
//! }
//! ```

pub mod aggregate;
pub mod error;
pub mod filter;
pub mod ingestion;
pub mod normalize;
pub mod pivot;
pub mod report;
pub mod schema;
pub mod utils;

pub use aggregate::{aggregate, chart_series, ChartSeries, SeriesPoint};
pub use error::{ExpenseDashboardError, Result};
pub use filter::{distinct_values, filter_records, Selections};
pub use ingestion::*;
pub use normalize::{normalize, DropSummary, NormalizedRecord, NormalizedSet, Normalizer};
pub use pivot::{
    build_pivot, PivotBuilder, PivotRow, PivotTable, MAX_PIVOT_MONTHS, TRAILING_TOTAL_LABEL,
};
pub use report::{detail_table, write_detail_csv, write_pivot_csv, DetailRow};
pub use schema::*;
pub use utils::*;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Everything one dashboard render needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardView {
    pub chart: ChartSeries,
    /// One table per entry of `DashboardConfig::pivot_indexes`, same order.
    pub pivots: Vec<PivotTable>,
    pub detail: Vec<DetailRow>,
    pub drops: DropSummary,
    /// Records left after filtering.
    pub filtered_count: usize,
    pub key_separator: String,
}

impl DashboardView {
    pub fn chart_labels(&self) -> Vec<String> {
        self.chart.series_labels(&self.key_separator)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub struct ExpenseDashboard;

impl ExpenseDashboard {
    /// Full pass: normalize, filter, aggregate and pivot.
    pub fn process(config: &DashboardConfig, raw_records: &[RawRecord]) -> Result<DashboardView> {
        config.validate()?;

        info!(
            "Processing {} raw expense records ({} view, grouped by {:?})",
            raw_records.len(),
            config.granularity,
            config.group_by
        );

        let normalized = Normalizer::from_config(config).normalize(raw_records)?;
        Self::recompute(config, &normalized)
    }

    /// Re-runs filtering and aggregation over an already normalized baseline,
    /// e.g. after the user changes a selection.
    pub fn recompute(config: &DashboardConfig, normalized: &NormalizedSet) -> Result<DashboardView> {
        config.validate()?;

        let fields = &config.fields;
        let selections = config.selections.canonicalize(fields);
        if selections.excludes_everything() {
            warn!("A selection has no allowed values; every record is filtered out");
        }

        let filtered = filter_records(&normalized.records, &selections);
        debug!(
            "{} of {} normalized records pass the selections",
            filtered.len(),
            normalized.len()
        );

        let group_by = fields.canonical_all(&config.group_by);
        let chart = chart_series(filtered.iter().copied(), config.granularity, &group_by)?;

        let start = config.pivot_start_date()?;
        let pivots = config
            .pivot_indexes
            .iter()
            .map(|index| {
                build_pivot(
                    filtered.iter().copied(),
                    &fields.canonical_all(index),
                    start,
                    config.latest,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DashboardView {
            chart,
            pivots,
            detail: detail_table(filtered.iter().copied()),
            drops: normalized.drops,
            filtered_count: filtered.len(),
            key_separator: config.key_separator.clone(),
        })
    }
}

pub fn process_dashboard(config: &DashboardConfig, raw_records: &[RawRecord]) -> Result<DashboardView> {
    ExpenseDashboard::process(config, raw_records)
}
