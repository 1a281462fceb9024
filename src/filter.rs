//! Selection-based filtering of normalized records.

use crate::normalize::NormalizedRecord;
use crate::schema::{Dimension, FieldMapping};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Allowed values per dimension.
///
/// A dimension that is not listed does not filter. A listed dimension with an
/// empty set excludes every record, the same as a multi-select with nothing ticked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Selections {
    allowed: BTreeMap<Dimension, BTreeSet<String>>,
}

impl Selections {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts `dimension` to `values`, replacing any earlier restriction.
    #[must_use]
    pub fn with<I, S>(mut self, dimension: Dimension, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(dimension, values);
        self
    }

    pub fn set<I, S>(&mut self, dimension: Dimension, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed
            .insert(dimension, values.into_iter().map(Into::into).collect());
    }

    pub fn clear(&mut self, dimension: &Dimension) {
        self.allowed.remove(dimension);
    }

    pub fn allowed(&self, dimension: &Dimension) -> Option<&BTreeSet<String>> {
        self.allowed.get(dimension)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.allowed.keys()
    }

    /// True when no dimension is restricted.
    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty()
    }

    /// True when some dimension has an empty allowed set, so nothing can pass.
    pub fn excludes_everything(&self) -> bool {
        self.allowed.values().any(BTreeSet::is_empty)
    }

    /// Default dashboard state: every value seen in `records` is selected.
    pub fn select_all(records: &[NormalizedRecord], dimensions: &[Dimension]) -> Self {
        let mut selections = Self::new();
        for dimension in dimensions {
            let values = distinct_values(records, dimension);
            selections.set(dimension.clone(), values);
        }
        selections
    }

    /// Rewrites raw field names that are mapped to semantic fields, so that
    /// e.g. `"Expense Category"` selects on `Dimension::Category`.
    pub fn canonicalize(&self, fields: &FieldMapping) -> Self {
        let mut canonical = Self::new();
        for (dimension, values) in &self.allowed {
            canonical
                .allowed
                .entry(fields.canonical(dimension))
                .and_modify(|existing| existing.retain(|v| values.contains(v)))
                .or_insert_with(|| values.clone());
        }
        canonical
    }

    pub fn matches(&self, record: &NormalizedRecord) -> bool {
        self.allowed.iter().all(|(dimension, values)| {
            record
                .dimension_value(dimension)
                .is_some_and(|value| values.contains(value))
        })
    }
}

/// Records passing `selections`, in input order.
pub fn filter_records<'a>(
    records: &'a [NormalizedRecord],
    selections: &Selections,
) -> Vec<&'a NormalizedRecord> {
    records.iter().filter(|r| selections.matches(r)).collect()
}

/// Distinct values of `dimension` in first-seen order.
pub fn distinct_values(records: &[NormalizedRecord], dimension: &Dimension) -> Vec<String> {
    let mut seen = BTreeSet::new();
    records
        .iter()
        .filter_map(|r| r.dimension_value(dimension))
        .filter(|value| seen.insert(value.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(vendor: &str, category: &str, amount: f64) -> NormalizedRecord {
        NormalizedRecord::new(
            vendor,
            category,
            amount,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        )
    }

    fn sample() -> Vec<NormalizedRecord> {
        vec![
            record("Acme", "Software", 100.0),
            record("Globex", "Travel", 50.0),
            record("Acme", "Travel", 25.0),
            record("Initech", "Office", 10.0),
        ]
    }

    #[test]
    fn test_unrestricted_selection_keeps_everything() {
        let records = sample();
        let filtered = filter_records(&records, &Selections::new());
        assert_eq!(filtered.len(), 4);
    }

    #[test]
    fn test_filter_preserves_order() {
        let records = sample();
        let selections = Selections::new().with(Dimension::Category, ["Travel"]);
        let filtered = filter_records(&records, &selections);

        let vendors: Vec<&str> = filtered.iter().map(|r| r.vendor.as_str()).collect();
        assert_eq!(vendors, vec!["Globex", "Acme"]);
    }

    #[test]
    fn test_every_dimension_must_match() {
        let records = sample();
        let selections = Selections::new()
            .with(Dimension::Vendor, ["Acme", "Globex"])
            .with(Dimension::Category, ["Travel", "Office"]);

        let filtered = filter_records(&records, &selections);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|r| r.category == "Travel"));
    }

    #[test]
    fn test_empty_selection_excludes_all() {
        let records = sample();
        let selections = Selections::new().with(Dimension::Vendor, Vec::<String>::new());

        assert!(selections.excludes_everything());
        assert!(filter_records(&records, &selections).is_empty());
    }

    #[test]
    fn test_widening_never_shrinks() {
        let records = sample();
        let narrow = Selections::new().with(Dimension::Vendor, ["Acme"]);
        let wide = Selections::new().with(Dimension::Vendor, ["Acme", "Initech"]);

        let narrow_count = filter_records(&records, &narrow).len();
        let wide_count = filter_records(&records, &wide).len();
        assert_eq!(narrow_count, 2);
        assert!(wide_count >= narrow_count);
    }

    #[test]
    fn test_missing_extra_field_fails_selection() {
        let mut tagged = record("Acme", "Software", 1.0);
        tagged.extra.insert("Project".to_string(), "Apollo".to_string());
        let records = vec![tagged, record("Acme", "Software", 2.0)];

        let selections = Selections::new().with(Dimension::field("Project"), ["Apollo"]);
        let filtered = filter_records(&records, &selections);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].amount, 1.0);
    }

    #[test]
    fn test_distinct_values_and_select_all() {
        let records = sample();
        assert_eq!(
            distinct_values(&records, &Dimension::Vendor),
            vec!["Acme", "Globex", "Initech"]
        );

        let selections = Selections::select_all(&records, &[Dimension::Vendor, Dimension::Category]);
        assert_eq!(selections.allowed(&Dimension::Category).unwrap().len(), 3);
        assert_eq!(filter_records(&records, &selections).len(), records.len());
    }

    #[test]
    fn test_canonicalize_maps_raw_field_names() {
        let fields = FieldMapping::airtable();
        let selections = Selections::new().with(Dimension::field("Expense Category"), ["Travel"]);
        let canonical = selections.canonicalize(&fields);

        assert!(canonical.allowed(&Dimension::Category).is_some());
        assert_eq!(filter_records(&sample(), &canonical).len(), 2);
    }

    #[test]
    fn test_selections_deserialize_from_map() {
        let selections: Selections =
            serde_json::from_str(r#"{"Vendor": ["Acme"], "Project": []}"#).unwrap();
        assert_eq!(selections.dimensions().count(), 2);
        assert!(selections.excludes_everything());
    }
}
