use crate::error::{ExpenseDashboardError, Result};
use crate::filter::Selections;
use crate::utils::parse_month_string;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum Granularity {
    #[default]
    #[schemars(description = "Bucket records by the first day of their invoice month.")]
    Monthly,

    #[schemars(
        description = "Bucket records by the first day of their calendar quarter (Jan, Apr, Jul, Oct)."
    )]
    Quarterly,
}

impl Granularity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Monthly => "Monthly",
            Self::Quarterly => "Quarterly",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A categorical column records can be filtered, grouped or pivoted on.
///
/// Serialized as a plain string: `"Vendor"`, `"Category"` and `"Description"`
/// name the mapped semantic fields, anything else names a raw field directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Dimension {
    Vendor,
    Category,
    Description,
    Field(String),
}

impl Dimension {
    pub fn field(name: impl Into<String>) -> Self {
        Self::from(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Vendor => "Vendor",
            Self::Category => "Category",
            Self::Description => "Description",
            Self::Field(name) => name,
        }
    }
}

impl From<String> for Dimension {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Vendor" => Self::Vendor,
            "Category" => Self::Category,
            "Description" => Self::Description,
            _ => Self::Field(value),
        }
    }
}

impl From<Dimension> for String {
    fn from(value: Dimension) -> Self {
        match value {
            Dimension::Field(name) => name,
            other => other.name().to_string(),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl JsonSchema for Dimension {
    fn schema_name() -> String {
        "Dimension".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

/// Raw field names backing the semantic fields of an expense record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct FieldMapping {
    #[schemars(description = "Raw field holding the vendor / payee name.")]
    pub vendor: String,

    #[schemars(
        description = "Raw field holding the expense category (e.g. 'Category' or 'Expense Category')."
    )]
    pub category: String,

    #[schemars(
        description = "Raw field holding the monetary amount. Currency symbols and thousands separators are stripped."
    )]
    pub amount: String,

    #[schemars(description = "Raw field holding the invoice date.")]
    pub date: String,

    #[serde(default = "default_description_field")]
    #[schemars(
        description = "Raw field holding a free-text description. Defaults to 'Description'; null disables it."
    )]
    pub description: Option<String>,
}

fn default_description_field() -> Option<String> {
    Some("Description".to_string())
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            vendor: "Vendor".to_string(),
            category: "Category".to_string(),
            amount: "Amount".to_string(),
            date: "InvoiceDate".to_string(),
            description: default_description_field(),
        }
    }
}

impl FieldMapping {
    /// Layout of the hosted "Bills" table, which names its category column differently.
    pub fn airtable() -> Self {
        Self {
            category: "Expense Category".to_string(),
            ..Self::default()
        }
    }

    /// (role, raw field name) pairs that must be present in the record schema.
    pub fn required(&self) -> [(&'static str, &str); 4] {
        [
            ("amount", self.amount.as_str()),
            ("date", self.date.as_str()),
            ("vendor", self.vendor.as_str()),
            ("category", self.category.as_str()),
        ]
    }

    /// `required()` followed by `extra` fields, each tagged with the role "extra".
    pub fn required_with<'a>(&'a self, extra: &'a [String]) -> Vec<(&'static str, &'a str)> {
        self.required()
            .into_iter()
            .chain(extra.iter().map(|field| ("extra", field.as_str())))
            .collect()
    }

    /// Maps a raw field name that backs a semantic field onto that semantic dimension.
    pub fn canonical(&self, dimension: &Dimension) -> Dimension {
        match dimension {
            Dimension::Field(name) if *name == self.vendor => Dimension::Vendor,
            Dimension::Field(name) if *name == self.category => Dimension::Category,
            Dimension::Field(name) if self.description.as_deref() == Some(name.as_str()) => {
                Dimension::Description
            }
            other => other.clone(),
        }
    }

    pub fn canonical_all(&self, dimensions: &[Dimension]) -> Vec<Dimension> {
        dimensions.iter().map(|d| self.canonical(d)).collect()
    }

    pub fn is_mapped(&self, field: &str) -> bool {
        field == self.vendor
            || field == self.category
            || field == self.amount
            || field == self.date
            || self.description.as_deref() == Some(field)
    }
}

/// Location of a remote table for the ingestion side. The token itself is read
/// from the named environment variable by whoever performs the fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct RemoteSourceConfig {
    #[schemars(description = "Identifier of the remote base / workbook.")]
    pub base_id: String,

    #[schemars(description = "Name of the table inside the base.")]
    pub table_name: String,

    #[serde(default = "default_token_env")]
    #[schemars(description = "Environment variable holding the API token.")]
    pub token_env: String,
}

fn default_token_env() -> String {
    "AIRTABLE_TOKEN".to_string()
}

fn default_group_by() -> Vec<Dimension> {
    vec![Dimension::Category, Dimension::Vendor]
}

fn default_pivot_indexes() -> Vec<Vec<Dimension>> {
    vec![vec![Dimension::Vendor], vec![Dimension::Category]]
}

fn default_pivot_start() -> String {
    "2024-01".to_string()
}

fn default_key_separator() -> String {
    " - ".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DashboardConfig {
    #[serde(default)]
    #[schemars(description = "Mapping from semantic fields to raw record field names.")]
    pub fields: FieldMapping,

    #[serde(default)]
    #[schemars(
        description = "Additional raw fields that must be non-empty for a record to be kept."
    )]
    pub extra_required_fields: Vec<String>,

    #[serde(default)]
    #[schemars(description = "Period bucket size used for the chart series.")]
    pub granularity: Granularity,

    #[serde(default = "default_group_by")]
    #[schemars(description = "Ordered dimensions the chart series is grouped by. Must not be empty.")]
    pub group_by: Vec<Dimension>,

    #[serde(default = "default_pivot_indexes")]
    #[schemars(
        description = "One entry per pivot table to build; each entry lists the index dimensions of that table."
    )]
    pub pivot_indexes: Vec<Vec<Dimension>>,

    #[serde(default = "default_pivot_start")]
    #[schemars(description = "First month (YYYY-MM) of the pivot tables' month columns.")]
    pub pivot_start: String,

    #[serde(default)]
    #[schemars(
        description = "Last date covered by pivot tables. Defaults to the latest invoice date of the filtered records."
    )]
    pub latest: Option<NaiveDate>,

    #[serde(default)]
    #[schemars(
        description = "Allowed values per dimension. Dimensions not listed are not filtered; an empty list excludes everything."
    )]
    pub selections: Selections,

    #[serde(default = "default_key_separator")]
    #[schemars(description = "Separator used when joining multi-dimension keys for display.")]
    pub key_separator: String,

    #[serde(default)]
    #[schemars(description = "Remote table the records were fetched from, if any.")]
    pub source: Option<RemoteSourceConfig>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            fields: FieldMapping::default(),
            extra_required_fields: Vec::new(),
            granularity: Granularity::default(),
            group_by: default_group_by(),
            pivot_indexes: default_pivot_indexes(),
            pivot_start: default_pivot_start(),
            latest: None,
            selections: Selections::default(),
            key_separator: default_key_separator(),
            source: None,
        }
    }
}

impl DashboardConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.group_by.is_empty() {
            return Err(ExpenseDashboardError::InvalidGrouping(
                "group_by must name at least one dimension".to_string(),
            ));
        }

        for (idx, index) in self.pivot_indexes.iter().enumerate() {
            if index.is_empty() {
                return Err(ExpenseDashboardError::InvalidGrouping(format!(
                    "Pivot #{} has no index dimensions",
                    idx
                )));
            }
        }

        self.pivot_start_date()?;
        Ok(())
    }

    pub fn pivot_start_date(&self) -> Result<NaiveDate> {
        parse_month_string(&self.pivot_start)
    }

    /// Every (role, raw field) pair a kept record must carry.
    pub fn required_fields(&self) -> Vec<(&'static str, &str)> {
        self.fields.required_with(&self.extra_required_fields)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DashboardConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = DashboardConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("pivot_start"));
        assert!(schema_json.contains("group_by"));
        assert!(schema_json.contains("selections"));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = DashboardConfig::from_json("{}").unwrap();
        assert_eq!(config.fields, FieldMapping::default());
        assert_eq!(config.granularity, Granularity::Monthly);
        assert_eq!(config.group_by, vec![Dimension::Category, Dimension::Vendor]);
        assert_eq!(config.key_separator, " - ");
        assert_eq!(
            config.pivot_start_date().unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_airtable_style_config() {
        let json = r#"{
            "fields": {
                "vendor": "Vendor",
                "category": "Expense Category",
                "amount": "Amount",
                "date": "InvoiceDate"
            },
            "granularity": "Quarterly",
            "group_by": ["Category"],
            "pivot_indexes": [["Vendor", "Category"], ["Project"]],
            "selections": { "Vendor": ["Acme", "Globex"] },
            "source": { "base_id": "appExample", "table_name": "Bills" }
        }"#;

        let config = DashboardConfig::from_json(json).unwrap();
        assert_eq!(config.fields.category, "Expense Category");
        assert_eq!(config.fields.description.as_deref(), Some("Description"));
        assert_eq!(config.granularity, Granularity::Quarterly);
        assert_eq!(
            config.pivot_indexes[1],
            vec![Dimension::Field("Project".to_string())]
        );
        assert_eq!(config.selections.allowed(&Dimension::Vendor).unwrap().len(), 2);

        let source = config.source.unwrap();
        assert_eq!(source.table_name, "Bills");
        assert_eq!(source.token_env, "AIRTABLE_TOKEN");
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        assert!(matches!(
            DashboardConfig::from_json(r#"{ "group_by": [] }"#),
            Err(ExpenseDashboardError::InvalidGrouping(_))
        ));
        assert!(matches!(
            DashboardConfig::from_json(r#"{ "pivot_indexes": [[]] }"#),
            Err(ExpenseDashboardError::InvalidGrouping(_))
        ));
        assert!(matches!(
            DashboardConfig::from_json(r#"{ "pivot_start": "January" }"#),
            Err(ExpenseDashboardError::InvalidPeriod(_))
        ));
        assert!(matches!(
            DashboardConfig::from_json("not json"),
            Err(ExpenseDashboardError::SerializationError(_))
        ));
    }

    #[test]
    fn test_dimension_string_round_trip() {
        assert_eq!(Dimension::field("Vendor"), Dimension::Vendor);
        assert_eq!(Dimension::field("Project"), Dimension::Field("Project".to_string()));
        assert_eq!(String::from(Dimension::Category), "Category");

        let json = serde_json::to_string(&vec![Dimension::Vendor, Dimension::field("Project")]).unwrap();
        assert_eq!(json, r#"["Vendor","Project"]"#);
    }

    #[test]
    fn test_canonical_dimensions() {
        let fields = FieldMapping::airtable();
        assert_eq!(
            fields.canonical(&Dimension::field("Expense Category")),
            Dimension::Category
        );
        assert_eq!(
            fields.canonical_all(&[Dimension::field("Vendor"), Dimension::field("Project")]),
            vec![Dimension::Vendor, Dimension::field("Project")]
        );
    }

    #[test]
    fn test_required_fields_include_extras() {
        let config = DashboardConfig {
            extra_required_fields: vec!["Project".to_string()],
            ..DashboardConfig::default()
        };
        let required = config.required_fields();
        assert_eq!(required.len(), 5);
        assert!(required.contains(&("date", "InvoiceDate")));
        assert!(required.contains(&("extra", "Project")));
        assert_eq!(
            required,
            config.fields.required_with(&config.extra_required_fields)
        );
    }

    #[test]
    fn test_description_field_can_be_disabled() {
        let json = r#"{
            "fields": {
                "vendor": "Vendor",
                "category": "Category",
                "amount": "Amount",
                "date": "InvoiceDate",
                "description": null
            }
        }"#;

        let config = DashboardConfig::from_json(json).unwrap();
        assert_eq!(config.fields.description, None);
        assert!(!config.fields.is_mapped("Description"));
    }
}
