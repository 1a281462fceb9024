use crate::error::Result;
use crate::normalize::NormalizedRecord;
use crate::pivot::PivotTable;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// A line of the filtered-records table shown under the chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    #[serde(rename = "InvoiceDate")]
    pub invoice_date: NaiveDate,
    #[serde(rename = "Vendor")]
    pub vendor: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Amount")]
    pub amount: f64,
    #[serde(rename = "Description")]
    pub description: Option<String>,
}

impl From<&NormalizedRecord> for DetailRow {
    fn from(record: &NormalizedRecord) -> Self {
        Self {
            invoice_date: record.invoice_date,
            vendor: record.vendor.clone(),
            category: record.category.clone(),
            amount: record.amount,
            description: record.description.clone(),
        }
    }
}

/// Newest first; records sharing a date keep their input order.
pub fn detail_table<'a, I>(records: I) -> Vec<DetailRow>
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    let mut rows: Vec<DetailRow> = records.into_iter().map(DetailRow::from).collect();
    rows.sort_by(|a, b| b.invoice_date.cmp(&a.invoice_date));
    rows
}

pub fn write_detail_csv<W: Write>(rows: &[DetailRow], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_pivot_csv<W: Write>(table: &PivotTable, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(table.column_headers())?;

    for row in &table.rows {
        let record: Vec<String> = row
            .key
            .iter()
            .cloned()
            .chain(std::iter::once(format!("{:.2}", row.trailing_12_total)))
            .chain(row.monthly.iter().map(|v| format!("{:.2}", v)))
            .collect();
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

impl PivotTable {
    pub fn to_csv(&self) -> Result<String> {
        let mut buffer = Vec::new();
        write_pivot_csv(self, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn to_markdown(&self) -> String {
        let headers = self.column_headers();
        let mut output = String::new();

        output.push_str(&format!("| {} |\n", headers.join(" | ")));
        output.push_str(&format!(
            "|{}\n",
            headers
                .iter()
                .enumerate()
                .map(|(i, _)| if i < self.index_names.len() { " --- |" } else { " ---: |" })
                .collect::<String>()
        ));

        for row in &self.rows {
            let cells: Vec<String> = row
                .key
                .iter()
                .cloned()
                .chain(std::iter::once(format!("{:.2}", row.trailing_12_total)))
                .chain(row.monthly.iter().map(|v| format!("{:.2}", v)))
                .collect();
            output.push_str(&format!("| {} |\n", cells.join(" | ")));
        }

        output
    }
}
