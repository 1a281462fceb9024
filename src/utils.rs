use crate::error::{ExpenseDashboardError, Result};
use chrono::{Datelike, Months, NaiveDate};

pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

/// First day of the calendar quarter containing `date` (Jan, Apr, Jul, Oct).
pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let first_month = ((date.month() - 1) / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), first_month, 1).unwrap_or(date)
}

/// First day of the following month, or `None` past the last representable month.
pub fn next_month_start(date: NaiveDate) -> Option<NaiveDate> {
    month_start(date).checked_add_months(Months::new(1))
}

/// Steps back `months` calendar months, clamping the day to the target month's length.
pub fn months_before(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_sub_months(Months::new(months)).ok_or_else(|| {
        ExpenseDashboardError::DateError(format!(
            "Cannot step {} months back from {}",
            months, date
        ))
    })
}

/// Every month start from the month of `start` through the month of `end`, inclusive.
/// Empty when `start` falls in a later month than `end`.
pub fn month_starts_in_period(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();

    let last = month_start(end);
    let mut current = month_start(start);
    while current <= last {
        dates.push(current);
        match next_month_start(current) {
            Some(next) => current = next,
            None => break,
        }
    }

    dates
}

pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff
}

/// Column label for a month, e.g. "Jan 2024".
pub fn month_label(date: NaiveDate) -> String {
    date.format("%b %Y").to_string()
}

/// Parses a period string in the format "YYYY-MM" (or a full "YYYY-MM-DD" date)
/// and returns the first day of that month.
pub fn parse_month_string(period: &str) -> Result<NaiveDate> {
    let trimmed = period.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(month_start(date));
    }

    let start_str = format!("{}-01", trimmed);
    NaiveDate::parse_from_str(&start_str, "%Y-%m-%d").map_err(|_| {
        ExpenseDashboardError::InvalidPeriod(format!(
            "Invalid period format: {}. Expected YYYY-MM",
            period
        ))
    })
}
