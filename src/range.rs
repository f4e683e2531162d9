//! Validation of the requested report window.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fmt;
use thiserror::Error;

/// Why a requested window was rejected. Always user-correctable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{field} `{value}` is not a valid date (expected YYYY-MM-DD)")]
    Unparsable { field: &'static str, value: String },

    #[error("startDate {start} is after endDate {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },

    #[error("malformed query string: {0}")]
    Malformed(String),
}

/// A closed, day-granularity window `[start, end]` with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Builds a range from already-parsed dates.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parses the raw `startDate` / `endDate` request values.
    ///
    /// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and naive ISO date-times. Any time-of-day
    /// component is dropped.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, RangeError> {
        let start = parse_day("startDate", start)?;
        let end = parse_day("endDate", end)?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// The download name, e.g. `attendance_2025-09-01_2025-09-30.csv`.
    pub fn file_name(&self) -> String {
        format!("attendance_{}_{}.csv", self.start, self.end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

fn parse_day(field: &'static str, raw: Option<&str>) -> Result<NaiveDate, RangeError> {
    let value = raw
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(RangeError::Missing(field))?;

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(timestamp.date());
        }
    }

    Err(RangeError::Unparsable {
        field,
        value: value.to_string(),
    })
}
