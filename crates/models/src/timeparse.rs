use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// The fixed timestamp grammar used by course metadata and policy files.
/// All values are interpreted as UTC.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Same grammar with trailing seconds, accepted on parse only.
const TIME_FORMAT_SECONDS: &str = "%Y-%m-%dT%H:%M:%S";

/// Format used for human-readable date text (e.g. "Sep 05, 2012")
const DATE_DISPLAY_FORMAT: &str = "%b %d, %Y";

/// Custom error type for timestamp parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError {
    input: String,
}

impl ParseTimeError {
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl Display for ParseTimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "'{}' is not a valid course timestamp", self.input)
    }
}

impl std::error::Error for ParseTimeError {}

/// Parses a course timestamp string into a UTC datetime
///
/// # Arguments
/// * `value` - The timestamp string, e.g. "2013-03-01T09:00"
///
/// # Returns
/// The parsed datetime, or a [`ParseTimeError`] if the string does not
/// match the timestamp grammar
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, ParseTimeError> {
    let trimmed = value.trim();

    NaiveDateTime::parse_from_str(trimmed, TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, TIME_FORMAT_SECONDS))
        .map(|naive| naive.and_utc())
        .map_err(|_| ParseTimeError {
            input: value.to_string(),
        })
}

/// Serializes a datetime back into the course timestamp grammar
pub fn stringify_time(value: DateTime<Utc>) -> String {
    value.format(TIME_FORMAT).to_string()
}

/// Formats a datetime as human-readable date text
pub fn format_date(value: DateTime<Utc>) -> String {
    value.format(DATE_DISPLAY_FORMAT).to_string()
}
