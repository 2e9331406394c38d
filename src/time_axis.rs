//! Conversion of the time axis to calendar dates.

use crate::error::AnalysisError;

use time::macros::format_description;
use time::{Date, Duration};

/// Default origin of the time axis. Offsets count days from this date.
pub const DEFAULT_TIME_ORIGIN: &str = "2002-04-01";

/// Largest day offset accepted, well beyond the range of [Date].
const MAX_OFFSET_DAYS: f64 = 1.0e8;

/// Parse a `YYYY-MM-DD` date.
pub fn parse_origin(origin: &str) -> Result<Date, time::error::Parse> {
    Date::parse(origin, format_description!("[year]-[month]-[day]"))
}

/// Returns the date a number of days after an origin.
///
/// Fractional offsets are truncated towards zero.
pub fn date_from_offset(origin: Date, offset: f64) -> Result<Date, AnalysisError> {
    if !offset.is_finite() || offset.abs() > MAX_OFFSET_DAYS {
        return Err(AnalysisError::DateOutOfRange { offset });
    }
    origin
        .checked_add(Duration::days(offset.trunc() as i64))
        .ok_or(AnalysisError::DateOutOfRange { offset })
}

/// Returns the dates of a time axis of day offsets.
///
/// # Arguments
///
/// * `origin`: Date of offset zero
/// * `offsets`: Day offsets
pub fn dates_from_offsets(origin: Date, offsets: &[f64]) -> Result<Vec<Date>, AnalysisError> {
    offsets
        .iter()
        .map(|offset| date_from_offset(origin, *offset))
        .collect()
}

/// Formats dates as `YYYY-MM-DD`.
pub fn format_dates(dates: &[Date]) -> Vec<String> {
    dates.iter().map(Date::to_string).collect()
}
