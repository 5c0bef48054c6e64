//! Wire format for dates: UTC ISO-8601 with millisecond precision.

use crate::error::{CodecError, CodecResult};
use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a date as `YYYY-MM-DDTHH:MM:SS.sssZ`.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an ISO-8601 date string into UTC.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the string is not RFC 3339.
pub fn parse_date(iso: &str) -> CodecResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(iso)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| CodecError::decoding_failed(format!("invalid date {iso:?}: {e}")))
}
