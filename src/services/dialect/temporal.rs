// Date and time parsing for literal values. Failures raise a value error
// instead of letting a malformed instant reach the generated SQL.
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ServiceError};
use crate::models::LogicalType;

/// ISO-8601 date-time with an explicit zone (`Z`, `±HH`, `±HHMM`, `±HH:MM`).
pub static ISO_DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d{1,9})?(Z|[+-]\d{2}(:?\d{2})?)$").unwrap()
});

static IS_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}:\d{1,2}:\d{1,2}$").unwrap());
static HAS_TIMEZONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([+-]\d{1,2}:?\d{0,2}|Z)$").unwrap());
static SHORT_OFFSET: Lazy<Regex> = Lazy::new(|| Regex::new(r"([+-])(\d{2}):?(\d{2})?$").unwrap());

pub const ZULU_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Parse a date, date-time or (with `allow_time`) a bare time into an instant.
pub fn parse_instant(value: &str, allow_time: bool) -> Result<DateTime<Utc>> {
    let invalid = || ServiceError::ValueParse {
        value: value.to_string(),
        expected: if allow_time { "time" } else { "date" },
    };

    if allow_time && IS_TIME.is_match(value) {
        let time = NaiveTime::parse_from_str(value, "%H:%M:%S").map_err(|_| invalid())?;
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).ok_or_else(invalid)?;
        return Ok(epoch.and_time(time).and_utc());
    }

    // A bare date is midnight UTC; checked first since `-DD` looks like an offset
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()).ok_or_else(invalid);
    }

    let value = normalize_separator(value);

    if HAS_TIMEZONE.is_match(&value) {
        let normalized = normalize_offset(&value);
        return DateTime::parse_from_rfc3339(&normalized)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| invalid());
    }

    // No zone given: the value is taken as UTC
    NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.and_utc())
        .map_err(|_| invalid())
}

fn normalize_separator(value: &str) -> String {
    match value.char_indices().nth(10) {
        Some((idx, ' ')) => format!("{}T{}", &value[..idx], &value[idx + 1..]),
        _ => value.to_string(),
    }
}

/// Bring `±HH` and `±HHMM` offsets into the `±HH:MM` form RFC 3339 expects.
fn normalize_offset(value: &str) -> String {
    if value.ends_with('Z') {
        return value.to_string();
    }
    SHORT_OFFSET
        .replace(value, |caps: &regex::Captures| {
            format!(
                "{}{}:{}",
                &caps[1],
                &caps[2],
                caps.get(3).map(|m| m.as_str()).unwrap_or("00")
            )
        })
        .into_owned()
}

/// Canonical text for a temporal element type, as written by the input side.
pub fn format_for(ty: &LogicalType, instant: &DateTime<Utc>) -> Option<String> {
    match ty {
        LogicalType::Date => Some(instant.format("%Y-%m-%d").to_string()),
        LogicalType::Time => Some(instant.format("%H:%M:%S").to_string()),
        LogicalType::DateTime | LogicalType::Timestamp => Some(instant.format(ZULU_MILLIS).to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zulu_and_offsets_agree() {
        let zulu = parse_instant("2024-03-01T10:00:00Z", false).unwrap();
        let colon = parse_instant("2024-03-01T12:00:00+02:00", false).unwrap();
        let compact = parse_instant("2024-03-01T12:00:00+0200", false).unwrap();
        let hours = parse_instant("2024-03-01T05:00:00-05", false).unwrap();
        assert_eq!(zulu, colon);
        assert_eq!(zulu, compact);
        assert_eq!(zulu, hours);
    }

    #[test]
    fn test_fraction_is_kept() {
        let instant = parse_instant("2024-03-01T10:00:00.123456789Z", false).unwrap();
        assert_eq!(instant.format(ZULU_MILLIS).to_string(), "2024-03-01T10:00:00.123Z");
    }

    #[test]
    fn test_invalid_month_is_rejected() {
        let err = parse_instant("2024-13-01T10:00:00Z", false).unwrap_err();
        assert!(matches!(err, ServiceError::ValueParse { expected: "date", .. }));
    }

    #[test]
    fn test_bare_time_needs_allow_time() {
        let instant = parse_instant("8:05:09", true).unwrap();
        assert_eq!(instant.format("%H:%M:%S").to_string(), "08:05:09");

        let err = parse_instant("25:00:00", true).unwrap_err();
        assert_eq!(err.to_string(), "Value does not contain a valid time \"25:00:00\"");

        assert!(parse_instant("08:05:09", false).is_err());
    }

    #[test]
    fn test_values_without_zone_are_utc() {
        let date = parse_instant("2024-02-29", false).unwrap();
        assert_eq!(date.format(ZULU_MILLIS).to_string(), "2024-02-29T00:00:00.000Z");

        let spaced = parse_instant("2024-02-29 13:14:15", false).unwrap();
        assert_eq!(spaced.format(ZULU_MILLIS).to_string(), "2024-02-29T13:14:15.000Z");

        assert!(parse_instant("2023-02-29", false).is_err());
    }

    #[test]
    fn test_format_for_types() {
        let instant = parse_instant("2024-03-01T10:11:12.345+01:00", false).unwrap();
        assert_eq!(format_for(&LogicalType::Date, &instant).unwrap(), "2024-03-01");
        assert_eq!(format_for(&LogicalType::Time, &instant).unwrap(), "09:11:12");
        assert_eq!(
            format_for(&LogicalType::Timestamp, &instant).unwrap(),
            "2024-03-01T09:11:12.345Z"
        );
        assert!(format_for(&LogicalType::Integer, &instant).is_none());
    }
}
