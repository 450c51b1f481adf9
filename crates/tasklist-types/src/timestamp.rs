use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Naive layouts accepted in addition to RFC 3339. Naive values are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// A point in time exchanged as an ISO-8601 string.
///
/// Accepts RFC 3339 with any offset, the naive date-times the server emits
/// (`2024-05-01T09:30:00`), minute precision (`2024-05-01T09:30`) and plain
/// dates (`2024-05-01`, midnight). Always serializes as RFC 3339 in UTC, so a
/// value written by this crate reads back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Parses an ISO-8601 string in any of the accepted layouts.
    ///
    /// # Errors
    /// Returns an error if the input matches none of the layouts.
    pub fn parse(input: &str) -> Result<Self, TimestampParseError> {
        let value = input.trim();

        if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self(datetime.with_timezone(&Utc)));
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(Self(naive.and_utc()));
            }
        }

        if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            return Ok(Self(midnight.and_utc()));
        }

        Err(TimestampParseError {
            input: value.to_string(),
        })
    }

    pub fn to_iso_string(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    /// `YYYY-MM-DD HH:MM` in UTC, for tables.
    pub fn to_short_string(&self) -> String {
        self.0.format("%Y-%m-%d %H:%M").to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso_string())
    }
}

impl FromStr for Timestamp {
    type Err = TimestampParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Input that is not a recognizable ISO-8601 timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timestamp '{input}'")]
pub struct TimestampParseError {
    pub input: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339_with_offset_normalizes_to_utc() {
        let ts = Timestamp::parse("2024-05-01T11:30:00+02:00").unwrap();
        assert_eq!(ts.to_iso_string(), "2024-05-01T09:30:00Z");
    }

    #[test]
    fn test_parse_server_naive_datetime() {
        let ts = Timestamp::parse("2024-05-01T09:30:00.123456").unwrap();
        assert_eq!(ts.as_datetime().timestamp(), 1_714_555_800);
    }

    #[test]
    fn test_parse_minute_precision_and_plain_date() {
        let minute = Timestamp::parse("2024-05-01T09:30").unwrap();
        assert_eq!(minute.to_iso_string(), "2024-05-01T09:30:00Z");

        let date = Timestamp::parse("2024-05-01").unwrap();
        assert_eq!(date.to_iso_string(), "2024-05-01T00:00:00Z");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Timestamp::parse("next tuesday").unwrap_err();
        assert_eq!(err.input, "next tuesday");
        assert_eq!(err.to_string(), "invalid timestamp 'next tuesday'");
        assert!(Timestamp::parse("2024-13-45").is_err());
    }

    #[test]
    fn test_serde_keeps_value() {
        let ts = Timestamp::parse("2024-05-01T09:30:00.250Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2024-05-01T09:30:00.250Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
