//! Fixed-width RFC 3339 timestamps.
//!
//! Always UTC with microsecond precision (`2024-05-01T12:00:00.000000Z`), so
//! the textual form sorts the same way as the instant it encodes. Usable as a
//! serde `with` module.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(ts))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_format_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::microseconds(250_000);

        assert_eq!(format(&whole), "2024-05-01T12:00:00.000000Z");
        assert_eq!(format(&fractional), "2024-05-01T12:00:00.250000Z");
        assert!(format(&whole) < format(&fractional));
    }

    #[test]
    fn test_parse_accepts_offsets() {
        let parsed = parse("2024-05-01T09:00:00-03:00").unwrap();
        assert_eq!(format(&parsed), "2024-05-01T12:00:00.000000Z");
    }
}
