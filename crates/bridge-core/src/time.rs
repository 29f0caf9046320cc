//! Timestamp formatting for API responses.
//!
//! All date/time fields on the wire are ISO-8601 UTC with millisecond
//! precision and a trailing `Z`, e.g. `2026-08-01T09:30:00.123Z`.

use chrono::{DateTime, SecondsFormat, Utc};

pub fn format_iso_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `#[serde(with = "iso_millis")]` helper for `DateTime<Utc>` fields.
pub mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&super::format_iso_millis(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_with_millis_and_z() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 1, 9, 30, 0).unwrap();
        assert_eq!(format_iso_millis(ts), "2026-08-01T09:30:00.000Z");
    }

    #[test]
    fn truncates_sub_millisecond_precision() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let formatted = format_iso_millis(ts);
        assert!(formatted.ends_with("Z"));
        assert!(formatted.contains(".123Z"));
    }
}
