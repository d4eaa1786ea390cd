//! Store-native temporal values and their conversion at the wire boundary.
//!
//! The document store keeps instants as `{ "seconds", "nanoseconds" }`
//! objects. Records use `chrono` types locally; the `store_time` and
//! `store_date` modules plug into `#[serde(with = ...)]`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Wire representation of an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreTimestamp {
    pub seconds: i64,
    #[serde(default)]
    pub nanoseconds: u32,
}

impl StoreTimestamp {
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanoseconds)
    }

    /// Calendar date of the instant in UTC.
    #[must_use]
    pub fn to_date(self) -> Option<NaiveDate> {
        self.to_datetime().map(|instant| instant.date_naive())
    }
}

impl From<DateTime<Utc>> for StoreTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            seconds: value.timestamp(),
            nanoseconds: value.timestamp_subsec_nanos(),
        }
    }
}

impl From<NaiveDate> for StoreTimestamp {
    fn from(value: NaiveDate) -> Self {
        Self::from(value.and_time(chrono::NaiveTime::MIN).and_utc())
    }
}

/// `#[serde(with)]` adapter for `DateTime<Utc>` fields.
pub mod store_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::StoreTimestamp;

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        StoreTimestamp::from(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = StoreTimestamp::deserialize(deserializer)?;
        raw.to_datetime()
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

/// `#[serde(with)]` adapter for `NaiveDate` fields stored as UTC midnight.
pub mod store_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::StoreTimestamp;

    pub fn serialize<S: Serializer>(value: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        StoreTimestamp::from(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = StoreTimestamp::deserialize(deserializer)?;
        raw.to_date()
            .ok_or_else(|| serde::de::Error::custom("date out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn instant_keeps_subsecond_precision() {
        let instant = Utc
            .timestamp_opt(1_700_000_000, 250_000_000)
            .single()
            .unwrap();
        let wire = StoreTimestamp::from(instant);
        assert_eq!(wire.seconds, 1_700_000_000);
        assert_eq!(wire.nanoseconds, 250_000_000);
        assert_eq!(wire.to_datetime(), Some(instant));
    }

    #[test]
    fn date_is_stored_at_utc_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let wire = StoreTimestamp::from(date);
        assert_eq!(wire.nanoseconds, 0);
        assert_eq!(wire.seconds % 86_400, 0);
        assert_eq!(wire.to_date(), Some(date));
    }

    #[test]
    fn wire_shape_is_seconds_and_nanoseconds() {
        let wire = StoreTimestamp {
            seconds: 10,
            nanoseconds: 5,
        };
        assert_eq!(
            serde_json::to_value(wire).unwrap(),
            serde_json::json!({ "seconds": 10, "nanoseconds": 5 })
        );
        let parsed: StoreTimestamp = serde_json::from_str(r#"{ "seconds": 10 }"#).unwrap();
        assert_eq!(parsed.nanoseconds, 0);
    }
}
