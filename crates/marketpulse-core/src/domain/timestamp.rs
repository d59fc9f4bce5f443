use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// RFC3339 instant normalized to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Parses any RFC3339 timestamp and converts it to UTC.
    pub fn parse(input: &str) -> Option<Self> {
        OffsetDateTime::parse(input.trim(), &Rfc3339)
            .ok()
            .map(Self::from_offset_datetime)
    }

    pub fn from_offset_datetime(value: OffsetDateTime) -> Self {
        Self(value.to_offset(UtcOffset::UTC))
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn checked_sub(self, step: Duration) -> Option<Self> {
        let step = time::Duration::try_from(step).ok()?;
        self.0.checked_sub(step).map(Self)
    }

    pub fn checked_add(self, step: Duration) -> Option<Self> {
        let step = time::Duration::try_from(step).ok()?;
        self.0.checked_add(step).map(Self)
    }

    /// Position within the UTC day in `[0, 1)`.
    pub fn day_fraction(self) -> f64 {
        let (hour, minute, second) = self.0.time().as_hms();
        (f64::from(hour) + f64::from(minute) / 60.0 + f64::from(second) / 3600.0) / 24.0
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .expect("UTC timestamps are always RFC3339 formattable")
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid RFC3339 timestamp '{value}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_offsets_to_utc() {
        let parsed = UtcDateTime::parse("2024-01-01T01:00:00+01:00").expect("must parse");
        assert_eq!(parsed.format_rfc3339(), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn rejects_garbage() {
        assert!(UtcDateTime::parse("yesterday").is_none());
        assert!(UtcDateTime::parse("").is_none());
    }

    #[test]
    fn day_fraction_tracks_hour_of_day() {
        let noon = UtcDateTime::parse("2024-06-01T12:00:00Z").expect("must parse");
        assert!((noon.day_fraction() - 0.5).abs() < 1e-12);

        let earlier = noon.checked_sub(Duration::from_secs(6 * 3600)).expect("in range");
        assert!((earlier.day_fraction() - 0.25).abs() < 1e-12);
    }
}
