//! Structural and numeric checks applied before a series is trusted.

use crate::domain::MarketObservation;
use crate::MarketDataError;

/// Checks a series and hands it back unchanged.
///
/// Rules run in order and the first failure wins: the series is non-empty,
/// every timestamp parses as RFC3339, every value is finite.
pub fn validate(series: Vec<MarketObservation>) -> Result<Vec<MarketObservation>, MarketDataError> {
    check(&series)?;
    Ok(series)
}

/// Borrowing form of [`validate`].
pub fn check(series: &[MarketObservation]) -> Result<(), MarketDataError> {
    if series.is_empty() {
        return Err(MarketDataError::InvalidFormat);
    }

    if let Some((index, point)) = series
        .iter()
        .enumerate()
        .find(|(_, point)| point.parsed_timestamp().is_none())
    {
        return Err(MarketDataError::InvalidTimestamp {
            index,
            timestamp: point.timestamp.clone(),
        });
    }

    if let Some((index, point)) = series
        .iter()
        .enumerate()
        .find(|(_, point)| !point.value.is_finite())
    {
        return Err(MarketDataError::InvalidValue {
            index,
            value: point.value,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(timestamp: &str, value: f64) -> MarketObservation {
        MarketObservation {
            timestamp: timestamp.to_owned(),
            value,
            volume: 10,
            change: 0.0,
            volatility: 0.0,
            trend: 0.0,
            ma5: value,
            ma20: value,
        }
    }

    #[test]
    fn returns_well_formed_series_unchanged() {
        let series = vec![
            point("2024-01-01T00:00:00Z", 10.0),
            point("2024-01-01T01:00:00Z", 11.0),
        ];
        assert_eq!(validate(series.clone()), Ok(series));
    }

    #[test]
    fn rejects_empty_series() {
        assert_eq!(validate(Vec::new()), Err(MarketDataError::InvalidFormat));
    }

    #[test]
    fn rejects_unparseable_timestamp_with_offending_index() {
        let series = vec![point("2024-01-01T00:00:00Z", 10.0), point("not-a-time", 11.0)];
        let err = validate(series).expect_err("must fail");
        assert_eq!(
            err,
            MarketDataError::InvalidTimestamp {
                index: 1,
                timestamp: String::from("not-a-time"),
            }
        );
    }

    #[test]
    fn rejects_nan_value() {
        let series = vec![point("2024-01-01T00:00:00Z", f64::NAN)];
        let err = validate(series).expect_err("must fail");
        assert!(matches!(err, MarketDataError::InvalidValue { index: 0, .. }));
    }

    #[test]
    fn timestamp_rule_runs_before_value_rule() {
        let series = vec![point("2024-01-01T00:00:00Z", f64::INFINITY), point("bad", 1.0)];
        let err = validate(series).expect_err("must fail");
        assert!(matches!(err, MarketDataError::InvalidTimestamp { index: 1, .. }));
    }
}
