use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Instrument, TimeRange};
use crate::MarketDataError;

const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(24 * 3600);

/// Stochastic parameters of one instrument category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentParameters {
    pub base_value: f64,
    /// Noise amplitude.
    pub volatility: f64,
    /// Maximum per-step drift increment.
    pub trend_bias: f64,
    /// Amplitude of the periodic component.
    pub seasonality: f64,
    pub volume_base: f64,
    pub volume_variance: f64,
}

/// Sampling layout of one time range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindowSpec {
    pub point_count: usize,
    pub step_interval: Duration,
    pub volatility_multiplier: f64,
}

/// Lookup table for instrument parameters and time windows.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketProfile {
    instruments: HashMap<Instrument, InstrumentParameters>,
    windows: HashMap<TimeRange, TimeWindowSpec>,
}

impl Default for MarketProfile {
    fn default() -> Self {
        let mut profile = Self::empty();
        for instrument in Instrument::ALL {
            profile = profile.with_instrument(instrument, default_parameters(instrument));
        }
        for range in TimeRange::ALL {
            profile = profile.with_window(range, default_window(range));
        }
        profile
    }
}

impl MarketProfile {
    /// Profile with no records; every lookup fails until records are added.
    pub fn empty() -> Self {
        Self {
            instruments: HashMap::new(),
            windows: HashMap::new(),
        }
    }

    pub fn with_instrument(mut self, instrument: Instrument, params: InstrumentParameters) -> Self {
        self.instruments.insert(instrument, params);
        self
    }

    pub fn with_window(mut self, range: TimeRange, window: TimeWindowSpec) -> Self {
        self.windows.insert(range, window);
        self
    }

    pub fn parameters(
        &self,
        instrument: Instrument,
    ) -> Result<&InstrumentParameters, MarketDataError> {
        self.instruments
            .get(&instrument)
            .ok_or_else(|| MarketDataError::UnknownInstrument {
                value: instrument.as_str().to_owned(),
            })
    }

    pub fn window(&self, range: TimeRange) -> Result<&TimeWindowSpec, MarketDataError> {
        self.windows
            .get(&range)
            .ok_or_else(|| MarketDataError::UnknownTimeRange {
                value: range.as_str().to_owned(),
            })
    }
}

fn default_parameters(instrument: Instrument) -> InstrumentParameters {
    match instrument {
        Instrument::CrudeOil => InstrumentParameters {
            base_value: 75.5,
            volatility: 0.02,
            trend_bias: 0.001,
            seasonality: 0.05,
            volume_base: 1_000_000.0,
            volume_variance: 200_000.0,
        },
        Instrument::NaturalGas => InstrumentParameters {
            base_value: 2.8,
            volatility: 0.03,
            trend_bias: 0.0005,
            seasonality: 0.08,
            volume_base: 500_000.0,
            volume_variance: 100_000.0,
        },
        Instrument::Renewable => InstrumentParameters {
            base_value: 45.0,
            volatility: 0.015,
            trend_bias: 0.002,
            seasonality: 0.03,
            volume_base: 250_000.0,
            volume_variance: 50_000.0,
        },
        Instrument::Industrial => InstrumentParameters {
            base_value: 120.0,
            volatility: 0.01,
            trend_bias: 0.0008,
            seasonality: 0.02,
            volume_base: 750_000.0,
            volume_variance: 150_000.0,
        },
    }
}

fn default_window(range: TimeRange) -> TimeWindowSpec {
    let (point_count, step_interval, volatility_multiplier) = match range {
        TimeRange::OneDay => (24, HOUR, 1.0),
        TimeRange::OneWeek => (7 * 24, HOUR, 1.5),
        TimeRange::OneMonth => (30, DAY, 2.0),
        TimeRange::ThreeMonths => (90, DAY, 2.5),
        TimeRange::OneYear => (52, 7 * DAY, 3.0),
    };
    TimeWindowSpec {
        point_count,
        step_interval,
        volatility_multiplier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_covers_every_key() {
        let profile = MarketProfile::default();
        for instrument in Instrument::ALL {
            assert!(profile.parameters(instrument).is_ok());
        }
        for range in TimeRange::ALL {
            assert!(profile.window(range).is_ok());
        }
        assert_eq!(profile.window(TimeRange::OneDay).map(|w| w.point_count), Ok(24));
    }

    #[test]
    fn missing_records_fail_with_typed_errors() {
        let profile = MarketProfile::empty();
        assert!(matches!(
            profile.parameters(Instrument::Renewable),
            Err(MarketDataError::UnknownInstrument { .. })
        ));
        assert!(matches!(
            profile.window(TimeRange::OneYear),
            Err(MarketDataError::UnknownTimeRange { .. })
        ));
    }
}
