//! Stochastic series generator.
//!
//! Each step combines a bounded random-walk drift, a sinusoidal seasonal term,
//! and horizon-scaled noise. Volume follows a time-of-day pattern. The random
//! source is injected so output can be pinned in tests.

use std::f64::consts::PI;
use std::sync::Mutex;

use crate::data_source::{SeriesFuture, SeriesSource};
use crate::domain::{
    fill_moving_averages, Instrument, MarketObservation, MarketProfile, TimeRange, UtcDateTime,
};
use crate::MarketDataError;

/// Latent drift is clamped to this magnitude.
pub const TREND_LIMIT: f64 = 0.1;

/// Uniform random numbers in `[0, 1)`.
pub trait RandomSource: Send {
    fn next_unit(&mut self) -> f64;
}

impl RandomSource for fastrand::Rng {
    fn next_unit(&mut self) -> f64 {
        self.f64()
    }
}

/// Replays a fixed sequence, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: Vec<f64>,
    cursor: usize,
}

impl SequenceRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, cursor: 0 }
    }

    /// Always yields `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for SequenceRandom {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.5;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor = self.cursor.wrapping_add(1);
        value
    }
}

/// Produces historical series from a [`MarketProfile`].
pub struct SeriesGenerator {
    profile: MarketProfile,
    rng: Mutex<Box<dyn RandomSource>>,
}

impl Default for SeriesGenerator {
    fn default() -> Self {
        Self::new(MarketProfile::default())
    }
}

impl SeriesGenerator {
    /// Generator backed by a non-deterministic random source.
    pub fn new(profile: MarketProfile) -> Self {
        Self::with_random(profile, fastrand::Rng::new())
    }

    /// Reproducible generator.
    pub fn seeded(profile: MarketProfile, seed: u64) -> Self {
        Self::with_random(profile, fastrand::Rng::with_seed(seed))
    }

    pub fn with_random(profile: MarketProfile, rng: impl RandomSource + 'static) -> Self {
        Self {
            profile,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn profile(&self) -> &MarketProfile {
        &self.profile
    }

    /// Generates a series whose last point is stamped with the current time.
    pub fn generate(
        &self,
        instrument: Instrument,
        range: TimeRange,
    ) -> Result<Vec<MarketObservation>, MarketDataError> {
        self.generate_until(instrument, range, UtcDateTime::now())
    }

    /// Generates `point_count + 1` observations ending at `end`.
    pub fn generate_until(
        &self,
        instrument: Instrument,
        range: TimeRange,
        end: UtcDateTime,
    ) -> Result<Vec<MarketObservation>, MarketDataError> {
        let params = *self.profile.parameters(instrument)?;
        let window = *self.profile.window(range)?;

        let point_count = window.point_count;
        let span = u32::try_from(point_count)
            .ok()
            .and_then(|count| window.step_interval.checked_mul(count))
            .ok_or_else(|| MarketDataError::Config(format!("time window {range} is too long")))?;
        let start = end
            .checked_sub(span)
            .ok_or_else(|| MarketDataError::Config(format!("time window {range} underflows")))?;

        let mut rng = self.rng.lock().expect("generator rng lock is not poisoned");
        let mut series = Vec::with_capacity(point_count + 1);
        let mut previous = params.base_value;
        let mut trend = 0.0_f64;
        let mut timestamp = start;

        for step in 0..=point_count {
            if step > 0 {
                timestamp = timestamp.checked_add(window.step_interval).ok_or_else(|| {
                    MarketDataError::Config(format!("time window {range} overflows"))
                })?;
            }

            trend = (trend + (rng.next_unit() - 0.5) * params.trend_bias)
                .clamp(-TREND_LIMIT, TREND_LIMIT);

            let seasonal = if point_count == 0 {
                0.0
            } else {
                (2.0 * PI * step as f64 / point_count as f64).sin() * params.seasonality
            };

            let noise =
                (rng.next_unit() - 0.5) * params.volatility * window.volatility_multiplier;

            let total_change = (trend + seasonal + noise) * previous;
            let value = (previous + total_change).max(0.0);
            let volatility = if value > 0.0 {
                total_change.abs() / value
            } else {
                0.0
            };

            let pattern = 1.0 + 0.5 * (PI * timestamp.day_fraction()).sin();
            let volume = (params.volume_base * pattern + rng.next_unit() * params.volume_variance)
                .max(0.0)
                .round() as u64;

            series.push(MarketObservation {
                timestamp: timestamp.format_rfc3339(),
                value,
                volume,
                change: total_change,
                volatility,
                trend,
                ma5: value,
                ma20: value,
            });
            previous = value;
        }
        drop(rng);

        fill_moving_averages(&mut series);
        Ok(series)
    }
}

impl SeriesSource for SeriesGenerator {
    fn series<'a>(&'a self, instrument: Instrument, range: TimeRange) -> SeriesFuture<'a> {
        Box::pin(async move { self.generate(instrument, range) })
    }
}
