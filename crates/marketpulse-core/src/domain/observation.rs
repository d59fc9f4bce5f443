use serde::{Deserialize, Serialize};

use super::UtcDateTime;

/// Trailing windows used for the moving-average overlays.
pub const SHORT_WINDOW: usize = 5;
pub const LONG_WINDOW: usize = 20;

/// One point of a market series.
///
/// `timestamp` is kept in its RFC3339 wire form so series received from an
/// upstream source can be checked before they are trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketObservation {
    pub timestamp: String,
    pub value: f64,
    pub volume: u64,
    pub change: f64,
    pub volatility: f64,
    pub trend: f64,
    pub ma5: f64,
    pub ma20: f64,
}

impl MarketObservation {
    pub fn parsed_timestamp(&self) -> Option<UtcDateTime> {
        UtcDateTime::parse(&self.timestamp)
    }
}

/// Mean of `values[max(0, index + 1 - window)..=index]`.
pub fn trailing_mean(values: &[f64], index: usize, window: usize) -> f64 {
    let start = (index + 1).saturating_sub(window.max(1));
    let slice = &values[start..=index];
    slice.iter().sum::<f64>() / slice.len() as f64
}

/// Recomputes `ma5`/`ma20` for every point, shrinking the window at the start.
pub fn fill_moving_averages(series: &mut [MarketObservation]) {
    let values: Vec<f64> = series.iter().map(|point| point.value).collect();
    for (index, point) in series.iter_mut().enumerate() {
        point.ma5 = trailing_mean(&values, index, SHORT_WINDOW);
        point.ma20 = trailing_mean(&values, index, LONG_WINDOW);
    }
}
