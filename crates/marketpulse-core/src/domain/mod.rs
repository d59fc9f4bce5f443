//! # Domain Models
//!
//! Canonical types for the market overview pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Instrument`] | Closed set of energy instruments |
//! | [`TimeRange`] | Closed set of historical windows |
//! | [`MarketObservation`] | One point of a series |
//! | [`InstrumentParameters`] | Stochastic parameters per instrument |
//! | [`TimeWindowSpec`] | Point count and spacing per time range |
//! | [`MarketProfile`] | Lookup table for both parameter records |
//! | [`UtcDateTime`] | UTC timestamp |

mod instrument;
mod observation;
mod profile;
mod time_range;
mod timestamp;

pub use instrument::Instrument;
pub use observation::{
    fill_moving_averages, trailing_mean, MarketObservation, LONG_WINDOW, SHORT_WINDOW,
};
pub use profile::{InstrumentParameters, MarketProfile, TimeWindowSpec};
pub use time_range::TimeRange;
pub use timestamp::UtcDateTime;
