//! Seam between the fetch pipeline and whatever produces historical series.
//!
//! The generator implements [`SeriesSource`] directly; a network-backed
//! implementation can be dropped in without touching retry or cache logic.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::domain::{Instrument, MarketObservation, TimeRange};
use crate::MarketDataError;

/// Boxed future returned by [`SeriesSource::series`].
pub type SeriesFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<MarketObservation>, MarketDataError>> + Send + 'a>>;

/// Producer of historical series.
///
/// Implementations must be `Send + Sync`; the service shares one instance
/// across concurrent callers.
pub trait SeriesSource: Send + Sync {
    fn series<'a>(&'a self, instrument: Instrument, range: TimeRange) -> SeriesFuture<'a>;
}

impl<S: SeriesSource + ?Sized> SeriesSource for Arc<S> {
    fn series<'a>(&'a self, instrument: Instrument, range: TimeRange) -> SeriesFuture<'a> {
        (**self).series(instrument, range)
    }
}
