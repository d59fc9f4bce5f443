//! Composition root tying the cache, the retrying fetcher, and the streaming
//! providers together.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::cache::{CacheMode, SeriesCache};
use crate::config::MarketDataConfig;
use crate::data_source::SeriesSource;
use crate::domain::{
    trailing_mean, Instrument, MarketObservation, TimeRange, LONG_WINDOW, SHORT_WINDOW,
};
use crate::generator::SeriesGenerator;
use crate::retry::{fetch_with_retry, RetryConfig};
use crate::stream::{
    tick_callback, ConnectionState, ProviderFactory, StreamProvider, Subscription, TickCallback,
};
use crate::validator::validate;
use crate::MarketDataError;

/// Tagged result of a historical fetch.
///
/// Serializes as `{"success":true,"data":[...]}` or
/// `{"success":false,"error":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireResponse", try_from = "WireResponse")]
pub enum SeriesResponse {
    Success { data: Vec<MarketObservation> },
    Failure { error: String },
}

impl SeriesResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&[MarketObservation]> {
        match self {
            Self::Success { data } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error),
        }
    }
}

impl From<Result<Arc<[MarketObservation]>, MarketDataError>> for SeriesResponse {
    fn from(result: Result<Arc<[MarketObservation]>, MarketDataError>) -> Self {
        match result {
            Ok(series) => Self::Success {
                data: series.to_vec(),
            },
            Err(error) => Self::Failure {
                error: error.to_string(),
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Vec<MarketObservation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<SeriesResponse> for WireResponse {
    fn from(response: SeriesResponse) -> Self {
        match response {
            SeriesResponse::Success { data } => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            SeriesResponse::Failure { error } => Self {
                success: false,
                data: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<WireResponse> for SeriesResponse {
    type Error = String;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        match (wire.success, wire.data, wire.error) {
            (true, Some(data), _) => Ok(Self::Success { data }),
            (false, _, Some(error)) => Ok(Self::Failure { error }),
            (true, None, _) => Err(String::from("successful response without data")),
            (false, _, None) => Err(String::from("failed response without error")),
        }
    }
}

/// Series currently on display, patched in place by ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSeries {
    pub instrument: Instrument,
    pub time_range: TimeRange,
    pub points: Vec<MarketObservation>,
}

impl LiveSeries {
    /// Replaces the last point with `tick` and recomputes its moving averages.
    ///
    /// A tick not strictly later than the second-to-last point is dropped so
    /// the series stays in timestamp order.
    fn apply(&mut self, tick: &MarketObservation) -> bool {
        if self.points.len() >= 2 {
            let previous = self.points[self.points.len() - 2].parsed_timestamp();
            let in_order = match (previous, tick.parsed_timestamp()) {
                (Some(previous), Some(current)) => current > previous,
                (None, Some(_)) => true,
                (_, None) => false,
            };
            if !in_order {
                tracing::debug!(
                    instrument = %self.instrument,
                    timestamp = %tick.timestamp,
                    "out-of-order tick dropped"
                );
                return false;
            }
        }
        let Some(last) = self.points.last_mut() else {
            return false;
        };
        last.timestamp = tick.timestamp.clone();
        last.value = tick.value;
        last.volume = tick.volume;
        last.change = tick.change;
        last.volatility = tick.volatility;
        last.trend = tick.trend;

        let values: Vec<f64> = self.points.iter().map(|point| point.value).collect();
        let index = values.len() - 1;
        if let Some(last) = self.points.last_mut() {
            last.ma5 = trailing_mean(&values, index, SHORT_WINDOW);
            last.ma20 = trailing_mean(&values, index, LONG_WINDOW);
        }
        true
    }
}

struct ActiveStream {
    instrument: Instrument,
    provider: Arc<dyn StreamProvider>,
    _patch: Subscription,
}

/// Builder for [`MarketDataService`].
pub struct MarketDataServiceBuilder {
    config: MarketDataConfig,
    source: Option<Arc<dyn SeriesSource>>,
    factory: Option<ProviderFactory>,
}

impl MarketDataServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: MarketDataConfig::default(),
            source: None,
            factory: None,
        }
    }

    pub fn with_config(mut self, config: MarketDataConfig) -> Self {
        self.config = config;
        self
    }

    /// Historical data source; defaults to an unseeded [`SeriesGenerator`].
    pub fn with_source(mut self, source: Arc<dyn SeriesSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Provider factory; defaults to one derived from the stream config.
    pub fn with_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn build(self) -> Result<MarketDataService, MarketDataError> {
        let Self {
            config,
            source,
            factory,
        } = self;

        if config.cache_ttl.is_zero() {
            return Err(MarketDataError::Config(String::from("cache TTL must be positive")));
        }
        let factory = match factory {
            Some(factory) => factory,
            None => {
                config.validate()?;
                ProviderFactory::from_config(&config.stream)?
            }
        };
        let source: Arc<dyn SeriesSource> = match source {
            Some(source) => source,
            None => Arc::new(SeriesGenerator::default()),
        };

        Ok(MarketDataService {
            source,
            cache: SeriesCache::new(config.cache_ttl),
            retry: config.retry,
            factory,
            active: Mutex::new(None),
            live: Arc::new(Mutex::new(None)),
        })
    }
}

impl Default for MarketDataServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Market data facade used by the presentation layer.
///
/// Historical requests go cache first, then through the retrying fetcher
/// under a per-key fill lock, so a key is generated at most once per TTL
/// window. At most one streaming provider is active; subscribing to another
/// instrument disconnects it before the replacement starts.
pub struct MarketDataService {
    source: Arc<dyn SeriesSource>,
    cache: SeriesCache,
    retry: RetryConfig,
    factory: ProviderFactory,
    active: Mutex<Option<ActiveStream>>,
    live: Arc<Mutex<Option<LiveSeries>>>,
}

impl MarketDataService {
    pub fn builder() -> MarketDataServiceBuilder {
        MarketDataServiceBuilder::new()
    }

    /// Service wired from `config` with the default generator.
    pub fn new(config: MarketDataConfig) -> Result<Self, MarketDataError> {
        Self::builder().with_config(config).build()
    }

    pub fn cache(&self) -> &SeriesCache {
        &self.cache
    }

    pub fn provider_factory(&self) -> &ProviderFactory {
        &self.factory
    }

    /// Fetches a series by wire identifiers. Never fails; errors are folded
    /// into [`SeriesResponse::Failure`].
    pub async fn get_series(&self, instrument: &str, time_range: &str) -> SeriesResponse {
        self.get_series_with(instrument, time_range, CacheMode::Use).await
    }

    pub async fn get_series_with(
        &self,
        instrument: &str,
        time_range: &str,
        mode: CacheMode,
    ) -> SeriesResponse {
        let result = match (instrument.parse::<Instrument>(), time_range.parse::<TimeRange>()) {
            (Ok(instrument), Ok(time_range)) => self.series(instrument, time_range, mode).await,
            (Err(error), _) | (_, Err(error)) => Err(error),
        };
        if let Err(error) = &result {
            tracing::warn!(
                instrument,
                time_range,
                code = error.code(),
                %error,
                "series request failed"
            );
        }
        SeriesResponse::from(result)
    }

    /// Typed fetch used by [`get_series`](Self::get_series).
    pub async fn series(
        &self,
        instrument: Instrument,
        time_range: TimeRange,
        mode: CacheMode,
    ) -> Result<Arc<[MarketObservation]>, MarketDataError> {
        if mode.reads() {
            if let Some(series) = self.cache.get(instrument, time_range).await {
                tracing::debug!(%instrument, %time_range, "series cache hit");
                self.offer_live(instrument, time_range, &series);
                return Ok(series);
            }
        }

        let _fill = self.cache.fill_lock(instrument, time_range).await;
        if mode.reads() {
            // A concurrent caller may have filled the key while we waited.
            if let Some(series) = self.cache.get(instrument, time_range).await {
                tracing::debug!(%instrument, %time_range, "series filled by concurrent request");
                self.offer_live(instrument, time_range, &series);
                return Ok(series);
            }
        }
        tracing::debug!(%instrument, %time_range, ?mode, "series cache miss");

        let source = &self.source;
        let series = fetch_with_retry(&self.retry, || async move {
            validate(source.series(instrument, time_range).await?)
        })
        .await?;
        let series: Arc<[MarketObservation]> = series.into();

        if mode.writes() {
            self.cache.set(instrument, time_range, Arc::clone(&series)).await;
        }
        self.offer_live(instrument, time_range, &series);
        Ok(series)
    }

    /// Subscribes to ticks by wire identifier.
    pub fn subscribe(
        &self,
        instrument: &str,
        callback: TickCallback,
    ) -> Result<Subscription, MarketDataError> {
        let instrument = instrument.parse::<Instrument>()?;
        Ok(self.subscribe_to(instrument, callback))
    }

    /// Subscribes to ticks of `instrument`, switching the active provider if needed.
    ///
    /// A provider that has given up or was disconnected is replaced as well.
    pub fn subscribe_to(&self, instrument: Instrument, callback: TickCallback) -> Subscription {
        let mut active = self.active.lock().expect("active stream lock is not poisoned");

        let reusable = active.as_ref().is_some_and(|stream| {
            stream.instrument == instrument && !stream.provider.state().is_terminal()
        });
        if !reusable {
            if let Some(previous) = active.take() {
                tracing::info!(
                    from = %previous.instrument,
                    to = %instrument,
                    "switching stream provider"
                );
                previous.provider.disconnect();
            }
            self.retain_live_for(instrument);
        }

        let stream = active.get_or_insert_with(|| self.start_stream(instrument));
        stream.provider.subscribe(callback)
    }

    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        subscription.unsubscribe()
    }

    /// Tears down the active provider. Idempotent.
    pub fn disconnect(&self) {
        let previous = self
            .active
            .lock()
            .expect("active stream lock is not poisoned")
            .take();
        if let Some(previous) = previous {
            previous.provider.disconnect();
            tracing::info!(instrument = %previous.instrument, "market data stream closed");
        }
    }

    pub fn active_instrument(&self) -> Option<Instrument> {
        self.active
            .lock()
            .expect("active stream lock is not poisoned")
            .as_ref()
            .map(|stream| stream.instrument)
    }

    pub fn stream_state(&self) -> Option<ConnectionState> {
        self.active
            .lock()
            .expect("active stream lock is not poisoned")
            .as_ref()
            .map(|stream| stream.provider.state())
    }

    /// State transitions of the active provider.
    pub fn stream_state_changes(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.active
            .lock()
            .expect("active stream lock is not poisoned")
            .as_ref()
            .map(|stream| stream.provider.state_changes())
    }

    /// Snapshot of the series on display with ticks applied.
    pub fn live_series(&self) -> Option<LiveSeries> {
        self.live.lock().expect("live series lock is not poisoned").clone()
    }

    fn start_stream(&self, instrument: Instrument) -> ActiveStream {
        let provider = self.factory.create(instrument);
        let live = Arc::downgrade(&self.live);
        let patch = provider.subscribe(tick_callback(move |tick| {
            let Some(live) = live.upgrade() else {
                return;
            };
            let mut live = live.lock().expect("live series lock is not poisoned");
            match live.as_mut() {
                Some(series) if series.instrument == instrument => {
                    series.apply(tick);
                }
                _ => tracing::debug!(%instrument, "tick before series loaded, dropped"),
            }
        }));
        tracing::info!(%instrument, mode = %self.factory.mode(), "market data stream started");
        ActiveStream {
            instrument,
            provider,
            _patch: patch,
        }
    }

    /// Makes the fetched series the live one unless another instrument is streaming.
    fn offer_live(
        &self,
        instrument: Instrument,
        time_range: TimeRange,
        series: &Arc<[MarketObservation]>,
    ) {
        if self
            .active_instrument()
            .is_some_and(|streaming| streaming != instrument)
        {
            return;
        }
        *self.live.lock().expect("live series lock is not poisoned") = Some(LiveSeries {
            instrument,
            time_range,
            points: series.to_vec(),
        });
    }

    fn retain_live_for(&self, instrument: Instrument) {
        let mut live = self.live.lock().expect("live series lock is not poisoned");
        if live.as_ref().is_some_and(|series| series.instrument != instrument) {
            *live = None;
        }
    }
}

impl Drop for MarketDataService {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(timestamp: &str, value: f64) -> MarketObservation {
        MarketObservation {
            timestamp: timestamp.to_string(),
            value,
            volume: 1,
            change: 0.0,
            volatility: 0.0,
            trend: 0.0,
            ma5: value,
            ma20: value,
        }
    }

    #[test]
    fn response_wire_shape() {
        let ok = SeriesResponse::Success {
            data: vec![point("2024-01-01T00:00:00Z", 1.0)],
        };
        let json = serde_json::to_value(&ok).expect("serialize");
        assert_eq!(json["success"], true);
        assert_eq!(json["data"][0]["value"], 1.0);
        assert!(json.get("error").is_none());

        let failed = SeriesResponse::Failure {
            error: String::from("boom"),
        };
        assert_eq!(
            serde_json::to_string(&failed).expect("serialize"),
            r#"{"success":false,"error":"boom"}"#
        );

        let parsed: SeriesResponse =
            serde_json::from_str(r#"{"success":false,"error":"boom"}"#).expect("deserialize");
        assert_eq!(parsed, failed);
        assert!(serde_json::from_str::<SeriesResponse>(r#"{"success":true}"#).is_err());
    }

    #[test]
    fn tick_replaces_last_point_and_recomputes_averages() {
        let mut live = LiveSeries {
            instrument: Instrument::CrudeOil,
            time_range: TimeRange::OneDay,
            points: (1..=6)
                .map(|value| point("2024-01-01T00:00:00Z", f64::from(value)))
                .collect(),
        };
        let mut tick = point("2024-01-01T05:30:00Z", 12.0);
        tick.change = 0.5;
        tick.trend = 1.0;

        assert!(live.apply(&tick));
        let last = live.points.last().expect("non-empty");
        assert_eq!(live.points.len(), 6);
        assert_eq!(last.timestamp, "2024-01-01T05:30:00Z");
        assert_eq!(last.value, 12.0);
        assert_eq!(last.change, 0.5);
        // (2 + 3 + 4 + 5 + 12) / 5 and (1 + 2 + 3 + 4 + 5 + 12) / 6
        assert_eq!(last.ma5, 5.2);
        assert_eq!(last.ma20, 4.5);
    }

    #[test]
    fn empty_live_series_ignores_ticks() {
        let mut live = LiveSeries {
            instrument: Instrument::CrudeOil,
            time_range: TimeRange::OneDay,
            points: Vec::new(),
        };
        assert!(!live.apply(&point("2024-01-01T00:00:00Z", 1.0)));
    }

    #[test]
    fn stale_tick_leaves_series_untouched() {
        let mut live = LiveSeries {
            instrument: Instrument::NaturalGas,
            time_range: TimeRange::OneDay,
            points: vec![
                point("2024-01-01T00:00:00Z", 1.0),
                point("2024-01-01T01:00:00Z", 2.0),
            ],
        };
        let before = live.clone();

        assert!(!live.apply(&point("2024-01-01T00:00:00Z", 9.0)));
        assert!(!live.apply(&point("2001-01-01T00:00:00Z", 9.0)));
        assert!(!live.apply(&point("not a timestamp", 9.0)));
        assert_eq!(live, before);

        assert!(live.apply(&point("2024-01-01T00:00:01Z", 9.0)));
        assert_eq!(live.points[1].value, 9.0);
    }

    #[tokio::test]
    async fn unknown_identifiers_fold_into_failure() {
        let service = MarketDataService::builder().build().expect("default service");

        let response = service.get_series("coal", "1D").await;
        assert!(response.error().is_some_and(|error| error.contains("unknown instrument 'coal'")));

        let response = service.get_series("crude-oil", "5Y").await;
        assert!(response.error().is_some_and(|error| error.contains("unknown time range '5Y'")));
        assert!(service.cache().is_empty().await);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let config = MarketDataConfig::default().with_cache_ttl(std::time::Duration::ZERO);
        assert!(matches!(
            MarketDataService::new(config).map(|_| ()),
            Err(MarketDataError::Config(_))
        ));
    }
}
