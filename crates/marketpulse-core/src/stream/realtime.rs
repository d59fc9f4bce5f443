use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::transport::{Connection, TokenSource, Transport};
use super::{
    direction, observation, CloseReason, ConnectionState, RollingAverages, StreamProvider,
    Subscription, SubscriberSet, TickCallback,
};
use crate::domain::{Instrument, MarketObservation, UtcDateTime};
use crate::MarketDataError;

/// Heartbeat and reconnect policy of the real-time provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeSettings {
    pub heartbeat_interval: Duration,
    pub max_reconnect_attempts: u32,
    /// Reconnect attempt `n` waits `reconnect_delay * n`.
    pub reconnect_delay: Duration,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl RealtimeSettings {
    pub fn reconnect_delay_for(&self, attempt: u32) -> Duration {
        self.reconnect_delay.saturating_mul(attempt.max(1))
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum OutboundMessage<'a> {
    Subscribe { token: &'a str, symbols: [&'a str; 1] },
    Ping,
}

impl OutboundMessage<'_> {
    fn encode(&self) -> String {
        serde_json::to_string(self).expect("outbound frames always serialize")
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum InboundMessage {
    Trade {
        #[serde(default)]
        symbol: Option<String>,
        price: f64,
        #[serde(default)]
        volume: Option<u64>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Turns inbound trade messages into observations.
struct FeedDecoder {
    symbol: &'static str,
    last_price: Option<f64>,
    averages: RollingAverages,
}

impl FeedDecoder {
    fn new(symbol: &'static str) -> Self {
        Self {
            symbol,
            last_price: None,
            averages: RollingAverages::default(),
        }
    }

    /// `Ok(None)` for well-formed messages that carry no trade for this feed.
    fn decode(&mut self, text: &str) -> Result<Option<MarketObservation>, MarketDataError> {
        let message: InboundMessage =
            serde_json::from_str(text).map_err(|error| MarketDataError::Parse(error.to_string()))?;

        let InboundMessage::Trade {
            symbol,
            price,
            volume,
            timestamp,
        } = message
        else {
            return Ok(None);
        };

        if symbol.as_deref().is_some_and(|symbol| symbol != self.symbol) {
            return Ok(None);
        }
        if !price.is_finite() || price < 0.0 {
            return Err(MarketDataError::Parse(format!("price {price} is not a valid quote")));
        }
        let timestamp = match timestamp {
            Some(raw) => UtcDateTime::parse(&raw).ok_or_else(|| {
                MarketDataError::Parse(format!("timestamp '{raw}' is not RFC3339"))
            })?,
            None => UtcDateTime::now(),
        };

        let change = match self.last_price {
            Some(last) if last > 0.0 => (price - last) / last,
            _ => 0.0,
        };
        self.last_price = Some(price);

        Ok(Some(observation(
            timestamp.format_rfc3339(),
            price,
            volume.unwrap_or(0),
            change,
            change.abs(),
            direction(change),
            self.averages.push(price),
        )))
    }
}

enum SessionEnd {
    Cancelled,
    Failed(MarketDataError),
}

struct FeedWorker {
    instrument: Instrument,
    settings: RealtimeSettings,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenSource>,
    subscribers: SubscriberSet,
    state: watch::Sender<ConnectionState>,
    attempts: Arc<AtomicU32>,
    cancel: CancellationToken,
    decoder: FeedDecoder,
}

impl FeedWorker {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let error = match self.session().await {
                SessionEnd::Cancelled => return,
                SessionEnd::Failed(error) => error,
            };
            if self.cancel.is_cancelled() {
                return;
            }

            let attempts = self.attempts.load(Ordering::SeqCst);
            if attempts >= self.settings.max_reconnect_attempts {
                self.set_state(ConnectionState::Closed(CloseReason::GivenUp));
                tracing::error!(
                    instrument = %self.instrument,
                    attempts,
                    %error,
                    "real-time feed gave up reconnecting"
                );
                return;
            }

            let attempt = attempts + 1;
            self.attempts.store(attempt, Ordering::SeqCst);
            let delay = self.settings.reconnect_delay_for(attempt);
            self.set_state(ConnectionState::Closed(CloseReason::Reconnecting));
            tracing::warn!(
                instrument = %self.instrument,
                attempt,
                delay_ms = delay.as_millis() as u64,
                code = error.code(),
                %error,
                "real-time feed closed, scheduling reconnect"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Publishes `next` unless the provider was already disconnected.
    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == ConnectionState::Closed(CloseReason::Disconnected) || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    async fn session(&mut self) -> SessionEnd {
        let token = tokio::select! {
            _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
            token = self.tokens.acquire() => token,
        };
        let token = match token {
            Ok(token) => token,
            Err(MarketDataError::Authentication(message)) => {
                return SessionEnd::Failed(MarketDataError::Authentication(message))
            }
            Err(other) => {
                return SessionEnd::Failed(MarketDataError::Authentication(other.to_string()))
            }
        };

        let connected = tokio::select! {
            _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
            connected = self.transport.connect() => connected,
        };
        let mut connection = match connected {
            Ok(connection) => connection,
            Err(error) => return SessionEnd::Failed(error),
        };

        let subscribe = OutboundMessage::Subscribe {
            token: &token,
            symbols: [self.instrument.external_symbol()],
        };
        if let Err(error) = connection.send(subscribe.encode()).await {
            return SessionEnd::Failed(error);
        }

        self.attempts.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Open);
        tracing::info!(
            instrument = %self.instrument,
            symbol = self.decoder.symbol,
            "real-time feed open"
        );

        let end = self.pump(connection.as_mut()).await;
        if matches!(end, SessionEnd::Cancelled) {
            connection.close().await;
        }
        end
    }

    /// Reads frames and sends heartbeats until the connection ends.
    async fn pump(&mut self, connection: &mut dyn Connection) -> SessionEnd {
        let period = self.settings.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
                _ = heartbeat.tick() => {
                    if let Err(error) = connection.send(OutboundMessage::Ping.encode()).await {
                        return SessionEnd::Failed(error);
                    }
                }
                frame = connection.recv() => match frame {
                    Some(Ok(text)) => self.handle_frame(&text),
                    Some(Err(error)) => return SessionEnd::Failed(error),
                    None => {
                        return SessionEnd::Failed(MarketDataError::Transport(String::from(
                            "connection closed by peer",
                        )))
                    }
                },
            }
        }
    }

    fn handle_frame(&mut self, text: &str) {
        match self.decoder.decode(text) {
            Ok(Some(tick)) => {
                self.subscribers.broadcast(&tick);
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(
                    instrument = %self.instrument,
                    code = error.code(),
                    %error,
                    "dropping stream message"
                );
            }
        }
    }
}

/// Reconnecting client of the real-time feed.
///
/// Token and transport failures share one policy: up to
/// `max_reconnect_attempts` reconnects with linearly growing delays, the
/// counter resetting on every successful open. When the budget is spent the
/// provider stays in `Closed(GivenUp)`.
pub struct RealtimeProvider {
    instrument: Instrument,
    subscribers: SubscriberSet,
    state: watch::Sender<ConnectionState>,
    attempts: Arc<AtomicU32>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeProvider {
    pub fn connect(
        instrument: Instrument,
        settings: RealtimeSettings,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenSource>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let provider = Arc::new(Self {
            instrument,
            subscribers: SubscriberSet::new(),
            state: state.clone(),
            attempts: Arc::new(AtomicU32::new(0)),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        });

        let worker = FeedWorker {
            instrument,
            settings,
            transport,
            tokens,
            subscribers: provider.subscribers.clone(),
            state,
            attempts: Arc::clone(&provider.attempts),
            cancel: provider.cancel.clone(),
            decoder: FeedDecoder::new(instrument.external_symbol()),
        };
        let task = tokio::spawn(worker.run());
        *provider.task.lock().expect("realtime task lock is not poisoned") = Some(task);
        provider
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl StreamProvider for RealtimeProvider {
    fn instrument(&self) -> Instrument {
        self.instrument
    }

    fn subscribe(&self, callback: TickCallback) -> Subscription {
        self.subscribers.subscribe(callback)
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn disconnect(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        // The worker observes cancellation, stops its heartbeat, and closes
        // the open connection itself.
        self.cancel.cancel();
        drop(
            self.task
                .lock()
                .expect("realtime task lock is not poisoned")
                .take(),
        );
        self.subscribers.close();
        self.state
            .send_replace(ConnectionState::Closed(CloseReason::Disconnected));
        tracing::info!(instrument = %self.instrument, "real-time feed disconnected");
    }
}

impl Drop for RealtimeProvider {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
