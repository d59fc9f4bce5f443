use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{
    direction, observation, CloseReason, ConnectionState, RollingAverages, StreamProvider,
    Subscription, SubscriberSet, TickCallback,
};
use crate::domain::{Instrument, MarketObservation, UtcDateTime};
use crate::generator::RandomSource;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

const START_VALUE: f64 = 100.0;
const MAX_STEP: f64 = 0.02;
const VOLUME_FLOOR: f64 = 1_000.0;
const VOLUME_SPREAD: f64 = 9_000.0;

/// Random-walk ticks independent of the historical generator's parameters.
struct TickSynthesizer {
    rng: Box<dyn RandomSource>,
    last_value: f64,
    averages: RollingAverages,
    wall_anchor: UtcDateTime,
    clock_anchor: Instant,
}

impl TickSynthesizer {
    fn new(rng: Box<dyn RandomSource>) -> Self {
        Self {
            rng,
            last_value: START_VALUE,
            averages: RollingAverages::default(),
            wall_anchor: UtcDateTime::now(),
            clock_anchor: Instant::now(),
        }
    }

    fn next(&mut self) -> MarketObservation {
        // Wall time follows the runtime clock so ticks are ordered like the timer.
        let timestamp = self
            .wall_anchor
            .checked_add(self.clock_anchor.elapsed())
            .unwrap_or_else(UtcDateTime::now);

        let step = (self.rng.next_unit() - 0.5) * MAX_STEP;
        let value = (self.last_value * (1.0 + step)).max(0.0);
        let change = value - self.last_value;
        let volatility = if value > 0.0 { change.abs() / value } else { 0.0 };
        let volume = (VOLUME_FLOOR + self.rng.next_unit() * VOLUME_SPREAD).round() as u64;
        self.last_value = value;

        observation(
            timestamp.format_rfc3339(),
            value,
            volume,
            change,
            volatility,
            direction(change),
            self.averages.push(value),
        )
    }
}

/// Periodic local tick source.
///
/// The timer is a cancellable task; the first tick fires one interval after
/// start and `disconnect()` guarantees no callback runs afterwards.
pub struct SimulatedProvider {
    instrument: Instrument,
    subscribers: SubscriberSet,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedProvider {
    pub fn start(instrument: Instrument, tick_interval: Duration) -> Arc<Self> {
        Self::start_with_random(instrument, tick_interval, fastrand::Rng::new())
    }

    pub fn start_with_random(
        instrument: Instrument,
        tick_interval: Duration,
        rng: impl RandomSource + 'static,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Open);
        let provider = Arc::new(Self {
            instrument,
            subscribers: SubscriberSet::new(),
            state,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        });

        let task = tokio::spawn(run_timer(
            instrument,
            tick_interval,
            TickSynthesizer::new(Box::new(rng)),
            provider.subscribers.clone(),
            provider.cancel.clone(),
        ));
        *provider.task.lock().expect("simulated task lock is not poisoned") = Some(task);

        tracing::info!(
            %instrument,
            interval_ms = tick_interval.as_millis() as u64,
            "simulated stream started"
        );
        provider
    }
}

async fn run_timer(
    instrument: Instrument,
    period: Duration,
    mut synthesizer: TickSynthesizer,
    subscribers: SubscriberSet,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let tick = synthesizer.next();
                let delivered = subscribers.broadcast(&tick);
                tracing::trace!(%instrument, value = tick.value, delivered, "simulated tick");
            }
        }
    }
}

impl StreamProvider for SimulatedProvider {
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
        self.cancel.cancel();
        if let Some(task) = self
            .task
            .lock()
            .expect("simulated task lock is not poisoned")
            .take()
        {
            task.abort();
        }
        self.subscribers.close();
        self.state
            .send_replace(ConnectionState::Closed(CloseReason::Disconnected));
        tracing::info!(instrument = %self.instrument, "simulated stream disconnected");
    }
}

impl Drop for SimulatedProvider {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
