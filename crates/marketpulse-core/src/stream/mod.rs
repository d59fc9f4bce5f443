//! # Streaming Update Providers
//!
//! Incremental ticks are delivered through the [`StreamProvider`] trait. Two
//! implementations exist and are chosen once, by [`ProviderFactory`]:
//!
//! | Provider | Source of ticks |
//! |----------|-----------------|
//! | [`SimulatedProvider`] | Local cancellable timer synthesizing random-walk ticks |
//! | [`RealtimeProvider`] | Reconnecting feed client over a [`Transport`] |
//!
//! Both run as spawned tokio tasks and must be created inside a runtime.
//! `disconnect()` is terminal and idempotent.

mod factory;
mod memory;
mod realtime;
mod simulated;
mod subscribers;
mod transport;

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::domain::{Instrument, MarketObservation, LONG_WINDOW, SHORT_WINDOW};

pub use factory::{ProviderFactory, StreamMode};
pub use memory::{MemoryConnection, MemoryPeer, MemoryTransport, StaticTokenSource};
pub use realtime::{RealtimeProvider, RealtimeSettings};
pub use simulated::{SimulatedProvider, DEFAULT_TICK_INTERVAL};
pub use subscribers::{tick_callback, Subscription, SubscriptionId, SubscriberSet, TickCallback};
pub use transport::{Connection, HttpTokenSource, TokenSource, Transport, WebSocketTransport};

/// Why a provider is not delivering ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Waiting out the backoff before the next connect attempt.
    Reconnecting,
    /// Reconnect budget exhausted; only a new provider recovers.
    GivenUp,
    /// Torn down by `disconnect()`.
    Disconnected,
}

/// Lifecycle of a streaming provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed(CloseReason),
}

impl ConnectionState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Closed(CloseReason::GivenUp) | Self::Closed(CloseReason::Disconnected)
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed(CloseReason::Reconnecting) => "reconnecting",
            Self::Closed(CloseReason::GivenUp) => "given_up",
            Self::Closed(CloseReason::Disconnected) => "disconnected",
        }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of incremental observations for one instrument.
pub trait StreamProvider: Send + Sync {
    fn instrument(&self) -> Instrument;

    /// Registers a callback; it is invoked for every tick until unsubscribed.
    fn subscribe(&self, callback: TickCallback) -> Subscription;

    /// Removes one callback without affecting the others.
    fn unsubscribe(&self, subscription: &Subscription) -> bool {
        subscription.unsubscribe()
    }

    fn subscriber_count(&self) -> usize;

    fn state(&self) -> ConnectionState;

    /// Receiver that observes every state transition.
    fn state_changes(&self) -> watch::Receiver<ConnectionState>;

    /// Stops timers and connections and drops all subscribers. Idempotent.
    fn disconnect(&self);
}

/// Running `ma5`/`ma20` over the most recent prices of a feed.
#[derive(Debug, Clone, Default)]
pub(crate) struct RollingAverages {
    window: VecDeque<f64>,
}

impl RollingAverages {
    /// Records `value` and returns `(ma5, ma20)` including it.
    pub(crate) fn push(&mut self, value: f64) -> (f64, f64) {
        if self.window.len() == LONG_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(value);
        (self.mean_of_last(SHORT_WINDOW), self.mean_of_last(LONG_WINDOW))
    }

    fn mean_of_last(&self, count: usize) -> f64 {
        let take = count.min(self.window.len()).max(1);
        self.window.iter().rev().take(take).sum::<f64>() / take as f64
    }
}

/// `-1`, `0` or `1` following the sign of `value`.
pub(crate) fn direction(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

pub(crate) fn observation(
    timestamp: String,
    value: f64,
    volume: u64,
    change: f64,
    volatility: f64,
    trend: f64,
    averages: (f64, f64),
) -> MarketObservation {
    MarketObservation {
        timestamp,
        value,
        volume,
        change,
        volatility,
        trend,
        ma5: averages.0,
        ma20: averages.1,
    }
}
