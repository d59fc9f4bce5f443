//! Behavior tests for the streaming update providers
//!
//! Timers run on paused tokio time, so intervals and reconnect delays are
//! observed exactly.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use marketpulse_core::stream::{MemoryTransport, StaticTokenSource, TokenSource};
use marketpulse_core::{
    tick_callback, CloseReason, ConnectionState, Instrument, MarketDataError, MarketObservation,
    RealtimeProvider, RealtimeSettings, SimulatedProvider, StreamProvider,
};

fn recorder() -> (Arc<Mutex<Vec<MarketObservation>>>, marketpulse_core::TickCallback) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback = tick_callback(move |tick| {
        sink.lock().expect("recorder lock").push(tick.clone());
    });
    (seen, callback)
}

async fn wait_for_state(provider: &dyn StreamProvider, target: ConnectionState) {
    provider
        .state_changes()
        .wait_for(|state| *state == target)
        .await
        .expect("provider keeps its state channel open");
}

// =============================================================================
// Simulated provider
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_two_intervals_elapse_subscriber_receives_two_ordered_ticks() {
    // Given: A simulated provider ticking every five seconds
    let provider = SimulatedProvider::start(Instrument::CrudeOil, Duration::from_secs(5));
    let (seen, callback) = recorder();
    let subscription = provider.subscribe(callback);

    // When: Two intervals elapse
    tokio::time::sleep(Duration::from_millis(10_100)).await;

    // Then: Exactly two ticks arrived in timestamp order
    let ticks = seen.lock().expect("recorder lock").clone();
    assert_eq!(ticks.len(), 2);
    let first = ticks[0].parsed_timestamp().expect("parseable");
    let second = ticks[1].parsed_timestamp().expect("parseable");
    assert!(first < second);

    // When: The callback unsubscribes and more intervals pass
    assert!(provider.unsubscribe(&subscription));
    tokio::time::sleep(Duration::from_secs(30)).await;

    // Then: No further invocations occurred
    assert_eq!(seen.lock().expect("recorder lock").len(), 2);
    provider.disconnect();
}

#[tokio::test(start_paused = true)]
async fn when_one_subscriber_leaves_others_keep_receiving() {
    // Given: Two subscribers on one provider
    let provider = SimulatedProvider::start(Instrument::Renewable, Duration::from_secs(1));
    let (first_seen, first) = recorder();
    let (second_seen, second) = recorder();
    let first = provider.subscribe(first);
    provider.subscribe(second);

    // When: The first unsubscribes after one tick
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    first.unsubscribe();
    tokio::time::sleep(Duration::from_secs(2)).await;

    // Then: Only the second keeps receiving
    assert_eq!(first_seen.lock().expect("recorder lock").len(), 1);
    assert_eq!(second_seen.lock().expect("recorder lock").len(), 3);
    assert_eq!(provider.subscriber_count(), 1);
    provider.disconnect();
}

#[tokio::test(start_paused = true)]
async fn when_simulated_provider_disconnects_twice_system_stays_quiet() {
    let provider = SimulatedProvider::start(Instrument::Industrial, Duration::from_secs(1));
    let (seen, callback) = recorder();
    provider.subscribe(callback);

    provider.disconnect();
    provider.disconnect();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(seen.lock().expect("recorder lock").is_empty());
    assert_eq!(
        provider.state(),
        ConnectionState::Closed(CloseReason::Disconnected)
    );
}

// =============================================================================
// Real-time provider: reconnect policy
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_transport_keeps_failing_system_reconnects_five_times_then_gives_up() {
    // Given: A transport on which every connect attempt fails
    let transport = Arc::new(MemoryTransport::new());
    let provider = RealtimeProvider::connect(
        Instrument::CrudeOil,
        RealtimeSettings::default(),
        transport.clone(),
        Arc::new(StaticTokenSource::new("token")),
    );

    // When: The provider exhausts its reconnect budget
    wait_for_state(&*provider, ConnectionState::Closed(CloseReason::GivenUp)).await;

    // Then: One initial attempt plus exactly five reconnects
    let attempts = transport.connect_attempts();
    assert_eq!(attempts.len(), 6);

    // And: Delays between attempts strictly increase (1s, 2s, ... 5s)
    let delays: Vec<Duration> = attempts.windows(2).map(|pair| pair[1] - pair[0]).collect();
    assert_eq!(
        delays,
        (1..=5).map(Duration::from_secs).collect::<Vec<_>>()
    );
    assert!(delays.windows(2).all(|pair| pair[0] < pair[1]));

    // And: No further reconnect is scheduled
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.connect_attempts().len(), 6);
    assert_eq!(
        provider.state(),
        ConnectionState::Closed(CloseReason::GivenUp)
    );
}

struct DenyingTokens {
    calls: AtomicU32,
}

impl TokenSource for DenyingTokens {
    fn acquire(&self) -> BoxFuture<'_, Result<String, MarketDataError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(MarketDataError::Authentication(String::from("key revoked"))) })
    }
}

#[tokio::test(start_paused = true)]
async fn when_token_acquisition_fails_system_applies_reconnect_backoff() {
    // Given: A token endpoint that always refuses
    let transport = Arc::new(MemoryTransport::new());
    let tokens = Arc::new(DenyingTokens {
        calls: AtomicU32::new(0),
    });
    let provider = RealtimeProvider::connect(
        Instrument::NaturalGas,
        RealtimeSettings {
            max_reconnect_attempts: 2,
            ..RealtimeSettings::default()
        },
        transport.clone(),
        tokens.clone(),
    );

    // When: The provider gives up
    wait_for_state(&*provider, ConnectionState::Closed(CloseReason::GivenUp)).await;

    // Then: Authentication was retried like a transport failure, no connect was made
    assert_eq!(tokens.calls.load(Ordering::SeqCst), 3);
    assert!(transport.connect_attempts().is_empty());
}

// =============================================================================
// Real-time provider: message handling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_feed_sends_malformed_message_system_keeps_connection_open() {
    // Given: An open feed
    let transport = Arc::new(MemoryTransport::new());
    let peer = transport.push_connection();
    let provider = RealtimeProvider::connect(
        Instrument::CrudeOil,
        RealtimeSettings::default(),
        transport.clone(),
        Arc::new(StaticTokenSource::new("token")),
    );
    let (seen, callback) = recorder();
    provider.subscribe(callback);
    wait_for_state(&*provider, ConnectionState::Open).await;

    // When: Garbage, an unrelated message and two trades arrive
    peer.push("{not json");
    peer.push(r#"{"type":"status","message":"ok"}"#);
    peer.push(
        r#"{"type":"trade","symbol":"CL","price":80.0,"volume":100,"timestamp":"2024-05-01T10:00:00Z"}"#,
    );
    peer.push(
        r#"{"type":"trade","symbol":"CL","price":88.0,"volume":50,"timestamp":"2024-05-01T10:00:05Z"}"#,
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Then: Only the trades are delivered, with relative change
    let ticks = seen.lock().expect("recorder lock").clone();
    assert_eq!(ticks.len(), 2);
    assert_eq!(ticks[0].change, 0.0);
    assert!((ticks[1].change - 0.1).abs() < 1e-12);
    assert!((ticks[1].volatility - 0.1).abs() < 1e-12);
    assert_eq!(ticks[1].trend, 1.0);

    // And: The connection survived
    assert_eq!(provider.state(), ConnectionState::Open);
    assert_eq!(transport.connect_attempts().len(), 1);
    provider.disconnect();
}

#[tokio::test(start_paused = true)]
async fn when_feed_drops_system_reconnects_and_resubscribes() {
    // Given: An open feed with a replacement connection queued
    let transport = Arc::new(MemoryTransport::new());
    let mut first = transport.push_connection();
    let mut second = transport.push_connection();
    let provider = RealtimeProvider::connect(
        Instrument::Renewable,
        RealtimeSettings::default(),
        transport.clone(),
        Arc::new(StaticTokenSource::new("token")),
    );
    let subscribe = Some(String::from(
        r#"{"type":"subscribe","token":"token","symbols":["REN"]}"#,
    ));
    assert_eq!(first.next_sent().await, subscribe);

    // When: The feed hangs up
    first.hang_up();

    // Then: The provider reconnects after one delay and subscribes again
    assert_eq!(second.next_sent().await, subscribe);
    let attempts = transport.connect_attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1] - attempts[0], Duration::from_secs(1));
    wait_for_state(&*provider, ConnectionState::Open).await;
    assert_eq!(provider.reconnect_attempts(), 0);
    provider.disconnect();
}

#[tokio::test(start_paused = true)]
async fn when_realtime_provider_disconnects_system_closes_transport() {
    // Given: An open feed
    let transport = Arc::new(MemoryTransport::new());
    let peer = transport.push_connection();
    let provider = RealtimeProvider::connect(
        Instrument::Industrial,
        RealtimeSettings::default(),
        transport.clone(),
        Arc::new(StaticTokenSource::new("token")),
    );
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    provider.subscribe(tick_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    wait_for_state(&*provider, ConnectionState::Open).await;

    // When: It is disconnected twice
    provider.disconnect();
    provider.disconnect();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Then: The connection is closed, subscribers are gone, nothing reconnects
    assert!(!peer.push(r#"{"type":"trade","price":1.0}"#));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(provider.subscriber_count(), 0);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.connect_attempts().len(), 1);
    assert_eq!(
        provider.state(),
        ConnectionState::Closed(CloseReason::Disconnected)
    );
}
