//! # MarketPulse Core
//!
//! Market data pipeline behind the MarketPulse energy trading dashboard.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Domain model** for instruments, time ranges and observations
//! - **Series generator** with an injectable random source
//! - **Validator** checking series before they are trusted
//! - **TTL cache** with per-key fill locks
//! - **Retrying fetcher** with non-decreasing backoff
//! - **Streaming providers**, simulated or real-time with reconnects
//! - **Market data service** composing all of the above
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | TTL cache keyed by instrument and time range |
//! | [`config`] | Environment-driven configuration |
//! | [`data_source`] | Historical series source trait |
//! | [`domain`] | Instruments, time ranges, observations, profiles |
//! | [`error`] | Error taxonomy |
//! | [`generator`] | Synthetic series generator |
//! | [`retry`] | Retry policy and fetcher |
//! | [`service`] | Market data service |
//! | [`stream`] | Streaming update providers |
//! | [`validator`] | Series validation |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marketpulse_core::{tick_callback, MarketDataConfig, MarketDataService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), marketpulse_core::MarketDataError> {
//!     let service = MarketDataService::new(MarketDataConfig::from_env()?)?;
//!
//!     let response = service.get_series("crude-oil", "1D").await;
//!     println!("{}", serde_json::to_string(&response).unwrap_or_default());
//!
//!     let subscription = service.subscribe("crude-oil", tick_callback(|tick| {
//!         println!("{} {:.2}", tick.timestamp, tick.value);
//!     }))?;
//!     tokio::time::sleep(std::time::Duration::from_secs(12)).await;
//!     service.unsubscribe(&subscription);
//!     service.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  Market Data Service │──────────────┐
//! └──────────┬───────────┘              │
//!            │                          ▼
//!            ▼                 ┌──────────────────┐
//! ┌──────────────────────┐     │ Provider Factory │
//! │  TTL Cache           │     └────────┬─────────┘
//! └──────────┬───────────┘              │
//!            │ miss                     ▼
//!            ▼                 ┌──────────────────┐
//! ┌──────────────────────┐     │ Simulated /      │
//! │  Retrying Fetcher    │     │ Realtime Provider│
//! └──────────┬───────────┘     └──────────────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ Source + Validator   │
//! └──────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod generator;
pub mod retry;
pub mod service;
pub mod stream;
pub mod validator;

// Caching
pub use cache::{CacheEntry, CacheKey, CacheMode, SeriesCache, DEFAULT_CACHE_TTL};

// Configuration
pub use config::{MarketDataConfig, StreamConfig};

// Data source trait
pub use data_source::{SeriesFuture, SeriesSource};

// Domain models
pub use domain::{
    Instrument, InstrumentParameters, MarketObservation, MarketProfile, TimeRange, TimeWindowSpec,
    UtcDateTime,
};

// Error types
pub use error::MarketDataError;

// Generation and validation
pub use generator::{RandomSource, SequenceRandom, SeriesGenerator};
pub use validator::validate;

// Retry logic
pub use retry::{fetch_with_retry, Backoff, RetryConfig};

// Service
pub use service::{LiveSeries, MarketDataService, MarketDataServiceBuilder, SeriesResponse};

// Streaming
pub use stream::{
    tick_callback, CloseReason, ConnectionState, ProviderFactory, RealtimeProvider,
    RealtimeSettings, SimulatedProvider, StreamMode, StreamProvider, Subscription, TickCallback,
};
