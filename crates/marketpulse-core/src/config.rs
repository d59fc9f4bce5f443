//! Runtime configuration of the market data service.
//!
//! Everything has a working default; [`MarketDataConfig::from_env`] overlays
//! `MARKETPULSE_*` variables on top.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::DEFAULT_CACHE_TTL;
use crate::retry::RetryConfig;
use crate::stream::{RealtimeSettings, StreamMode, DEFAULT_TICK_INTERVAL};
use crate::MarketDataError;

/// Streaming provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub mode: StreamMode,
    pub tick_interval: Duration,
    pub heartbeat_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub ws_url: Option<String>,
    pub token_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        let realtime = RealtimeSettings::default();
        Self {
            mode: StreamMode::Simulated,
            tick_interval: DEFAULT_TICK_INTERVAL,
            heartbeat_interval: realtime.heartbeat_interval,
            max_reconnect_attempts: realtime.max_reconnect_attempts,
            reconnect_delay: realtime.reconnect_delay,
            ws_url: None,
            token_url: None,
            api_key: None,
        }
    }
}

impl StreamConfig {
    pub fn realtime_settings(&self) -> RealtimeSettings {
        RealtimeSettings {
            heartbeat_interval: self.heartbeat_interval,
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_delay: self.reconnect_delay,
        }
    }
}

/// Top-level configuration.
///
/// ```
/// use std::time::Duration;
/// use marketpulse_core::{MarketDataConfig, StreamMode};
///
/// let config = MarketDataConfig::default()
///     .with_cache_ttl(Duration::from_secs(60))
///     .with_stream_mode(StreamMode::Simulated);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataConfig {
    pub cache_ttl: Duration,
    pub retry: RetryConfig,
    pub stream: StreamConfig,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            retry: RetryConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl MarketDataConfig {
    /// Defaults overlaid with `MARKETPULSE_*` environment variables.
    ///
    /// The API key falls back to `MARKET_DATA_API_KEY`.
    pub fn from_env() -> Result<Self, MarketDataError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MarketDataError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        if let Some(raw) = value("MARKETPULSE_STREAM_MODE") {
            config.stream.mode = raw.parse()?;
        }
        if let Some(secs) = parse_number::<u64>(&value, "MARKETPULSE_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_number::<u64>(&value, "MARKETPULSE_TICK_INTERVAL_MS")? {
            config.stream.tick_interval = Duration::from_millis(ms);
        }
        if let Some(max) = parse_number::<u32>(&value, "MARKETPULSE_MAX_RECONNECT_ATTEMPTS")? {
            config.stream.max_reconnect_attempts = max;
        }
        if let Some(ms) = parse_number::<u64>(&value, "MARKETPULSE_RECONNECT_DELAY_MS")? {
            config.stream.reconnect_delay = Duration::from_millis(ms);
        }
        config.stream.ws_url = value("MARKETPULSE_WS_URL");
        config.stream.token_url = value("MARKETPULSE_TOKEN_URL");
        config.stream.api_key =
            value("MARKETPULSE_API_KEY").or_else(|| value("MARKET_DATA_API_KEY"));

        config.validate()?;
        Ok(config)
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stream_mode(mut self, mode: StreamMode) -> Self {
        self.stream.mode = mode;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.stream.tick_interval = interval;
        self
    }

    /// Endpoints of the real-time feed.
    pub fn with_realtime_endpoints(
        mut self,
        ws_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.stream.ws_url = Some(ws_url.into());
        self.stream.token_url = Some(token_url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.stream.api_key = Some(key.into());
        self
    }

    pub fn validate(&self) -> Result<(), MarketDataError> {
        if self.cache_ttl.is_zero() {
            return Err(MarketDataError::Config(String::from("cache TTL must be positive")));
        }
        if self.stream.tick_interval.is_zero() {
            return Err(MarketDataError::Config(String::from("tick interval must be positive")));
        }
        if self.stream.heartbeat_interval.is_zero() {
            return Err(MarketDataError::Config(String::from(
                "heartbeat interval must be positive",
            )));
        }
        if self.stream.mode == StreamMode::Realtime {
            if self.stream.ws_url.is_none() {
                return Err(MarketDataError::Config(String::from(
                    "realtime mode requires MARKETPULSE_WS_URL",
                )));
            }
            if self.stream.token_url.is_none() {
                return Err(MarketDataError::Config(String::from(
                    "realtime mode requires MARKETPULSE_TOKEN_URL",
                )));
            }
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(
    value: impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, MarketDataError> {
    value(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| {
                MarketDataError::Config(format!(
                    "{name} must be a non-negative integer, got '{raw}'"
                ))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = MarketDataConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.stream.mode, StreamMode::Simulated);
        assert_eq!(config.stream.tick_interval, Duration::from_secs(5));
        assert_eq!(config.stream.max_reconnect_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = MarketDataConfig::from_lookup(lookup(&[
            ("MARKETPULSE_STREAM_MODE", "realtime"),
            ("MARKETPULSE_CACHE_TTL_SECS", "60"),
            ("MARKETPULSE_TICK_INTERVAL_MS", "250"),
            ("MARKETPULSE_RECONNECT_DELAY_MS", "10"),
            ("MARKETPULSE_WS_URL", "wss://feed.example/ws"),
            ("MARKETPULSE_TOKEN_URL", "https://feed.example/token"),
            ("MARKET_DATA_API_KEY", "fallback"),
        ]))
        .expect("valid environment");

        assert_eq!(config.stream.mode, StreamMode::Realtime);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.stream.tick_interval, Duration::from_millis(250));
        assert_eq!(config.stream.realtime_settings().reconnect_delay, Duration::from_millis(10));
        assert_eq!(config.stream.api_key.as_deref(), Some("fallback"));
    }

    #[test]
    fn prefixed_api_key_wins() {
        let config = MarketDataConfig::from_lookup(lookup(&[
            ("MARKETPULSE_API_KEY", "primary"),
            ("MARKET_DATA_API_KEY", "fallback"),
        ]))
        .expect("valid environment");
        assert_eq!(config.stream.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn rejects_invalid_values() {
        let err = MarketDataConfig::from_lookup(lookup(&[("MARKETPULSE_CACHE_TTL_SECS", "0")]))
            .expect_err("zero ttl");
        assert_eq!(err.code(), "config.invalid");

        let err = MarketDataConfig::from_lookup(lookup(&[("MARKETPULSE_TICK_INTERVAL_MS", "soon")]))
            .expect_err("not a number");
        assert!(err.to_string().contains("MARKETPULSE_TICK_INTERVAL_MS"));

        let err = MarketDataConfig::from_lookup(lookup(&[("MARKETPULSE_STREAM_MODE", "realtime")]))
            .expect_err("missing endpoints");
        assert!(err.to_string().contains("MARKETPULSE_WS_URL"));
    }
}
