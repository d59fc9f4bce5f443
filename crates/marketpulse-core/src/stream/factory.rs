use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::realtime::{RealtimeProvider, RealtimeSettings};
use super::simulated::{SimulatedProvider, DEFAULT_TICK_INTERVAL};
use super::transport::{HttpTokenSource, TokenSource, Transport, WebSocketTransport};
use super::StreamProvider;
use crate::config::StreamConfig;
use crate::domain::Instrument;
use crate::MarketDataError;

/// Which provider family the service streams from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    #[default]
    Simulated,
    Realtime,
}

impl StreamMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Realtime => "realtime",
        }
    }
}

impl Display for StreamMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamMode {
    type Err = MarketDataError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(Self::Simulated),
            "realtime" | "real-time" | "live" => Ok(Self::Realtime),
            other => Err(MarketDataError::Config(format!(
                "unknown stream mode '{other}', expected simulated or realtime"
            ))),
        }
    }
}

#[derive(Clone)]
enum Blueprint {
    Simulated {
        tick_interval: Duration,
    },
    Realtime {
        settings: RealtimeSettings,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenSource>,
    },
}

/// Creates one provider per instrument subscription.
///
/// The provider family is fixed when the factory is built, so the rest of the
/// service never branches on it.
#[derive(Clone)]
pub struct ProviderFactory {
    blueprint: Blueprint,
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::simulated(DEFAULT_TICK_INTERVAL)
    }
}

impl ProviderFactory {
    pub fn simulated(tick_interval: Duration) -> Self {
        Self {
            blueprint: Blueprint::Simulated { tick_interval },
        }
    }

    pub fn realtime(
        settings: RealtimeSettings,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            blueprint: Blueprint::Realtime {
                settings,
                transport,
                tokens,
            },
        }
    }

    /// Factory matching `config.mode`, wired to the network transports.
    pub fn from_config(config: &StreamConfig) -> Result<Self, MarketDataError> {
        match config.mode {
            StreamMode::Simulated => Ok(Self::simulated(config.tick_interval)),
            StreamMode::Realtime => {
                let ws_url = config.ws_url.clone().ok_or_else(|| {
                    MarketDataError::Config(String::from("realtime mode requires a feed URL"))
                })?;
                let token_url = config.token_url.clone().ok_or_else(|| {
                    MarketDataError::Config(String::from("realtime mode requires a token URL"))
                })?;
                Ok(Self::realtime(
                    config.realtime_settings(),
                    Arc::new(WebSocketTransport::new(ws_url)),
                    Arc::new(HttpTokenSource::new(token_url, config.api_key.clone())),
                ))
            }
        }
    }

    pub fn mode(&self) -> StreamMode {
        match self.blueprint {
            Blueprint::Simulated { .. } => StreamMode::Simulated,
            Blueprint::Realtime { .. } => StreamMode::Realtime,
        }
    }

    /// Starts a provider for `instrument`. Must be called inside a tokio runtime.
    pub fn create(&self, instrument: Instrument) -> Arc<dyn StreamProvider> {
        match &self.blueprint {
            Blueprint::Simulated { tick_interval } => {
                SimulatedProvider::start(instrument, *tick_interval)
            }
            Blueprint::Realtime {
                settings,
                transport,
                tokens,
            } => RealtimeProvider::connect(
                instrument,
                *settings,
                Arc::clone(transport),
                Arc::clone(tokens),
            ),
        }
    }
}
