use thiserror::Error;

/// Errors produced by the market data pipeline.
///
/// Configuration errors (`UnknownInstrument`, `UnknownTimeRange`) are fatal and
/// never retried. Validation errors describe the first offending element of a
/// series. `Fetch` wraps the last failure once the retry budget is spent.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("unknown instrument '{value}', expected crude-oil, natural-gas, renewable, industrial")]
    UnknownInstrument { value: String },
    #[error("unknown time range '{value}', expected one of 1D, 1W, 1M, 3M, 1Y")]
    UnknownTimeRange { value: String },

    #[error("series must contain at least one observation")]
    InvalidFormat,
    #[error("observation {index} has an unparseable timestamp '{timestamp}'")]
    InvalidTimestamp { index: usize, timestamp: String },
    #[error("observation {index} has a non-finite value ({value})")]
    InvalidValue { index: usize, value: f64 },

    #[error("fetch failed after {attempts} attempts: {source}")]
    Fetch {
        attempts: u32,
        #[source]
        source: Box<MarketDataError>,
    },

    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("malformed stream message: {0}")]
    Parse(String),
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MarketDataError {
    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownInstrument { .. } => "market.unknown_instrument",
            Self::UnknownTimeRange { .. } => "market.unknown_time_range",
            Self::InvalidFormat => "market.invalid_format",
            Self::InvalidTimestamp { .. } => "market.invalid_timestamp",
            Self::InvalidValue { .. } => "market.invalid_value",
            Self::Fetch { .. } => "market.fetch_failed",
            Self::Authentication(_) => "stream.authentication",
            Self::Parse(_) => "stream.parse",
            Self::Transport(_) => "stream.transport",
            Self::Config(_) => "config.invalid",
        }
    }

    /// Whether re-running the failed operation can succeed.
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::UnknownInstrument { .. } | Self::UnknownTimeRange { .. } | Self::Config(_)
        )
    }

    /// Innermost error, looking through `Fetch` wrappers.
    pub fn root_cause(&self) -> &MarketDataError {
        match self {
            Self::Fetch { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
