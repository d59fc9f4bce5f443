//! CLI argument definitions for MarketPulse.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `series` | Fetch a historical series as a tagged JSON response |
//! | `watch` | Stream live ticks as NDJSON |
//! | `instruments` | List instruments, symbols and time ranges |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--stream-mode` | env / `simulated` | Streaming provider family |
//! | `--tick-interval-ms` | env / `5000` | Simulated tick interval |
//!
//! # Examples
//!
//! ```bash
//! marketpulse series crude-oil 1D --pretty
//! marketpulse watch natural-gas --ticks 3 --tick-interval-ms 500
//! MARKETPULSE_STREAM_MODE=realtime marketpulse watch crude-oil
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use marketpulse_core::{CacheMode, StreamMode};

/// MarketPulse - energy market data pipeline
#[derive(Debug, Parser)]
#[command(
    name = "marketpulse",
    author,
    version,
    about = "Energy market data pipeline",
    long_about = "MarketPulse serves historical series for energy instruments through a \
validated, cached, retrying pipeline and streams live ticks from a simulated or \
real-time feed.\n\
\n\
Configuration is read from MARKETPULSE_* environment variables; flags override them."
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Streaming provider family; overrides MARKETPULSE_STREAM_MODE.
    #[arg(long, global = true, value_enum)]
    pub stream_mode: Option<StreamModeArg>,

    /// Simulated tick interval in milliseconds; overrides MARKETPULSE_TICK_INTERVAL_MS.
    #[arg(long, global = true)]
    pub tick_interval_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StreamModeArg {
    /// Locally synthesized ticks.
    Simulated,
    /// Reconnecting WebSocket feed.
    Realtime,
}

impl From<StreamModeArg> for StreamMode {
    fn from(value: StreamModeArg) -> Self {
        match value {
            StreamModeArg::Simulated => Self::Simulated,
            StreamModeArg::Realtime => Self::Realtime,
        }
    }
}

/// How `series` uses the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheArg {
    /// Serve from cache when fresh.
    Use,
    /// Regenerate and overwrite the cached entry.
    Refresh,
    /// Skip the cache entirely.
    Bypass,
}

impl From<CacheArg> for CacheMode {
    fn from(value: CacheArg) -> Self {
        match value {
            CacheArg::Use => Self::Use,
            CacheArg::Refresh => Self::Refresh,
            CacheArg::Bypass => Self::Bypass,
        }
    }
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a historical series.
    ///
    /// Prints `{"success":true,"data":[...]}` or `{"success":false,"error":"..."}`.
    /// A failure response exits with code 3.
    ///
    /// # Examples
    ///
    ///   marketpulse series crude-oil 1D
    ///   marketpulse series renewable 1Y --pretty
    Series(SeriesArgs),

    /// Stream live ticks for an instrument as NDJSON.
    ///
    /// # Examples
    ///
    ///   marketpulse watch crude-oil --ticks 5
    Watch(WatchArgs),

    /// List supported instruments and time ranges.
    Instruments,
}

/// Arguments for the `series` command.
#[derive(Debug, Args)]
pub struct SeriesArgs {
    /// Instrument identifier (crude-oil, natural-gas, renewable, industrial).
    pub instrument: String,

    /// Time range (1D, 1W, 1M, 3M, 1Y).
    #[arg(default_value = "1D")]
    pub range: String,

    /// Cache interaction.
    #[arg(long, value_enum, default_value_t = CacheArg::Use)]
    pub cache: CacheArg,
}

/// Arguments for the `watch` command.
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Instrument identifier.
    pub instrument: String,

    /// Stop after this many ticks.
    #[arg(long, default_value_t = 5)]
    pub ticks: usize,

    /// Load this range first and print the patched last point with every tick.
    #[arg(long)]
    pub range: Option<String>,
}
