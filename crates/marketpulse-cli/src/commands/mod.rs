mod instruments;
mod series;
mod watch;

use std::process::ExitCode;
use std::time::Duration;

use marketpulse_core::{MarketDataConfig, MarketDataService};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<ExitCode, CliError> {
    match &cli.command {
        Command::Instruments => instruments::run(cli.pretty),
        Command::Series(args) => {
            let service = build_service(cli)?;
            series::run(args, &service, cli.pretty).await
        }
        Command::Watch(args) => {
            let service = build_service(cli)?;
            watch::run(args, &service).await
        }
    }
}

/// Environment configuration with command-line overrides applied.
fn resolve_config(cli: &Cli) -> Result<MarketDataConfig, CliError> {
    let mut config = MarketDataConfig::from_env()?;
    if let Some(mode) = cli.stream_mode {
        config = config.with_stream_mode(mode.into());
    }
    if let Some(ms) = cli.tick_interval_ms {
        config = config.with_tick_interval(Duration::from_millis(ms));
    }
    config.validate()?;
    Ok(config)
}

fn build_service(cli: &Cli) -> Result<MarketDataService, CliError> {
    let config = resolve_config(cli)?;
    tracing::debug!(
        mode = %config.stream.mode,
        ttl_secs = config.cache_ttl.as_secs(),
        "service configured"
    );
    Ok(MarketDataService::new(config)?)
}
