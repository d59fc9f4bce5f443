use std::process::ExitCode;

use marketpulse_core::MarketDataService;

use crate::cli::SeriesArgs;
use crate::error::CliError;
use crate::output;

pub async fn run(
    args: &SeriesArgs,
    service: &MarketDataService,
    pretty: bool,
) -> Result<ExitCode, CliError> {
    let response = service
        .get_series_with(&args.instrument, &args.range, args.cache.into())
        .await;
    output::render(&response, pretty)?;

    if response.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(3))
    }
}
