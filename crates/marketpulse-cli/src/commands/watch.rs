use std::process::ExitCode;

use marketpulse_core::{tick_callback, MarketDataService, MarketObservation};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::cli::WatchArgs;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct TickLine<'a> {
    instrument: &'a str,
    tick: &'a MarketObservation,
    #[serde(skip_serializing_if = "Option::is_none")]
    live: Option<&'a MarketObservation>,
}

pub async fn run(args: &WatchArgs, service: &MarketDataService) -> Result<ExitCode, CliError> {
    if let Some(range) = &args.range {
        let response = service.get_series(&args.instrument, range).await;
        if let Some(error) = response.error() {
            output::render(&response, false)?;
            tracing::error!(%error, "could not load series before streaming");
            return Ok(ExitCode::from(3));
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<MarketObservation>();
    let subscription = service.subscribe(
        &args.instrument,
        tick_callback(move |tick| {
            // The receiver is gone once enough ticks were printed.
            let _ = tx.send(tick.clone());
        }),
    )?;
    let mut states = service
        .stream_state_changes()
        .ok_or_else(|| CliError::Stream(String::from("no active stream")))?;

    let mut received = 0;
    let outcome = loop {
        if received >= args.ticks {
            break Ok(ExitCode::SUCCESS);
        }
        tokio::select! {
            tick = rx.recv() => {
                let Some(tick) = tick else {
                    break Err(CliError::Stream(String::from("subscription closed")));
                };
                received += 1;
                let live = service.live_series();
                let line = TickLine {
                    instrument: &args.instrument,
                    tick: &tick,
                    live: live.as_ref().and_then(|series| series.points.last()),
                };
                if let Err(error) = output::render_line(&line) {
                    break Err(error);
                }
            }
            changed = states.changed() => {
                let state = *states.borrow_and_update();
                if changed.is_err() || state.is_terminal() {
                    break Err(CliError::Stream(format!("provider is {state}")));
                }
                tracing::info!(%state, "stream state changed");
            }
            _ = tokio::signal::ctrl_c() => break Ok(ExitCode::SUCCESS),
        }
    };

    service.unsubscribe(&subscription);
    service.disconnect();
    outcome
}
