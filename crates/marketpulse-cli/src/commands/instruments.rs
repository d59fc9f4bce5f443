use std::process::ExitCode;

use marketpulse_core::{Instrument, TimeRange};
use serde::Serialize;

use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct InstrumentRow {
    id: &'static str,
    symbol: &'static str,
    name: &'static str,
}

#[derive(Debug, Serialize)]
struct Catalogue {
    instruments: Vec<InstrumentRow>,
    time_ranges: Vec<&'static str>,
}

fn catalogue() -> Catalogue {
    Catalogue {
        instruments: Instrument::ALL
            .iter()
            .map(|instrument| InstrumentRow {
                id: instrument.as_str(),
                symbol: instrument.external_symbol(),
                name: instrument.display_name(),
            })
            .collect(),
        time_ranges: TimeRange::ALL.iter().map(|range| range.as_str()).collect(),
    }
}

pub fn run(pretty: bool) -> Result<ExitCode, CliError> {
    output::render(&catalogue(), pretty)?;
    Ok(ExitCode::SUCCESS)
}
