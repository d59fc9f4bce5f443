use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::MarketDataError;

/// Tradeable energy-market category shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Instrument {
    CrudeOil,
    NaturalGas,
    Renewable,
    Industrial,
}

impl Instrument {
    pub const ALL: [Self; 4] = [
        Self::CrudeOil,
        Self::NaturalGas,
        Self::Renewable,
        Self::Industrial,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CrudeOil => "crude-oil",
            Self::NaturalGas => "natural-gas",
            Self::Renewable => "renewable",
            Self::Industrial => "industrial",
        }
    }

    /// Symbol used when subscribing on the real-time feed.
    pub const fn external_symbol(self) -> &'static str {
        match self {
            Self::CrudeOil => "CL",
            Self::NaturalGas => "NG",
            Self::Renewable => "REN",
            Self::Industrial => "IND",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::CrudeOil => "Crude Oil",
            Self::NaturalGas => "Natural Gas",
            Self::Renewable => "Renewable Energy",
            Self::Industrial => "Industrial Power",
        }
    }
}

impl Display for Instrument {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Instrument {
    type Err = MarketDataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|instrument| instrument.as_str() == trimmed)
            .ok_or_else(|| MarketDataError::UnknownInstrument {
                value: trimmed.to_owned(),
            })
    }
}
