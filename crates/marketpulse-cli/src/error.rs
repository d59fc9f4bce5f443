use marketpulse_core::MarketDataError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    #[error("stream ended: {0}")]
    Stream(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::MarketData(_) => 2,
            Self::Serialization(_) => 4,
            Self::Stream(_) => 6,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_category() {
        let config = CliError::from(MarketDataError::Config(String::from("bad")));
        assert_eq!(config.exit_code(), 2);
        assert_eq!(CliError::Stream(String::from("gave up")).exit_code(), 6);
        assert_eq!(
            CliError::from(std::io::Error::other("closed pipe")).exit_code(),
            10
        );
    }
}
