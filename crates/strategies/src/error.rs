use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("An error occurred during indicator calculation: {0}")]
    Indicator(String),

    #[error("Market data unavailable for {0}")]
    MarketDataUnavailable(String),
}
