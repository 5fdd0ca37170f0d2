use crate::Strategy;
use crate::context::MarketContext;
use crate::error::StrategyError;
use core_types::{OrderSide, SignalIntent};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::VecDeque;

/// Parameters for the dual moving average crossover strategy.
///
/// Defaults match the stock configuration users start from before tuning
/// per-instrument periods.
#[derive(Debug, Clone, Deserialize)]
pub struct DualMaParams {
    /// Short moving-average period, in ticks.
    #[serde(default = "default_sma_short")]
    pub sma_short: usize,
    /// Long moving-average period, in ticks.
    #[serde(default = "default_sma_long")]
    pub sma_long: usize,
    /// Quantity each emitted intent trades.
    #[serde(default = "default_quantity")]
    pub quantity: Decimal,
}

fn default_sma_short() -> usize {
    14
}

fn default_sma_long() -> usize {
    28
}

fn default_quantity() -> Decimal {
    Decimal::ONE
}

/// The dual moving average crossover strategy.
///
/// A buy intent is emitted when the short SMA crosses above the long SMA
/// (golden cross), a sell intent when it crosses below (death cross). The
/// strategy sees one close per tick, so it hand-holds its own rolling
/// windows rather than pulling in an indicator library.
pub struct DualMaCrossover {
    symbol: String,
    params: DualMaParams,
    closes: VecDeque<Decimal>,
    // State: previous SMA values, to detect the crossover event itself
    // rather than the relationship holding.
    prev_short: Option<Decimal>,
    prev_long: Option<Decimal>,
}

impl DualMaCrossover {
    /// Creates a new `DualMaCrossover` instance with the given parameters.
    ///
    /// It performs validation to ensure the parameters are logical.
    pub fn new(params: DualMaParams, symbol: String) -> Result<Self, StrategyError> {
        if params.sma_short == 0 || params.sma_long == 0 {
            return Err(StrategyError::InvalidParameters(
                "SMA periods must be positive".to_string(),
            ));
        }
        if params.sma_short >= params.sma_long {
            return Err(StrategyError::InvalidParameters(
                "Short SMA period must be less than long SMA period".to_string(),
            ));
        }
        if params.quantity <= Decimal::ZERO {
            return Err(StrategyError::InvalidParameters(
                "Quantity must be positive".to_string(),
            ));
        }

        Ok(Self {
            symbol,
            params,
            closes: VecDeque::new(),
            prev_short: None,
            prev_long: None,
        })
    }

    fn sma(&self, period: usize) -> Option<Decimal> {
        if self.closes.len() < period {
            return None;
        }
        let sum: Decimal = self.closes.iter().rev().take(period).sum();
        Some(sum / Decimal::from(period as u64))
    }
}

impl Strategy for DualMaCrossover {
    fn evaluate(&mut self, ctx: &MarketContext) -> Result<Vec<SignalIntent>, StrategyError> {
        self.closes.push_back(ctx.last_price);
        if self.closes.len() > self.params.sma_long {
            self.closes.pop_front();
        }

        let (Some(short), Some(long)) =
            (self.sma(self.params.sma_short), self.sma(self.params.sma_long))
        else {
            // Still warming up the long window.
            return Ok(Vec::new());
        };

        let mut intents = Vec::new();

        if let (Some(prev_short), Some(prev_long)) = (self.prev_short, self.prev_long) {
            let golden_cross = prev_short <= prev_long && short > long;
            let death_cross = prev_short >= prev_long && short < long;

            if golden_cross {
                tracing::debug!(symbol = %self.symbol, %short, %long, "golden cross");
                intents.push(
                    SignalIntent::market(self.symbol.clone(), OrderSide::Buy, self.params.quantity)
                        .with_reason(format!("SMA{} crossed above SMA{}",
                            self.params.sma_short, self.params.sma_long)),
                );
            } else if death_cross {
                tracing::debug!(symbol = %self.symbol, %short, %long, "death cross");
                intents.push(
                    SignalIntent::market(self.symbol.clone(), OrderSide::Sell, self.params.quantity)
                        .with_reason(format!("SMA{} crossed below SMA{}",
                            self.params.sma_short, self.params.sma_long)),
                );
            }
        }

        self.prev_short = Some(short);
        self.prev_long = Some(long);

        Ok(intents)
    }
}
