use crate::Strategy;
use crate::context::MarketContext;
use crate::error::StrategyError;
use chrono::{DateTime, Duration, Utc};
use core_types::{OrderSide, SignalIntent};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Parameters for the price threshold strategy.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceThresholdParams {
    /// Buy when price drops below this threshold.
    pub buy_below: Decimal,
    /// Sell when price rises above this threshold.
    pub sell_above: Decimal,
    /// Quantity each emitted intent trades.
    #[serde(default = "default_quantity")]
    pub quantity: Decimal,
    /// Minimum time between signals, in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,
}

fn default_quantity() -> Decimal {
    Decimal::ONE
}

fn default_cooldown_secs() -> i64 {
    300
}

/// A simple band strategy: buy below a floor, sell back above a ceiling.
///
/// Holds at most one notional position and enforces a cooldown between
/// signals so a price oscillating around a threshold does not emit a burst
/// of orders.
pub struct PriceThreshold {
    symbol: String,
    params: PriceThresholdParams,
    has_position: bool,
    last_signal_at: Option<DateTime<Utc>>,
}

impl PriceThreshold {
    pub fn new(params: PriceThresholdParams, symbol: String) -> Result<Self, StrategyError> {
        if params.buy_below >= params.sell_above {
            return Err(StrategyError::InvalidParameters(
                "Buy threshold must be below sell threshold".to_string(),
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
            has_position: false,
            last_signal_at: None,
        })
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_signal_at {
            None => true,
            Some(at) => now - at >= Duration::seconds(self.params.cooldown_secs),
        }
    }
}

impl Strategy for PriceThreshold {
    fn evaluate(&mut self, ctx: &MarketContext) -> Result<Vec<SignalIntent>, StrategyError> {
        if !self.cooldown_elapsed(ctx.as_of) {
            return Ok(Vec::new());
        }

        let price = ctx.last_price;

        if price < self.params.buy_below && !self.has_position {
            tracing::debug!(symbol = %self.symbol, %price, threshold = %self.params.buy_below,
                "price below buy threshold");
            self.has_position = true;
            self.last_signal_at = Some(ctx.as_of);
            return Ok(vec![
                SignalIntent::market(self.symbol.clone(), OrderSide::Buy, self.params.quantity)
                    .with_reason(format!(
                        "Price {} below buy threshold {}",
                        price, self.params.buy_below
                    )),
            ]);
        }

        if price > self.params.sell_above && self.has_position {
            tracing::debug!(symbol = %self.symbol, %price, threshold = %self.params.sell_above,
                "price above sell threshold");
            self.has_position = false;
            self.last_signal_at = Some(ctx.as_of);
            return Ok(vec![
                SignalIntent::market(self.symbol.clone(), OrderSide::Sell, self.params.quantity)
                    .with_reason(format!(
                        "Price {} above sell threshold {}",
                        price, self.params.sell_above
                    )),
            ]);
        }

        Ok(Vec::new())
    }
}
