use crate::Strategy;
use crate::dual_ma::{DualMaCrossover, DualMaParams};
use crate::error::StrategyError;
use crate::price_threshold::{PriceThreshold, PriceThresholdParams};
use core_types::enums::StrategyId;
use serde_json::Value as JsonValue;

/// Creates a strategy instance from a run's persisted id and JSON parameters.
///
/// The compiler will error if a new `StrategyId` is added but not handled
/// here.
pub fn create_strategy(
    id: StrategyId,
    symbol: &str,
    parameters: &JsonValue,
) -> Result<Box<dyn Strategy>, StrategyError> {
    match id {
        StrategyId::DualMaCrossover => {
            let params: DualMaParams = serde_json::from_value(parameters.clone())
                .map_err(|e| StrategyError::InvalidParameters(e.to_string()))?;
            Ok(Box::new(DualMaCrossover::new(params, symbol.to_string())?))
        }
        StrategyId::PriceThreshold => {
            let params: PriceThresholdParams = serde_json::from_value(parameters.clone())
                .map_err(|e| StrategyError::InvalidParameters(e.to_string()))?;
            Ok(Box::new(PriceThreshold::new(params, symbol.to_string())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_dual_ma_with_defaults() {
        let strategy = create_strategy(StrategyId::DualMaCrossover, "BTCUSDT", &json!({}));
        assert!(strategy.is_ok());
    }

    #[test]
    fn rejects_malformed_parameters() {
        let result = create_strategy(
            StrategyId::PriceThreshold,
            "BTCUSDT",
            &json!({ "buy_below": "not a number" }),
        );
        assert!(matches!(result, Err(StrategyError::InvalidParameters(_))));
    }

    #[test]
    fn threshold_strategy_requires_its_band() {
        // No defaults for the thresholds themselves.
        let result = create_strategy(StrategyId::PriceThreshold, "BTCUSDT", &json!({}));
        assert!(result.is_err());
    }
}
