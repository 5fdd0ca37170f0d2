use crate::error::StrategyError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The market state a strategy evaluation runs against.
///
/// One context covers one instrument at one instant. Strategies that need
/// history keep it themselves across ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketContext {
    pub symbol: String,
    pub last_price: Decimal,
    pub as_of: DateTime<Utc>,
}

/// The seam to whatever supplies prices.
///
/// Market-data retrieval itself (exchange REST, websockets, caching) lives
/// outside this system; the execution unit only ever asks for a snapshot at
/// a tick boundary.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn snapshot(&self, symbol: &str) -> Result<MarketContext, StrategyError>;
}

/// A fixed price table, for tests and local dry runs.
///
/// Prices can be updated from the outside while execution units read them,
/// which is enough to script crossover scenarios in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    prices: Arc<Mutex<HashMap<String, Decimal>>>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: impl Into<String>, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.into(), price);
    }
}

#[async_trait]
impl MarketDataSource for StaticMarketData {
    async fn snapshot(&self, symbol: &str) -> Result<MarketContext, StrategyError> {
        let prices = self.prices.lock().unwrap();
        let last_price = prices
            .get(symbol)
            .copied()
            .ok_or_else(|| StrategyError::MarketDataUnavailable(symbol.to_string()))?;
        Ok(MarketContext {
            symbol: symbol.to_string(),
            last_price,
            as_of: Utc::now(),
        })
    }
}
