use async_trait::async_trait;
use chrono::Utc;
use configuration::MarketSettings;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use strategies::{MarketContext, MarketDataSource, StrategyError};

/// The JSON shape of the ticker-price endpoint.
#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    #[allow(dead_code)]
    symbol: String,
    price: Decimal,
}

/// A REST-backed `MarketDataSource` polling a ticker-price endpoint.
///
/// One GET per tick per run; anything fancier (websocket streams, shared
/// caches) belongs to the market-data layer outside this runtime. Failures
/// surface as `MarketDataUnavailable`, which execution units treat as a
/// skipped tick.
pub struct RestMarketData {
    client: Client,
    ticker_url: String,
}

impl RestMarketData {
    pub fn new(settings: &MarketSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            client,
            ticker_url: settings.ticker_url.clone(),
        })
    }
}

#[async_trait]
impl MarketDataSource for RestMarketData {
    async fn snapshot(&self, symbol: &str) -> Result<MarketContext, StrategyError> {
        let response = self
            .client
            .get(&self.ticker_url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| StrategyError::MarketDataUnavailable(format!("{}: {}", symbol, e)))?;

        if !response.status().is_success() {
            return Err(StrategyError::MarketDataUnavailable(format!(
                "{}: ticker endpoint returned {}",
                symbol,
                response.status()
            )));
        }

        let ticker: TickerPriceResponse = response
            .json()
            .await
            .map_err(|e| StrategyError::MarketDataUnavailable(format!("{}: {}", symbol, e)))?;

        Ok(MarketContext {
            symbol: symbol.to_string(),
            last_price: ticker.price,
            as_of: Utc::now(),
        })
    }
}
