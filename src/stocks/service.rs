// Copyright 2025 Assistance Micro Design
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Stock data service.
//!
//! Prices and historical series from the stock-data tool server, with
//! the cache consulted first and every upstream call guarded by the
//! `stock-data` circuit breaker and the `mcp` retry profile.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::cache::{keys, MarketCache, HISTORICAL_TTL, PRICE_TTL};
use crate::mcp::{ToolClient, ToolError};
use crate::models::{HistoricalBar, PriceSnapshot};
use crate::resilience::retry::{retry, RetryConfig};
use crate::resilience::BreakerRegistry;
use crate::security::Validator;
use crate::stocks::MarketDataError;

/// Breaker name guarding the stock-data tool server.
pub const STOCK_DATA_BREAKER: &str = "stock-data";

/// Price and historical data access.
pub struct StockDataService {
    client: Arc<ToolClient>,
    cache: Arc<MarketCache>,
    breakers: Arc<BreakerRegistry>,
    retry_config: RetryConfig,
}

impl StockDataService {
    pub fn new(
        client: Arc<ToolClient>,
        cache: Arc<MarketCache>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self {
            client,
            cache,
            breakers,
            retry_config: RetryConfig::mcp(),
        }
    }

    /// Fetches the current price for one ticker.
    #[instrument(name = "stock_get_price", skip(self))]
    pub async fn get_price(&self, ticker: &str) -> Result<PriceSnapshot, MarketDataError> {
        let ticker = Validator::validate_ticker(ticker)?;
        let cache_key = keys::stock_price(&ticker);

        if let Some(snapshot) = self.cache.get::<PriceSnapshot>(&cache_key).await {
            return Ok(snapshot);
        }

        let value = self
            .guarded_call("get_stock_price", serde_json::json!({ "ticker": ticker }))
            .await?;

        let snapshot: PriceSnapshot = serde_json::from_value(value)
            .map_err(|e| MarketDataError::InvalidData(format!("price payload: {}", e)))?;

        self.cache.set(&cache_key, &snapshot, PRICE_TTL).await;
        Ok(snapshot)
    }

    /// Fetches prices for several tickers, reading what it can from the
    /// cache and batch-fetching the rest in one tool call.
    ///
    /// Tickers the upstream could not price are absent from the result;
    /// the batch never fails because of a single bad ticker.
    #[instrument(name = "stock_get_batch_prices", skip_all, fields(count = tickers.len()))]
    pub async fn get_batch_prices(
        &self,
        tickers: &[String],
    ) -> Result<HashMap<String, PriceSnapshot>, MarketDataError> {
        let mut validated = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            validated.push(Validator::validate_ticker(ticker)?);
        }
        validated.sort();
        validated.dedup();

        if validated.is_empty() {
            return Ok(HashMap::new());
        }

        let cache_keys: Vec<String> = validated.iter().map(|t| keys::stock_price(t)).collect();
        let cached: HashMap<String, PriceSnapshot> = self.cache.batch_get(&cache_keys).await;

        let mut results: HashMap<String, PriceSnapshot> = cached
            .into_values()
            .map(|snapshot| (snapshot.ticker.clone(), snapshot))
            .collect();

        let missing: Vec<String> = validated
            .iter()
            .filter(|t| !results.contains_key(*t))
            .cloned()
            .collect();

        if missing.is_empty() {
            return Ok(results);
        }

        debug!(missing = missing.len(), "Batch-fetching uncached prices");
        let value = self
            .guarded_call(
                "get_batch_prices",
                serde_json::json!({ "tickers": missing }),
            )
            .await?;

        for (ticker, snapshot) in parse_batch_prices(value) {
            self.cache
                .set(&keys::stock_price(&ticker), &snapshot, PRICE_TTL)
                .await;
            results.insert(ticker, snapshot);
        }

        info!(
            requested = validated.len(),
            priced = results.len(),
            "Batch price fetch completed"
        );
        Ok(results)
    }

    /// Fetches a historical OHLCV series and verifies its invariants.
    #[instrument(name = "stock_get_historical", skip(self))]
    pub async fn get_historical(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<HistoricalBar>, MarketDataError> {
        let ticker = Validator::validate_ticker(ticker)?;
        if start_date > end_date {
            return Err(MarketDataError::InvalidData(format!(
                "start date {} is after end date {}",
                start_date, end_date
            )));
        }

        let from = start_date.to_string();
        let to = end_date.to_string();
        let cache_key = keys::stock_historical(&ticker, &from, &to);

        if let Some(bars) = self.cache.get::<Vec<HistoricalBar>>(&cache_key).await {
            return Ok(bars);
        }

        let value = self
            .guarded_call(
                "get_historical_data",
                serde_json::json!({
                    "ticker": ticker,
                    "start_date": from,
                    "end_date": to,
                }),
            )
            .await?;

        let bars: Vec<HistoricalBar> = serde_json::from_value(value)
            .map_err(|e| MarketDataError::InvalidData(format!("historical payload: {}", e)))?;

        validate_historical_bars(&bars, start_date, end_date)?;

        self.cache.set(&cache_key, &bars, HISTORICAL_TTL).await;
        Ok(bars)
    }

    /// Drops the cached price for one ticker.
    pub async fn invalidate_price_cache(&self, ticker: &str) {
        if let Ok(ticker) = Validator::validate_ticker(ticker) {
            self.cache.invalidate(&keys::stock_price(&ticker)).await;
        }
    }

    /// Runs one tool call under breaker + retry.
    async fn guarded_call(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, MarketDataError> {
        let breaker = self.breakers.get(STOCK_DATA_BREAKER).await;
        let client = self.client.clone();
        let config = self.retry_config.clone();

        breaker
            .execute(move || async move {
                retry(
                    || client.call_tool(tool, arguments.clone()),
                    &config,
                    ToolError::is_transient,
                )
                .await
            })
            .await
            .map_err(MarketDataError::from)
    }
}

/// Parses the batch-price payload: a map of ticker to snapshot.
/// Entries that fail to decode are skipped with a warning.
fn parse_batch_prices(value: serde_json::Value) -> Vec<(String, PriceSnapshot)> {
    let Some(object) = value.as_object() else {
        warn!("Batch price payload was not an object");
        return Vec::new();
    };

    object
        .iter()
        .filter_map(|(ticker, raw)| {
            match serde_json::from_value::<PriceSnapshot>(raw.clone()) {
                Ok(snapshot) => Some((ticker.to_uppercase(), snapshot)),
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Skipping undecodable batch price entry");
                    None
                }
            }
        })
        .collect()
}

/// Verifies historical-series invariants: dates non-decreasing and
/// inside the requested range, OHLC consistency, per bar.
fn validate_historical_bars(
    bars: &[HistoricalBar],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<(), MarketDataError> {
    let mut previous: Option<NaiveDate> = None;

    for bar in bars {
        if bar.date < start_date || bar.date > end_date {
            return Err(MarketDataError::InvalidData(format!(
                "bar date {} outside requested range {}..{}",
                bar.date, start_date, end_date
            )));
        }

        if let Some(prev) = previous {
            if bar.date < prev {
                return Err(MarketDataError::InvalidData(format!(
                    "bar dates decrease at {}",
                    bar.date
                )));
            }
        }
        previous = Some(bar.date);

        if bar.high < bar.low {
            return Err(MarketDataError::InvalidData(format!(
                "bar {}: high {} below low {}",
                bar.date, bar.high, bar.low
            )));
        }
        if bar.open < bar.low || bar.open > bar.high {
            return Err(MarketDataError::InvalidData(format!(
                "bar {}: open {} outside low/high",
                bar.date, bar.open
            )));
        }
        if bar.close < bar.low || bar.close > bar.high {
            return Err(MarketDataError::InvalidData(format!(
                "bar {}: close {} outside low/high",
                bar.date, bar.close
            )));
        }
    }

    Ok(())
}
