// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Market data services.
//!
//! Everything that touches a tool server goes through the same stack:
//! cache lookup first, then the dependency's circuit breaker, then the
//! retry executor, then the tool client. [`MarketDataProvider`] is the
//! seam agents depend on, so tests can substitute fixed data.

pub mod news;
pub mod sentiment;
pub mod service;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::mcp::ToolError;
use crate::models::{NewsArticle, PriceSnapshot, StockSentiment};
use crate::resilience::circuit_breaker::CircuitError;
use crate::resilience::retry::RetryError;
use crate::security::ValidationError;

pub use news::NewsService;
pub use sentiment::SentimentAnalyzer;
pub use service::StockDataService;

/// Market-data errors.
#[derive(Debug, Error)]
pub enum MarketDataError {
    /// Input validation failed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The dependency's circuit is open; no upstream call was made
    #[error("Circuit breaker '{name}' is open: retry in {retry_after_secs}s")]
    CircuitOpen {
        name: String,
        retry_after_secs: u64,
    },

    /// Retries were exhausted against the tool server
    #[error("Upstream call failed after {attempts} attempts: {message}")]
    Exhausted { attempts: u32, message: String },

    /// A non-retryable tool error
    #[error(transparent)]
    Tool(ToolError),

    /// The upstream payload failed validation or decoding
    #[error("Invalid upstream payload: {0}")]
    InvalidData(String),
}

impl MarketDataError {
    /// True when backing off and retrying may help.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            MarketDataError::CircuitOpen { .. } | MarketDataError::Exhausted { .. }
        )
    }
}

impl From<CircuitError<RetryError<ToolError>>> for MarketDataError {
    fn from(err: CircuitError<RetryError<ToolError>>) -> Self {
        match err {
            CircuitError::Open { name, retry_after } => MarketDataError::CircuitOpen {
                name,
                retry_after_secs: retry_after.as_secs(),
            },
            CircuitError::Inner(RetryError::Exhausted {
                attempts,
                last_error,
            }) => MarketDataError::Exhausted {
                attempts,
                message: last_error.to_string(),
            },
            CircuitError::Inner(RetryError::Fatal(tool_err)) => MarketDataError::Tool(tool_err),
        }
    }
}

/// The market-data surface agents consume.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Current price snapshot for one ticker.
    async fn get_price(&self, ticker: &str) -> Result<PriceSnapshot, MarketDataError>;

    /// Batch price snapshots; tickers that could not be priced are
    /// absent from the map.
    async fn get_batch_prices(
        &self,
        tickers: &[String],
    ) -> Result<HashMap<String, PriceSnapshot>, MarketDataError>;

    /// Recent deduplicated news for one ticker.
    async fn get_stock_news(
        &self,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<NewsArticle>, MarketDataError>;

    /// Aggregated sentiment over recent news.
    async fn get_stock_sentiment(&self, ticker: &str) -> Result<StockSentiment, MarketDataError>;
}

/// Production [`MarketDataProvider`] combining the price and news
/// services.
pub struct MarketData {
    pub stocks: std::sync::Arc<StockDataService>,
    pub news: std::sync::Arc<NewsService>,
}

#[async_trait]
impl MarketDataProvider for MarketData {
    async fn get_price(&self, ticker: &str) -> Result<PriceSnapshot, MarketDataError> {
        self.stocks.get_price(ticker).await
    }

    async fn get_batch_prices(
        &self,
        tickers: &[String],
    ) -> Result<HashMap<String, PriceSnapshot>, MarketDataError> {
        self.stocks.get_batch_prices(tickers).await
    }

    async fn get_stock_news(
        &self,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<NewsArticle>, MarketDataError> {
        self.news.get_stock_news(ticker, limit).await
    }

    async fn get_stock_sentiment(&self, ticker: &str) -> Result<StockSentiment, MarketDataError> {
        self.news.get_stock_sentiment(ticker, 10).await
    }
}
