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

//! News service.
//!
//! Stock and market news from the news tool server, with caching,
//! headline deduplication and keyword sentiment. Twice the requested
//! limit is fetched upstream so the post-dedup list can still fill the
//! requested count.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::cache::{deduplicate_articles, keys, MarketCache, NEWS_TTL};
use crate::mcp::{ToolClient, ToolError};
use crate::models::{NewsArticle, StockSentiment};
use crate::resilience::retry::{retry, RetryConfig};
use crate::resilience::BreakerRegistry;
use crate::security::Validator;
use crate::stocks::{MarketDataError, SentimentAnalyzer};

/// Breaker name guarding the news tool server.
pub const NEWS_BREAKER: &str = "news";

/// News retrieval with caching and deduplication.
pub struct NewsService {
    client: Arc<ToolClient>,
    cache: Arc<MarketCache>,
    breakers: Arc<BreakerRegistry>,
    analyzer: SentimentAnalyzer,
    retry_config: RetryConfig,
}

impl NewsService {
    pub fn new(
        client: Arc<ToolClient>,
        cache: Arc<MarketCache>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self {
            client,
            cache,
            breakers,
            analyzer: SentimentAnalyzer::new(),
            retry_config: RetryConfig::mcp(),
        }
    }

    /// Recent news for one ticker, deduplicated, newest first as
    /// returned by the server.
    #[instrument(name = "news_get_stock", skip(self))]
    pub async fn get_stock_news(
        &self,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<NewsArticle>, MarketDataError> {
        let ticker = Validator::validate_ticker(ticker)?;
        let cache_key = keys::stock_news(&ticker);

        if let Some(articles) = self.cache.get::<Vec<NewsArticle>>(&cache_key).await {
            return Ok(truncate(articles, limit));
        }

        let value = self
            .guarded_call(
                "get_stock_news",
                serde_json::json!({ "ticker": ticker, "limit": limit * 2 }),
            )
            .await?;

        let articles: Vec<NewsArticle> = serde_json::from_value(value)
            .map_err(|e| MarketDataError::InvalidData(format!("news payload: {}", e)))?;

        let deduplicated = truncate(deduplicate_articles(articles), limit);
        self.cache.set(&cache_key, &deduplicated, NEWS_TTL).await;

        Ok(deduplicated)
    }

    /// General market news, deduplicated.
    #[instrument(name = "news_get_market", skip(self))]
    pub async fn get_market_news(&self, limit: usize) -> Result<Vec<NewsArticle>, MarketDataError> {
        let cache_key = keys::market_news();

        if let Some(articles) = self.cache.get::<Vec<NewsArticle>>(&cache_key).await {
            return Ok(truncate(articles, limit));
        }

        let value = self
            .guarded_call("get_market_news", serde_json::json!({ "limit": limit * 2 }))
            .await?;

        let articles: Vec<NewsArticle> = serde_json::from_value(value)
            .map_err(|e| MarketDataError::InvalidData(format!("news payload: {}", e)))?;

        let deduplicated = truncate(deduplicate_articles(articles), limit);
        self.cache.set(&cache_key, &deduplicated, NEWS_TTL).await;

        Ok(deduplicated)
    }

    /// News for several tickers with per-ticker failure isolation: a
    /// ticker whose fetch fails maps to an empty list.
    #[instrument(name = "news_get_batch", skip_all, fields(count = tickers.len()))]
    pub async fn get_batch_stock_news(
        &self,
        tickers: &[String],
    ) -> HashMap<String, Vec<NewsArticle>> {
        let mut results = HashMap::new();

        for ticker in tickers {
            let upper = ticker.to_uppercase();
            match self.get_stock_news(ticker, 10).await {
                Ok(articles) => {
                    results.insert(upper, articles);
                }
                Err(e) => {
                    warn!(ticker = %upper, error = %e, "News fetch failed, returning empty list");
                    results.insert(upper, Vec::new());
                }
            }
        }

        results
    }

    /// Aggregated keyword sentiment over recent news.
    #[instrument(name = "news_get_sentiment", skip(self))]
    pub async fn get_stock_sentiment(
        &self,
        ticker: &str,
        limit: usize,
    ) -> Result<StockSentiment, MarketDataError> {
        let articles = self.get_stock_news(ticker, limit).await?;
        Ok(self.analyzer.stock_sentiment(ticker, &articles))
    }

    /// Drops the cached news for one ticker.
    pub async fn invalidate_stock_news_cache(&self, ticker: &str) {
        if let Ok(ticker) = Validator::validate_ticker(ticker) {
            self.cache.invalidate(&keys::stock_news(&ticker)).await;
            info!(ticker = %ticker, "Invalidated news cache");
        }
    }

    /// Drops the cached market news.
    pub async fn invalidate_market_news_cache(&self) {
        self.cache.invalidate(&keys::market_news()).await;
        info!("Invalidated market news cache");
    }

    async fn guarded_call(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, MarketDataError> {
        let breaker = self.breakers.get(NEWS_BREAKER).await;
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

fn truncate(mut articles: Vec<NewsArticle>, limit: usize) -> Vec<NewsArticle> {
    articles.truncate(limit);
    articles
}
