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

//! Market-data cache.
//!
//! A thin typed layer over the TTL key-value store. Keys are semantic
//! (`stock:price:{T}`, `stock:news:{T}`, `market:news`,
//! `stock:historical:{T}:{from}:{to}`) with a TTL per key family.
//!
//! Cache trouble must never fail the calling operation: every error is
//! logged and surfaced as a miss, and writes are fire-and-forget from
//! the caller's perspective.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::kv::KeyValueStore;
use crate::models::NewsArticle;

/// Price snapshots go stale quickly.
pub const PRICE_TTL: Duration = Duration::from_secs(60);
/// News articles: 15 minutes.
pub const NEWS_TTL: Duration = Duration::from_secs(900);
/// Historical series: 1 hour.
pub const HISTORICAL_TTL: Duration = Duration::from_secs(3600);
/// Market overview: 5 minutes.
pub const OVERVIEW_TTL: Duration = Duration::from_secs(300);

/// Semantic cache key builders.
pub mod keys {
    /// `stock:price:{TICKER}`
    pub fn stock_price(ticker: &str) -> String {
        format!("stock:price:{}", ticker.to_uppercase())
    }

    /// `stock:news:{TICKER}`
    pub fn stock_news(ticker: &str) -> String {
        format!("stock:news:{}", ticker.to_uppercase())
    }

    /// `market:news`
    pub fn market_news() -> String {
        "market:news".to_string()
    }

    /// `stock:historical:{TICKER}:{from}:{to}`
    pub fn stock_historical(ticker: &str, from: &str, to: &str) -> String {
        format!("stock:historical:{}:{}:{}", ticker.to_uppercase(), from, to)
    }

    /// `market:overview`
    pub fn market_overview() -> String {
        "market:overview".to_string()
    }
}

/// Typed TTL cache over the shared key-value store.
pub struct MarketCache {
    store: Arc<dyn KeyValueStore>,
}

impl MarketCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Fetches and decodes a cached value.
    ///
    /// Absent keys, expired keys, store errors, and decode failures all
    /// come back as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache decode failed, treating as miss");
                None
            }
        }
    }

    /// Encodes and stores a value with the given TTL, overwriting any
    /// existing entry. Failures are logged and swallowed.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache encode failed, skipping write");
                return;
            }
        };

        if let Err(e) = self.store.set_ex(key, &raw, ttl).await {
            warn!(key = %key, error = %e, "Cache write failed");
        } else {
            debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached value");
        }
    }

    /// Removes one key.
    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key = %key, error = %e, "Cache invalidation failed");
        } else {
            debug!(key = %key, "Cache entry invalidated");
        }
    }

    /// Removes every key under a prefix (e.g. `stock:price:`).
    pub async fn invalidate_prefix(&self, prefix: &str) {
        match self.store.delete_prefix(prefix).await {
            Ok(removed) => debug!(prefix = %prefix, removed = removed, "Cache prefix invalidated"),
            Err(e) => warn!(prefix = %prefix, error = %e, "Cache prefix invalidation failed"),
        }
    }

    /// Fetches several keys in a single store round trip.
    ///
    /// The result map contains only the keys that were present and
    /// decodable.
    pub async fn batch_get<T: DeserializeOwned>(&self, keys: &[String]) -> HashMap<String, T> {
        let mut results = HashMap::new();

        let values = match self.store.mget(keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "Cache batch read failed, treating all as misses");
                return results;
            }
        };

        for (key, raw) in keys.iter().zip(values) {
            if let Some(raw) = raw {
                match serde_json::from_str(&raw) {
                    Ok(value) => {
                        results.insert(key.clone(), value);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Cache decode failed in batch, skipping");
                    }
                }
            }
        }

        results
    }
}

/// Removes duplicate articles by case-insensitive normalized headline.
///
/// The first occurrence wins; later articles with the same normalized
/// headline are dropped regardless of source. Deduping an
/// already-deduped list is a no-op.
pub fn deduplicate_articles(articles: Vec<NewsArticle>) -> Vec<NewsArticle> {
    let mut seen = std::collections::HashSet::new();
    let total = articles.len();

    let deduplicated: Vec<NewsArticle> = articles
        .into_iter()
        .filter(|article| {
            let normalized = article.headline.trim().to_lowercase();
            if seen.insert(normalized) {
                true
            } else {
                debug!(headline = %article.headline, "Duplicate article filtered");
                false
            }
        })
        .collect();

    if deduplicated.len() < total {
        debug!(
            before = total,
            after = deduplicated.len(),
            "Deduplicated articles"
        );
    }

    deduplicated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::models::PriceSnapshot;
    use chrono::Utc;

    fn cache() -> MarketCache {
        MarketCache::new(Arc::new(MemoryStore::new()))
    }

    fn snapshot(ticker: &str, price: f64) -> PriceSnapshot {
        PriceSnapshot {
            ticker: ticker.to_string(),
            price,
            change: 0.0,
            change_percent: 0.0,
            volume: 0,
            timestamp: Utc::now(),
        }
    }

    fn article(headline: &str) -> NewsArticle {
        NewsArticle {
            headline: headline.to_string(),
            source: "wire".to_string(),
            url: None,
            published_at: Utc::now(),
            summary: None,
        }
    }

    #[test]
    fn test_key_builders() {
        assert_eq!(keys::stock_price("aapl"), "stock:price:AAPL");
        assert_eq!(keys::stock_news("Msft"), "stock:news:MSFT");
        assert_eq!(keys::market_news(), "market:news");
        assert_eq!(
            keys::stock_historical("googl", "2024-01-01", "2024-02-01"),
            "stock:historical:GOOGL:2024-01-01:2024-02-01"
        );
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = cache();
        let key = keys::stock_price("AAPL");
        cache.set(&key, &snapshot("AAPL", 150.0), PRICE_TTL).await;

        let cached: Option<PriceSnapshot> = cache.get(&key).await;
        assert_eq!(cached.unwrap().price, 150.0);
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let cache = cache();
        let key = keys::stock_price("AAPL");
        cache
            .set(&key, &snapshot("AAPL", 150.0), Duration::from_millis(20))
            .await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        let cached: Option<PriceSnapshot> = cache.get(&key).await;
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_decode_failure_is_miss() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_ex("stock:price:AAPL", "not json", Duration::from_secs(60))
            .await
            .unwrap();

        let cache = MarketCache::new(store);
        let cached: Option<PriceSnapshot> = cache.get("stock:price:AAPL").await;
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = cache();
        let key = keys::stock_price("AAPL");
        cache.set(&key, &snapshot("AAPL", 150.0), PRICE_TTL).await;
        cache.invalidate(&key).await;

        let cached: Option<PriceSnapshot> = cache.get(&key).await;
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_prefix() {
        let cache = cache();
        for ticker in ["AAPL", "MSFT"] {
            cache
                .set(&keys::stock_price(ticker), &snapshot(ticker, 1.0), PRICE_TTL)
                .await;
        }
        cache
            .set(&keys::market_news(), &Vec::<NewsArticle>::new(), NEWS_TTL)
            .await;

        cache.invalidate_prefix("stock:price:").await;

        let aapl: Option<PriceSnapshot> = cache.get(&keys::stock_price("AAPL")).await;
        let msft: Option<PriceSnapshot> = cache.get(&keys::stock_price("MSFT")).await;
        let news: Option<Vec<NewsArticle>> = cache.get(&keys::market_news()).await;
        assert!(aapl.is_none());
        assert!(msft.is_none());
        assert!(news.is_some());
    }

    #[tokio::test]
    async fn test_batch_get_partial() {
        let cache = cache();
        cache
            .set(&keys::stock_price("AAPL"), &snapshot("AAPL", 150.0), PRICE_TTL)
            .await;
        cache
            .set(&keys::stock_price("MSFT"), &snapshot("MSFT", 410.0), PRICE_TTL)
            .await;

        let lookup = vec![
            keys::stock_price("AAPL"),
            keys::stock_price("MSFT"),
            keys::stock_price("GOOGL"),
        ];
        let found: HashMap<String, PriceSnapshot> = cache.batch_get(&lookup).await;

        assert_eq!(found.len(), 2);
        assert!(found.contains_key("stock:price:AAPL"));
        assert!(!found.contains_key("stock:price:GOOGL"));
    }

    #[test]
    fn test_dedup_case_insensitive() {
        let articles = vec![
            article("Apple beats earnings"),
            article("APPLE BEATS EARNINGS"),
            article("  apple beats earnings  "),
            article("Microsoft launches product"),
        ];

        let deduped = deduplicate_articles(articles);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].headline, "Apple beats earnings");
        assert_eq!(deduped[1].headline, "Microsoft launches product");
    }

    #[test]
    fn test_dedup_idempotent() {
        let articles = vec![
            article("Headline one"),
            article("Headline one"),
            article("Headline two"),
        ];

        let once = deduplicate_articles(articles);
        let twice = deduplicate_articles(once.clone());

        assert_eq!(once.len(), twice.len());
        let headlines_once: Vec<_> = once.iter().map(|a| &a.headline).collect();
        let headlines_twice: Vec<_> = twice.iter().map(|a| &a.headline).collect();
        assert_eq!(headlines_once, headlines_twice);
    }
}
