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

//! Research agent.
//!
//! For each ticker held in the user's portfolio: fetch recent news,
//! score sentiment, compose a digest, and store the result as a
//! `research_update` notification. Tickers are researched in parallel
//! and a failing ticker never sinks the rest.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::agents::core::Agent;
use crate::alerts::NotificationService;
use crate::models::{
    kinds, AgentReport, NewsArticle, NotificationCreate, ResearchReport, SentimentLabel,
    TickerResearch, WorkflowState,
};
use crate::portfolio::PortfolioService;
use crate::stocks::MarketDataProvider;

/// Registry name of this agent.
pub const NAME: &str = "research";

/// Articles fetched per ticker.
const NEWS_LIMIT: usize = 10;
/// Headlines quoted in the digest.
const DIGEST_HEADLINES: usize = 3;

/// Gathers news, sentiment, and digests for portfolio tickers.
pub struct ResearchAgent {
    portfolio: Arc<PortfolioService>,
    provider: Arc<dyn MarketDataProvider>,
    notifications: Arc<NotificationService>,
}

impl ResearchAgent {
    pub fn new(
        portfolio: Arc<PortfolioService>,
        provider: Arc<dyn MarketDataProvider>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            portfolio,
            provider,
            notifications,
        }
    }

    /// Researches one ticker. Failures come back as `None` and are
    /// logged; the parallel sweep filters them out.
    async fn research_ticker(&self, ticker: String, user_id: String) -> Option<TickerResearch> {
        let articles = match self.provider.get_stock_news(&ticker, NEWS_LIMIT).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "News fetch failed during research");
                return None;
            }
        };

        if articles.is_empty() {
            return Some(TickerResearch {
                ticker,
                summary: "No recent news available".to_string(),
                news_count: 0,
                sentiment: SentimentLabel::Neutral,
                sentiment_score: 0.0,
            });
        }

        let sentiment = match self.provider.get_stock_sentiment(&ticker).await {
            Ok(sentiment) => sentiment,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Sentiment fetch failed during research");
                return None;
            }
        };

        let summary = compose_digest(
            &ticker,
            sentiment.overall_sentiment.label,
            articles.len(),
            &articles,
        );

        let research = TickerResearch {
            ticker: ticker.clone(),
            summary: summary.clone(),
            news_count: articles.len(),
            sentiment: sentiment.overall_sentiment.label,
            sentiment_score: sentiment.overall_sentiment.score,
        };

        let preview = if summary.chars().count() > 200 {
            let head: String = summary.chars().take(200).collect();
            format!("{}...", head)
        } else {
            summary.clone()
        };

        let notification = NotificationCreate {
            user_id,
            kind: kinds::RESEARCH_UPDATE.to_string(),
            title: format!("Research Update: {}", ticker),
            message: preview,
            data: serde_json::json!({
                "ticker": ticker,
                "full_summary": summary,
                "news_count": research.news_count,
                "sentiment": research.sentiment,
                "sentiment_score": research.sentiment_score,
                "researched_at": Utc::now(),
            }),
        };

        if let Err(e) = self.notifications.create(notification).await {
            warn!(ticker = %ticker, error = %e, "Failed to store research notification");
        }

        Some(research)
    }
}

#[async_trait]
impl Agent for ResearchAgent {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(name = "agent_research", skip_all)]
    async fn run(&self, mut state: WorkflowState) -> WorkflowState {
        state.current_node = NAME.to_string();

        let Some(user_id) = state.user_id().map(|id| id.to_string()) else {
            state
                .errors
                .push("Research agent error: user_id not provided in context".to_string());
            return state;
        };

        let tickers = match self.portfolio.held_tickers(&user_id).await {
            Ok(tickers) => tickers,
            Err(e) => {
                state.errors.push(format!("Research agent error: {}", e));
                return state;
            }
        };

        if tickers.is_empty() {
            state.results.insert(
                NAME.to_string(),
                AgentReport::Research(ResearchReport {
                    tickers_researched: 0,
                    tickers: Vec::new(),
                    summaries: Vec::new(),
                    message: Some("No portfolio positions to research".to_string()),
                }),
            );
            return state;
        }

        let sweeps = tickers
            .iter()
            .map(|ticker| self.research_ticker(ticker.clone(), user_id.clone()));
        let summaries: Vec<TickerResearch> =
            join_all(sweeps).await.into_iter().flatten().collect();

        state.results.insert(
            NAME.to_string(),
            AgentReport::Research(ResearchReport {
                tickers_researched: tickers.len(),
                tickers,
                summaries,
                message: None,
            }),
        );

        state
    }
}

/// Composes a deterministic digest from sentiment and top headlines.
fn compose_digest(
    ticker: &str,
    sentiment: SentimentLabel,
    article_count: usize,
    articles: &[NewsArticle],
) -> String {
    let headlines: Vec<&str> = articles
        .iter()
        .take(DIGEST_HEADLINES)
        .map(|a| a.headline.as_str())
        .collect();

    format!(
        "{} coverage is {} across {} recent articles. Top headlines: {}",
        ticker,
        sentiment,
        article_count,
        headlines.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DBClient;
    use crate::models::{PriceSnapshot, StockPositionCreate, StockSentiment};
    use crate::realtime::hub::Hub;
    use crate::stocks::{MarketDataError, SentimentAnalyzer};
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct FixedNews {
        articles: Vec<NewsArticle>,
    }

    #[async_trait]
    impl MarketDataProvider for FixedNews {
        async fn get_price(&self, _ticker: &str) -> Result<PriceSnapshot, MarketDataError> {
            Err(MarketDataError::InvalidData("not used".to_string()))
        }

        async fn get_batch_prices(
            &self,
            _tickers: &[String],
        ) -> Result<HashMap<String, PriceSnapshot>, MarketDataError> {
            Ok(HashMap::new())
        }

        async fn get_stock_news(
            &self,
            _ticker: &str,
            _limit: usize,
        ) -> Result<Vec<NewsArticle>, MarketDataError> {
            Ok(self.articles.clone())
        }

        async fn get_stock_sentiment(
            &self,
            ticker: &str,
        ) -> Result<StockSentiment, MarketDataError> {
            Ok(SentimentAnalyzer::new().stock_sentiment(ticker, &self.articles))
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

    async fn setup(
        articles: Vec<NewsArticle>,
    ) -> (ResearchAgent, Arc<PortfolioService>, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let db = Arc::new(
            DBClient::new(temp_dir.path().join("research_db").to_str().unwrap())
                .await
                .unwrap(),
        );
        db.initialize_schema().await.unwrap();

        let hub = Arc::new(Hub::new());
        let notifications = Arc::new(NotificationService::new(db.clone(), hub));
        let portfolio = Arc::new(PortfolioService::new(db));
        let provider = Arc::new(FixedNews { articles });

        (
            ResearchAgent::new(portfolio.clone(), provider, notifications),
            portfolio,
            temp_dir,
        )
    }

    fn state_for(user_id: &str) -> WorkflowState {
        let mut context = HashMap::new();
        context.insert(
            "user_id".to_string(),
            serde_json::Value::String(user_id.to_string()),
        );
        WorkflowState::with_context(context)
    }

    #[tokio::test]
    async fn test_missing_user_id() {
        let (agent, _portfolio, _dir) = setup(vec![]).await;
        let state = agent.run(WorkflowState::default()).await;

        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].contains("user_id"));
        assert!(state.results.is_empty());
    }

    #[tokio::test]
    async fn test_empty_portfolio() {
        let (agent, _portfolio, _dir) = setup(vec![]).await;
        let state = agent.run(state_for("user-1")).await;

        assert!(state.errors.is_empty());
        match state.results.get(NAME).unwrap() {
            AgentReport::Research(report) => {
                assert_eq!(report.tickers_researched, 0);
                assert!(report.message.is_some());
            }
            other => panic!("Unexpected report: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_research_with_positions() {
        let articles = vec![
            article("Apple surges on strong profits"),
            article("Apple beats expectations"),
        ];
        let (agent, portfolio, _dir) = setup(articles).await;

        portfolio
            .add_position(
                "user-1",
                StockPositionCreate {
                    ticker: "AAPL".to_string(),
                    quantity: 10.0,
                    purchase_price: 150.0,
                    purchase_date: "2024-01-01".parse().unwrap(),
                },
            )
            .await
            .unwrap();

        let state = agent.run(state_for("user-1")).await;

        assert!(state.errors.is_empty());
        match state.results.get(NAME).unwrap() {
            AgentReport::Research(report) => {
                assert_eq!(report.tickers_researched, 1);
                assert_eq!(report.tickers, vec!["AAPL".to_string()]);
                assert_eq!(report.summaries.len(), 1);
                let summary = &report.summaries[0];
                assert_eq!(summary.news_count, 2);
                assert_eq!(summary.sentiment, SentimentLabel::Positive);
                assert!(summary.summary.contains("AAPL"));
            }
            other => panic!("Unexpected report: {:?}", other),
        }
    }

    #[test]
    fn test_compose_digest() {
        let articles = vec![
            article("Headline one"),
            article("Headline two"),
            article("Headline three"),
            article("Headline four"),
        ];
        let digest = compose_digest("AAPL", SentimentLabel::Positive, 4, &articles);

        assert!(digest.contains("AAPL"));
        assert!(digest.contains("positive"));
        assert!(digest.contains("Headline three"));
        // Only the top three are quoted
        assert!(!digest.contains("Headline four"));
    }
}
