// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Market data models.
//!
//! These mirror the payloads returned by the stock-data and news tool
//! servers. Field names follow the tool-server wire format
//! (`changePercent` is the one camelCase holdout).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time price snapshot for one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub ticker: String,
    pub price: f64,
    pub change: f64,
    #[serde(rename = "changePercent")]
    pub change_percent: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

/// News article as returned by the news tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub headline: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// One bar of historical OHLCV data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Sentiment classification of an article or a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "positive"),
            SentimentLabel::Negative => write!(f, "negative"),
            SentimentLabel::Neutral => write!(f, "neutral"),
        }
    }
}

/// Scored sentiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: SentimentLabel,
    /// -1.0 to 1.0 scale
    pub score: f64,
    /// 0.0 to 1.0 scale
    pub confidence: f64,
}

/// Aggregated sentiment for a ticker over recent articles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSentiment {
    pub ticker: String,
    pub overall_sentiment: SentimentScore,
    pub article_count: usize,
}
