// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Keyword-based sentiment analysis for financial headlines.
//!
//! Scores text by counting bullish and bearish vocabulary. Scores are
//! on a -1 to 1 scale; confidence grows with the number of keyword
//! hits.

use crate::models::{NewsArticle, SentimentLabel, SentimentScore, StockSentiment};

/// Vocabulary signalling positive price action.
const POSITIVE_KEYWORDS: &[&str] = &[
    "gain", "gains", "up", "rise", "rises", "rising", "surge", "surges", "rally", "rallies",
    "bullish", "growth", "profit", "profits", "beat", "beats", "exceed", "exceeds", "strong",
    "positive", "upgrade", "upgrades", "outperform", "buy", "success", "successful", "high",
    "higher", "record", "best", "improve", "improves", "improvement",
];

/// Vocabulary signalling negative price action.
const NEGATIVE_KEYWORDS: &[&str] = &[
    "loss", "losses", "down", "fall", "falls", "falling", "drop", "drops", "decline", "declines",
    "bearish", "weak", "weakness", "miss", "misses", "downgrade", "downgrades", "underperform",
    "sell", "concern", "concerns", "low", "lower", "worst", "poor", "risk", "risks", "cut",
    "cuts", "layoff", "layoffs", "lawsuit", "investigation",
];

/// Label thresholds on the -1..1 score scale.
const POSITIVE_THRESHOLD: f64 = 0.1;
const NEGATIVE_THRESHOLD: f64 = -0.1;

/// Keyword sentiment analyzer.
#[derive(Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Scores a single text.
    pub fn analyze(&self, text: &str) -> SentimentScore {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let positive = words
            .iter()
            .filter(|w| POSITIVE_KEYWORDS.contains(*w))
            .count();
        let negative = words
            .iter()
            .filter(|w| NEGATIVE_KEYWORDS.contains(*w))
            .count();
        let total = positive + negative;

        if total == 0 {
            return SentimentScore {
                label: SentimentLabel::Neutral,
                score: 0.0,
                confidence: 0.2,
            };
        }

        let score = (positive as f64 - negative as f64) / total as f64;
        let label = if score > POSITIVE_THRESHOLD {
            SentimentLabel::Positive
        } else if score < NEGATIVE_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };

        SentimentScore {
            label,
            score,
            confidence: (total as f64 / 10.0).min(1.0),
        }
    }

    /// Scores one article using its headline and summary.
    pub fn analyze_article(&self, article: &NewsArticle) -> SentimentScore {
        let mut text = article.headline.clone();
        if let Some(summary) = &article.summary {
            text.push(' ');
            text.push_str(summary);
        }
        self.analyze(&text)
    }

    /// Aggregates article sentiment into a per-ticker view.
    ///
    /// The overall score is the mean of the per-article scores; the
    /// label is derived from it with the same thresholds.
    pub fn stock_sentiment(&self, ticker: &str, articles: &[NewsArticle]) -> StockSentiment {
        if articles.is_empty() {
            return StockSentiment {
                ticker: ticker.to_uppercase(),
                overall_sentiment: SentimentScore {
                    label: SentimentLabel::Neutral,
                    score: 0.0,
                    confidence: 0.0,
                },
                article_count: 0,
            };
        }

        let scores: Vec<SentimentScore> =
            articles.iter().map(|a| self.analyze_article(a)).collect();
        let mean_score = scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64;
        let mean_confidence =
            scores.iter().map(|s| s.confidence).sum::<f64>() / scores.len() as f64;

        let label = if mean_score > POSITIVE_THRESHOLD {
            SentimentLabel::Positive
        } else if mean_score < NEGATIVE_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };

        StockSentiment {
            ticker: ticker.to_uppercase(),
            overall_sentiment: SentimentScore {
                label,
                score: mean_score,
                confidence: mean_confidence,
            },
            article_count: articles.len(),
        }
    }
}
