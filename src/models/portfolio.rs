// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Portfolio and position models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Portfolio row. Each user owns at most one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One holding inside a portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockPosition {
    pub id: String,
    pub portfolio_id: String,
    pub ticker: String,
    pub quantity: f64,
    pub purchase_price: f64,
    pub purchase_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for adding a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockPositionCreate {
    pub ticker: String,
    pub quantity: f64,
    pub purchase_price: f64,
    pub purchase_date: NaiveDate,
}

/// Current-value breakdown of a portfolio at observed prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioComposition {
    pub total_value: f64,
    /// Market value per ticker
    pub position_values: HashMap<String, f64>,
    /// Percentage of total value per ticker
    pub allocations: HashMap<String, f64>,
    pub position_count: usize,
}

/// Suggested trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceAction {
    Buy,
    Sell,
}

impl std::fmt::Display for RebalanceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebalanceAction::Buy => write!(f, "buy"),
            RebalanceAction::Sell => write!(f, "sell"),
        }
    }
}

/// One rebalancing suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancingSuggestion {
    pub ticker: String,
    pub action: RebalanceAction,
    pub reason: String,
    pub current_allocation: f64,
    pub target_allocation: f64,
    pub suggested_amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebalance_action_serde() {
        assert_eq!(
            serde_json::to_string(&RebalanceAction::Buy).unwrap(),
            "\"buy\""
        );
        let parsed: RebalanceAction = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(parsed, RebalanceAction::Sell);
    }
}
