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

//! Rebalancing agent.
//!
//! Values the portfolio at current prices, compares the resulting
//! allocation against the target (equal weighting when no target is
//! supplied), and emits buy/sell suggestions for positions drifting
//! more than the rebalance band.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::agents::core::Agent;
use crate::alerts::NotificationService;
use crate::models::{
    kinds, AgentReport, NotificationCreate, PortfolioComposition, RebalanceAction,
    RebalancingReport, RebalancingSuggestion, StockPosition, WorkflowState,
};
use crate::portfolio::PortfolioService;
use crate::stocks::MarketDataProvider;

/// Registry name of this agent.
pub const NAME: &str = "rebalancing";

/// Allocation drift (percentage points) below which no suggestion is
/// made.
const REBALANCE_BAND_PCT: f64 = 5.0;

/// Analyzes portfolio composition and suggests rebalancing trades.
pub struct RebalancingAgent {
    portfolio: Arc<PortfolioService>,
    provider: Arc<dyn MarketDataProvider>,
    notifications: Arc<NotificationService>,
}

impl RebalancingAgent {
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

    /// Values positions at current prices. Unpriced positions count as
    /// zero value.
    async fn analyze_composition(
        &self,
        positions: &[StockPosition],
    ) -> Result<PortfolioComposition, String> {
        let tickers: Vec<String> = positions.iter().map(|p| p.ticker.clone()).collect();
        let prices = self
            .provider
            .get_batch_prices(&tickers)
            .await
            .map_err(|e| e.to_string())?;

        let mut total_value = 0.0;
        let mut position_values = HashMap::new();

        for position in positions {
            let price = prices.get(&position.ticker).map(|s| s.price).unwrap_or(0.0);
            let value = price * position.quantity;
            position_values.insert(position.ticker.clone(), value);
            total_value += value;
        }

        let allocations = position_values
            .iter()
            .map(|(ticker, value)| {
                let pct = if total_value > 0.0 {
                    value / total_value * 100.0
                } else {
                    0.0
                };
                (ticker.clone(), pct)
            })
            .collect();

        Ok(PortfolioComposition {
            total_value,
            position_values,
            allocations,
            position_count: positions.len(),
        })
    }
}

#[async_trait]
impl Agent for RebalancingAgent {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(name = "agent_rebalancing", skip_all)]
    async fn run(&self, mut state: WorkflowState) -> WorkflowState {
        state.current_node = NAME.to_string();

        let Some(user_id) = state.user_id().map(|id| id.to_string()) else {
            state
                .errors
                .push("Rebalancing agent error: user_id not provided in context".to_string());
            return state;
        };

        let target_allocations: HashMap<String, f64> = state
            .context
            .get("target_allocations")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();

        let positions = match self.portfolio.list_positions(&user_id).await {
            Ok(positions) => positions,
            Err(e) => {
                state.errors.push(format!("Rebalancing agent error: {}", e));
                return state;
            }
        };

        if positions.is_empty() {
            state.results.insert(
                NAME.to_string(),
                AgentReport::Rebalancing(RebalancingReport {
                    composition: None,
                    suggestions: Vec::new(),
                    suggestion_count: 0,
                    message: Some("No portfolio positions to analyze".to_string()),
                }),
            );
            return state;
        }

        let composition = match self.analyze_composition(&positions).await {
            Ok(composition) => composition,
            Err(e) => {
                state.errors.push(format!("Rebalancing agent error: {}", e));
                return state;
            }
        };

        let suggestions = generate_suggestions(&composition, target_allocations);

        if !suggestions.is_empty() {
            let notification = NotificationCreate {
                user_id: user_id.clone(),
                kind: kinds::REBALANCING_SUGGESTION.to_string(),
                title: "Portfolio Rebalancing Suggestions".to_string(),
                message: format!("Found {} rebalancing opportunities", suggestions.len()),
                data: serde_json::json!({
                    "suggestions": suggestions,
                    "composition": composition,
                    "analyzed_at": Utc::now(),
                }),
            };
            if let Err(e) = self.notifications.create(notification).await {
                warn!(user_id = %user_id, error = %e, "Failed to store rebalancing notification");
            }
        }

        state.results.insert(
            NAME.to_string(),
            AgentReport::Rebalancing(RebalancingReport {
                suggestion_count: suggestions.len(),
                composition: Some(composition),
                suggestions,
                message: None,
            }),
        );

        state
    }
}

/// Compares current allocations against targets; positions drifting
/// more than the band get a suggestion, sorted by drift magnitude.
fn generate_suggestions(
    composition: &PortfolioComposition,
    mut target_allocations: HashMap<String, f64>,
) -> Vec<RebalancingSuggestion> {
    // No targets means equal weighting across current positions
    if target_allocations.is_empty() && composition.position_count > 0 {
        let equal = 100.0 / composition.position_count as f64;
        target_allocations = composition
            .allocations
            .keys()
            .map(|ticker| (ticker.clone(), equal))
            .collect();
    }

    let mut suggestions = Vec::new();

    for (ticker, target_pct) in &target_allocations {
        let current_pct = composition.allocations.get(ticker).copied().unwrap_or(0.0);
        let difference = target_pct - current_pct;

        if difference.abs() <= REBALANCE_BAND_PCT {
            continue;
        }

        let target_value = target_pct / 100.0 * composition.total_value;
        let current_value = composition.position_values.get(ticker).copied().unwrap_or(0.0);
        let amount_difference = target_value - current_value;

        let (action, direction) = if amount_difference > 0.0 {
            (RebalanceAction::Buy, "Underweight")
        } else {
            (RebalanceAction::Sell, "Overweight")
        };

        suggestions.push(RebalancingSuggestion {
            ticker: ticker.clone(),
            action,
            reason: format!(
                "{} by {:.1}% (current: {:.1}%, target: {:.1}%)",
                direction,
                difference.abs(),
                current_pct,
                target_pct
            ),
            current_allocation: (current_pct * 100.0).round() / 100.0,
            target_allocation: (target_pct * 100.0).round() / 100.0,
            suggested_amount: (amount_difference.abs() * 100.0).round() / 100.0,
        });
    }

    suggestions.sort_by(|a, b| {
        let drift_a = (a.current_allocation - a.target_allocation).abs();
        let drift_b = (b.current_allocation - b.target_allocation).abs();
        drift_b.partial_cmp(&drift_a).unwrap_or(std::cmp::Ordering::Equal)
    });

    suggestions
}
