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

//! Price alert agent.
//!
//! Sweeps every active alert: alerts are grouped by ticker so each
//! ticker's price is fetched once, tickers are checked in parallel,
//! and satisfied alerts go through the one-shot trigger transition.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::agents::core::Agent;
use crate::alerts::service::{check_condition, AlertError, AlertService};
use crate::models::{
    AgentReport, PriceAlert, PriceAlertReport, TriggeredAlert, WorkflowState,
};
use crate::stocks::MarketDataProvider;

/// Registry name of this agent.
pub const NAME: &str = "price_alert";

/// Key this agent writes its report under.
pub const RESULT_KEY: &str = "price_alerts";

/// Outcome of a manual single-alert check.
#[derive(Debug)]
pub struct SingleAlertCheck {
    /// Whether this check performed the trigger transition
    pub triggered: bool,
    /// Trigger payload when it did
    pub details: Option<TriggeredAlert>,
    /// The price that was observed
    pub observed: f64,
}

/// Checks active price alerts and triggers notifications.
pub struct PriceAlertAgent {
    alerts: Arc<AlertService>,
    provider: Arc<dyn MarketDataProvider>,
}

impl PriceAlertAgent {
    pub fn new(alerts: Arc<AlertService>, provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { alerts, provider }
    }

    /// Checks one alert by id, on demand.
    pub async fn check_single_alert(&self, alert_id: &str) -> Result<SingleAlertCheck, AlertError> {
        let alert = self.alerts.get(alert_id).await?;

        if !alert.is_active {
            return Ok(SingleAlertCheck {
                triggered: false,
                details: None,
                observed: alert.target_price,
            });
        }

        let snapshot = self
            .provider
            .get_price(&alert.ticker)
            .await
            .map_err(|e| AlertError::Storage(e.to_string()))?;

        if check_condition(&alert, snapshot.price) {
            let details = self.alerts.trigger(&alert, snapshot.price).await?;
            Ok(SingleAlertCheck {
                triggered: details.is_some(),
                details,
                observed: snapshot.price,
            })
        } else {
            Ok(SingleAlertCheck {
                triggered: false,
                details: None,
                observed: snapshot.price,
            })
        }
    }

    /// Checks every alert of one ticker against its current price.
    /// A per-ticker failure is contained: the sweep continues.
    async fn check_ticker(&self, ticker: String, alerts: Vec<PriceAlert>) -> Vec<TriggeredAlert> {
        let snapshot = match self.provider.get_price(&ticker).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Price fetch failed during alert sweep");
                return Vec::new();
            }
        };

        let mut triggered = Vec::new();
        for alert in &alerts {
            if check_condition(alert, snapshot.price) {
                match self.alerts.trigger(alert, snapshot.price).await {
                    Ok(Some(details)) => triggered.push(details),
                    Ok(None) => {} // another observer won the transition
                    Err(e) => {
                        warn!(alert_id = %alert.id, error = %e, "Trigger transition failed");
                    }
                }
            }
        }
        triggered
    }
}

#[async_trait]
impl Agent for PriceAlertAgent {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(name = "agent_price_alert", skip_all)]
    async fn run(&self, mut state: WorkflowState) -> WorkflowState {
        state.current_node = NAME.to_string();

        let active = match self.alerts.get_active_alerts().await {
            Ok(active) => active,
            Err(e) => {
                state.errors.push(format!("Price alert agent error: {}", e));
                return state;
            }
        };

        if active.is_empty() {
            state.results.insert(
                RESULT_KEY.to_string(),
                AgentReport::PriceAlerts(PriceAlertReport {
                    checked: 0,
                    triggered: 0,
                    alerts: Vec::new(),
                    message: Some("No active alerts to check".to_string()),
                }),
            );
            return state;
        }

        let checked = active.len();

        // Group by ticker so each price is fetched once
        let mut by_ticker: HashMap<String, Vec<PriceAlert>> = HashMap::new();
        for alert in active {
            by_ticker.entry(alert.ticker.clone()).or_default().push(alert);
        }

        let sweeps = by_ticker
            .into_iter()
            .map(|(ticker, alerts)| self.check_ticker(ticker, alerts));
        let triggered: Vec<TriggeredAlert> =
            join_all(sweeps).await.into_iter().flatten().collect();

        state.results.insert(
            RESULT_KEY.to_string(),
            AgentReport::PriceAlerts(PriceAlertReport {
                checked,
                triggered: triggered.len(),
                alerts: triggered,
                message: None,
            }),
        );

        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::NotificationService;
    use crate::audit::AuditService;
    use crate::db::DBClient;
    use crate::models::{
        AlertCondition, NewsArticle, NotificationChannel, PriceAlertCreate, PriceSnapshot,
        StockSentiment,
    };
    use crate::realtime::hub::Hub;
    use crate::stocks::MarketDataError;
    use chrono::Utc;
    use tempfile::tempdir;

    struct FixedPrices {
        prices: HashMap<String, f64>,
    }

    #[async_trait]
    impl MarketDataProvider for FixedPrices {
        async fn get_price(&self, ticker: &str) -> Result<PriceSnapshot, MarketDataError> {
            match self.prices.get(ticker) {
                Some(price) => Ok(PriceSnapshot {
                    ticker: ticker.to_string(),
                    price: *price,
                    change: 0.0,
                    change_percent: 0.0,
                    volume: 0,
                    timestamp: Utc::now(),
                }),
                None => Err(MarketDataError::InvalidData(format!(
                    "no price for {}",
                    ticker
                ))),
            }
        }

        async fn get_batch_prices(
            &self,
            tickers: &[String],
        ) -> Result<HashMap<String, PriceSnapshot>, MarketDataError> {
            let mut result = HashMap::new();
            for ticker in tickers {
                if let Ok(snapshot) = self.get_price(ticker).await {
                    result.insert(ticker.clone(), snapshot);
                }
            }
            Ok(result)
        }

        async fn get_stock_news(
            &self,
            _ticker: &str,
            _limit: usize,
        ) -> Result<Vec<NewsArticle>, MarketDataError> {
            Ok(Vec::new())
        }

        async fn get_stock_sentiment(
            &self,
            ticker: &str,
        ) -> Result<StockSentiment, MarketDataError> {
            Ok(crate::stocks::SentimentAnalyzer::new().stock_sentiment(ticker, &[]))
        }
    }

    async fn setup(
        prices: &[(&str, f64)],
    ) -> (PriceAlertAgent, Arc<AlertService>, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let db = Arc::new(
            DBClient::new(temp_dir.path().join("agent_db").to_str().unwrap())
                .await
                .unwrap(),
        );
        db.initialize_schema().await.unwrap();

        let hub = Arc::new(Hub::new());
        let notifications = Arc::new(NotificationService::new(db.clone(), hub));
        let audit = Arc::new(AuditService::new(db.clone()));
        let alerts = Arc::new(AlertService::new(db, notifications, audit));

        let provider = Arc::new(FixedPrices {
            prices: prices.iter().map(|(t, p)| (t.to_string(), *p)).collect(),
        });

        (
            PriceAlertAgent::new(alerts.clone(), provider),
            alerts,
            temp_dir,
        )
    }

    fn input(ticker: &str, condition: AlertCondition, target: f64) -> PriceAlertCreate {
        PriceAlertCreate {
            ticker: ticker.to_string(),
            condition,
            target_price: target,
            notification_channels: vec![NotificationChannel::InApp],
        }
    }

    #[tokio::test]
    async fn test_no_active_alerts() {
        let (agent, _alerts, _dir) = setup(&[]).await;
        let state = agent.run(WorkflowState::default()).await;

        assert!(state.errors.is_empty());
        match state.results.get(RESULT_KEY).unwrap() {
            AgentReport::PriceAlerts(report) => {
                assert_eq!(report.checked, 0);
                assert!(report.message.is_some());
            }
            other => panic!("Unexpected report: {:?}", other),
        }
        assert_eq!(state.current_node, NAME);
    }

    #[tokio::test]
    async fn test_sweep_triggers_satisfied_alerts() {
        let (agent, alerts, _dir) = setup(&[("AAPL", 151.0), ("MSFT", 400.0)]).await;

        alerts
            .create("user-1", input("AAPL", AlertCondition::Above, 150.0))
            .await
            .unwrap();
        alerts
            .create("user-1", input("MSFT", AlertCondition::Above, 500.0))
            .await
            .unwrap();

        let state = agent.run(WorkflowState::default()).await;

        match state.results.get(RESULT_KEY).unwrap() {
            AgentReport::PriceAlerts(report) => {
                assert_eq!(report.checked, 2);
                assert_eq!(report.triggered, 1);
                assert_eq!(report.alerts[0].ticker, "AAPL");
            }
            other => panic!("Unexpected report: {:?}", other),
        }

        // Second sweep is a no-op for the fired alert
        let state = agent.run(WorkflowState::default()).await;
        match state.results.get(RESULT_KEY).unwrap() {
            AgentReport::PriceAlerts(report) => {
                assert_eq!(report.checked, 1);
                assert_eq!(report.triggered, 0);
            }
            other => panic!("Unexpected report: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_price_failure_does_not_fail_sweep() {
        // No price for MSFT; AAPL still processes
        let (agent, alerts, _dir) = setup(&[("AAPL", 151.0)]).await;

        alerts
            .create("user-1", input("AAPL", AlertCondition::Above, 150.0))
            .await
            .unwrap();
        alerts
            .create("user-1", input("MSFT", AlertCondition::Above, 100.0))
            .await
            .unwrap();

        let state = agent.run(WorkflowState::default()).await;
        assert!(state.errors.is_empty());

        match state.results.get(RESULT_KEY).unwrap() {
            AgentReport::PriceAlerts(report) => {
                assert_eq!(report.checked, 2);
                assert_eq!(report.triggered, 1);
            }
            other => panic!("Unexpected report: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_single_alert() {
        let (agent, alerts, _dir) = setup(&[("AAPL", 149.0)]).await;
        let created = alerts
            .create("user-1", input("AAPL", AlertCondition::Above, 150.0))
            .await
            .unwrap();

        // Condition not yet satisfied
        let check = agent.check_single_alert(&created.id).await.unwrap();
        assert!(!check.triggered);
        assert_eq!(check.observed, 149.0);

        let missing = agent.check_single_alert("does-not-exist").await;
        assert!(matches!(missing.unwrap_err(), AlertError::NotFound(_)));
    }
}
