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

//! Periodic price broadcaster.
//!
//! One background task: every tick, when the market-hours predicate
//! says the market is open, sweep the hub's ticker index, batch-fetch
//! prices through the resilient stock-data stack, and broadcast each
//! snapshot to its subscribers. The stop token is observed both
//! between ticks and during the sleep.

use chrono::{NaiveTime, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::realtime::hub::Hub;
use crate::stocks::MarketDataProvider;

/// Market-hours predicate.
pub type MarketHoursFn = Box<dyn Fn() -> bool + Send + Sync>;

/// Placeholder market-hours window: 14:30-21:00 UTC, standing in for
/// US East trading hours. No holiday calendar.
pub fn utc_market_hours() -> bool {
    let now = Utc::now().time();
    let open = NaiveTime::from_hms_opt(14, 30, 0).expect("valid open time");
    let close = NaiveTime::from_hms_opt(21, 0, 0).expect("valid close time");
    now >= open && now <= close
}

/// Background loop broadcasting prices to subscribers.
pub struct PriceTickerLoop {
    hub: Arc<Hub>,
    provider: Arc<dyn MarketDataProvider>,
    interval: Duration,
    market_hours: MarketHoursFn,
    stop: CancellationToken,
}

impl PriceTickerLoop {
    /// Creates the loop with the default market-hours predicate.
    pub fn new(
        hub: Arc<Hub>,
        provider: Arc<dyn MarketDataProvider>,
        interval: Duration,
        stop: CancellationToken,
    ) -> Self {
        Self {
            hub,
            provider,
            interval,
            market_hours: Box::new(utc_market_hours),
            stop,
        }
    }

    /// Overrides the market-hours predicate (operator-supplied).
    pub fn with_market_hours(mut self, predicate: MarketHoursFn) -> Self {
        self.market_hours = predicate;
        self
    }

    /// Runs until the stop token fires.
    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Price ticker loop started"
        );

        loop {
            if self.stop.is_cancelled() {
                break;
            }

            if (self.market_hours)() {
                self.tick().await;
            } else {
                debug!(hour = Utc::now().hour(), "Market closed, skipping tick");
            }

            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Price ticker loop stopped");
    }

    /// One sweep: collect subscriptions, batch fetch, broadcast.
    async fn tick(&self) {
        let tickers = self.hub.subscribed_tickers().await;
        if tickers.is_empty() {
            debug!("No subscribed tickers, skipping price update");
            return;
        }

        info!(count = tickers.len(), "Fetching prices for subscribed tickers");

        let prices = match self.provider.get_batch_prices(&tickers).await {
            Ok(prices) => prices,
            Err(e) => {
                error!(error = %e, "Batch price fetch failed");
                return;
            }
        };

        let mut total_sent = 0;
        for (ticker, snapshot) in prices {
            total_sent += self.hub.broadcast_price_update(&ticker, snapshot).await;
        }

        if total_sent == 0 {
            warn!("Price tick delivered no updates");
        } else {
            info!(deliveries = total_sent, "Price updates broadcast");
        }
    }
}
