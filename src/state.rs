// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Application composition root.
//!
//! Every service is constructed exactly once in [`AppState::new`] and
//! passed explicitly to its consumers; there are no module-level
//! singletons. Background work (WebSocket listener, price ticker,
//! schedule supervisors) is launched by [`AppState::start`] and wound
//! down through the shared cancellation token with a bounded wait.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agents::{AgentRegistry, PriceAlertAgent, RebalancingAgent, ResearchAgent};
use crate::alerts::{AlertService, NotificationService};
use crate::audit::AuditService;
use crate::auth::AuthService;
use crate::cache::MarketCache;
use crate::compliance::ComplianceService;
use crate::config::Settings;
use crate::db::DBClient;
use crate::kv::{KeyValueStore, MemoryStore, RedisStore};
use crate::mcp::ToolClient;
use crate::portfolio::PortfolioService;
use crate::realtime::{Hub, PriceTickerLoop, WsServer};
use crate::resilience::BreakerRegistry;
use crate::stocks::{MarketData, MarketDataProvider, NewsService, StockDataService};
use crate::workflow::{WorkflowEngine, WorkflowScheduler};

/// How long shutdown waits for each background task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Application state shared across the service.
pub struct AppState {
    pub settings: Settings,
    /// Database client
    pub db: Arc<DBClient>,
    /// Session and cache store
    pub kv: Arc<dyn KeyValueStore>,
    /// Market-data cache
    pub cache: Arc<MarketCache>,
    /// Per-dependency circuit breakers
    pub breakers: Arc<BreakerRegistry>,
    /// Authentication and sessions
    pub auth: Arc<AuthService>,
    /// Audit trail
    pub audit: Arc<AuditService>,
    /// Portfolio and positions
    pub portfolio: Arc<PortfolioService>,
    /// Notification persistence and delivery
    pub notifications: Arc<NotificationService>,
    /// Price alerts
    pub alerts: Arc<AlertService>,
    /// Stock prices and historical data
    pub stock_service: Arc<StockDataService>,
    /// News and sentiment
    pub news_service: Arc<NewsService>,
    /// The provider seam agents consume
    pub market_data: Arc<dyn MarketDataProvider>,
    /// Agent registry
    pub registry: Arc<AgentRegistry>,
    /// Workflow engine
    pub engine: Arc<WorkflowEngine>,
    /// Cron scheduler
    pub scheduler: Arc<WorkflowScheduler>,
    /// Real-time connection hub
    pub hub: Arc<Hub>,
    /// Deletion requests and policy acceptances
    pub compliance: Arc<ComplianceService>,
    /// Shared stop signal for every background task
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Creates new application state
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        // Persistence
        let db = Arc::new(DBClient::new(&settings.database_url).await?);
        db.initialize_schema().await?;

        // Session and cache store: Redis when configured, otherwise
        // the in-process TTL store
        let kv: Arc<dyn KeyValueStore> = match &settings.redis_url {
            Some(url) => Arc::new(RedisStore::connect(url).await?),
            None => {
                warn!("REDIS_URL not set, using in-process TTL store");
                Arc::new(MemoryStore::new())
            }
        };

        let cache = Arc::new(MarketCache::new(kv.clone()));
        let breakers = Arc::new(BreakerRegistry::new());
        let audit = Arc::new(AuditService::new(db.clone()));

        let auth = Arc::new(AuthService::new(
            db.clone(),
            kv.clone(),
            audit.clone(),
            &settings,
        )?);

        // Real-time hub and notification path
        let hub = Arc::new(Hub::new());
        let notifications = Arc::new(NotificationService::new(db.clone(), hub.clone()));
        let alerts = Arc::new(AlertService::new(
            db.clone(),
            notifications.clone(),
            audit.clone(),
        ));
        let portfolio = Arc::new(PortfolioService::new(db.clone()));

        // Resilient market-data stack over the tool servers
        let stock_client = Arc::new(ToolClient::new(
            "stock-data",
            settings.mcp_stock_data_url.clone(),
        )?);
        let news_client = Arc::new(ToolClient::new("news", settings.mcp_news_url.clone())?);

        let stock_service = Arc::new(StockDataService::new(
            stock_client,
            cache.clone(),
            breakers.clone(),
        ));
        let news_service = Arc::new(NewsService::new(
            news_client,
            cache.clone(),
            breakers.clone(),
        ));
        let market_data: Arc<dyn MarketDataProvider> = Arc::new(MarketData {
            stocks: stock_service.clone(),
            news: news_service.clone(),
        });

        // Orchestration
        let registry = Arc::new(AgentRegistry::new());
        let engine = Arc::new(WorkflowEngine::new(
            db.clone(),
            registry.clone(),
            audit.clone(),
        ));

        let shutdown = CancellationToken::new();
        let scheduler = Arc::new(WorkflowScheduler::new(
            engine.clone(),
            audit.clone(),
            shutdown.clone(),
        ));

        let compliance = Arc::new(ComplianceService::new(db.clone(), audit.clone()));

        Ok(Self {
            settings,
            db,
            kv,
            cache,
            breakers,
            auth,
            audit,
            portfolio,
            notifications,
            alerts,
            stock_service,
            news_service,
            market_data,
            registry,
            engine,
            scheduler,
            hub,
            compliance,
            shutdown,
        })
    }

    /// Registers the built-in agents.
    pub async fn register_default_agents(&self) {
        self.registry
            .register(Arc::new(PriceAlertAgent::new(
                self.alerts.clone(),
                self.market_data.clone(),
            )))
            .await;
        self.registry
            .register(Arc::new(ResearchAgent::new(
                self.portfolio.clone(),
                self.market_data.clone(),
                self.notifications.clone(),
            )))
            .await;
        self.registry
            .register(Arc::new(RebalancingAgent::new(
                self.portfolio.clone(),
                self.market_data.clone(),
                self.notifications.clone(),
            )))
            .await;

        info!(agents = ?self.registry.list().await, "Default agents registered");
    }

    /// Launches the background services: WebSocket listener, price
    /// ticker loop, and persisted schedules. Returns the task handles
    /// that [`shutdown`](Self::shutdown_and_wait) waits on.
    pub async fn start(&self) -> anyhow::Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        // WebSocket endpoint
        let ws_server = Arc::new(WsServer::new(
            self.hub.clone(),
            self.auth.clone(),
            self.settings.ws_bind_addr.clone(),
            self.shutdown.clone(),
        ));
        handles.push(tokio::spawn(async move {
            if let Err(e) = ws_server.run().await {
                warn!(error = %e, "WebSocket server exited with error");
            }
        }));

        // Market-hours price broadcaster
        let ticker_loop = PriceTickerLoop::new(
            self.hub.clone(),
            self.market_data.clone(),
            self.settings.price_update_interval,
            self.shutdown.clone(),
        );
        handles.push(tokio::spawn(ticker_loop.run()));

        // Re-arm persisted schedules
        let restored = self.scheduler.restore_from_db().await?;
        info!(restored = restored, "Background services started");

        Ok(handles)
    }

    /// Signals shutdown and waits for each background task with a
    /// bounded grace period.
    pub async fn shutdown_and_wait(&self, handles: Vec<JoinHandle<()>>) {
        info!("Shutting down");
        self.shutdown.cancel();
        self.scheduler.stop_all().await;

        for handle in handles {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Background task did not stop within the grace period");
            }
        }
        info!("Shutdown complete");
    }
}
