// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod alert;
pub mod notification;
pub mod portfolio;
pub mod stock;
pub mod user;
pub mod workflow;
pub mod ws;

pub use alert::{
    AlertCondition, NotificationChannel, PriceAlert, PriceAlertCreate, TriggeredAlert,
};
pub use notification::{kinds, Notification, NotificationCreate};
pub use portfolio::{
    Portfolio, PortfolioComposition, RebalanceAction, RebalancingSuggestion, StockPosition,
    StockPositionCreate,
};
pub use stock::{
    HistoricalBar, NewsArticle, PriceSnapshot, SentimentLabel, SentimentScore, StockSentiment,
};
pub use user::{AuthResponse, User, UserPublic};
pub use workflow::{
    AgentReport, ExecutionMode, ExecutionStatus, NodeType, PriceAlertReport, RebalancingReport,
    ResearchReport, TickerResearch, Workflow, WorkflowCreate, WorkflowEdge, WorkflowExecution,
    WorkflowGraph, WorkflowNode, WorkflowState, CANCELLED_ERROR,
};
pub use ws::{ClientMessage, ServerMessage, WsDecodeError};
