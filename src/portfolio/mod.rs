// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Portfolio and positions.
//!
//! Each user owns at most one portfolio; positions are unique per
//! ticker within it. The research and rebalancing agents read this
//! data to decide what to analyze.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::{queries, DBClient};
use crate::models::{Portfolio, StockPosition, StockPositionCreate};
use crate::security::{ValidationError, Validator};

/// Portfolio operation errors.
#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A position for this ticker already exists in the portfolio
    #[error("Position for ticker {0} already exists")]
    DuplicatePosition(String),

    /// No position for this ticker
    #[error("Position for ticker {0} not found")]
    PositionNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Portfolio CRUD.
pub struct PortfolioService {
    db: Arc<DBClient>,
}

impl PortfolioService {
    pub fn new(db: Arc<DBClient>) -> Self {
        Self { db }
    }

    /// Returns the user's portfolio, creating it on first use.
    #[instrument(name = "portfolio_get_or_create", skip(self))]
    pub async fn get_or_create(&self, user_id: &str) -> Result<Portfolio, PortfolioError> {
        if let Some(portfolio) = self.find_by_user(user_id).await? {
            return Ok(portfolio);
        }

        let id = Uuid::new_v4().to_string();
        self.db
            .create(
                "portfolio",
                &id,
                serde_json::json!({ "user_id": user_id }),
            )
            .await
            .map_err(|e| PortfolioError::Storage(e.to_string()))?;

        info!(user_id = %user_id, portfolio_id = %id, "Portfolio created");

        self.find_by_user(user_id)
            .await?
            .ok_or_else(|| PortfolioError::Storage("portfolio vanished after create".to_string()))
    }

    /// Returns the user's portfolio if one exists.
    pub async fn find_by_user(&self, user_id: &str) -> Result<Option<Portfolio>, PortfolioError> {
        let query = format!(
            "{} WHERE user_id = $user",
            queries::portfolio::SELECT_BASE
        );
        let rows = self
            .db
            .query_json_with_params(
                &query,
                vec![(
                    "user".to_string(),
                    serde_json::Value::String(user_id.to_string()),
                )],
            )
            .await
            .map_err(|e| PortfolioError::Storage(e.to_string()))?;

        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| PortfolioError::Storage(format!("portfolio row decode: {}", e))),
            None => Ok(None),
        }
    }

    /// Adds a position to the user's portfolio.
    #[instrument(name = "portfolio_add_position", skip(self, input), fields(ticker = %input.ticker))]
    pub async fn add_position(
        &self,
        user_id: &str,
        input: StockPositionCreate,
    ) -> Result<StockPosition, PortfolioError> {
        let ticker = Validator::validate_ticker(&input.ticker)?;
        Validator::validate_positive_quantity(input.quantity)?;
        Validator::validate_positive_price(input.purchase_price)?;
        Validator::validate_purchase_date(input.purchase_date)?;

        let portfolio = self.get_or_create(user_id).await?;

        let existing = self.list_positions(user_id).await?;
        if existing.iter().any(|p| p.ticker == ticker) {
            return Err(PortfolioError::DuplicatePosition(ticker));
        }

        let id = Uuid::new_v4().to_string();
        self.db
            .create(
                "stock_position",
                &id,
                serde_json::json!({
                    "portfolio_id": portfolio.id,
                    "ticker": ticker,
                    "quantity": input.quantity,
                    "purchase_price": input.purchase_price,
                    "purchase_date": input.purchase_date.to_string(),
                }),
            )
            .await
            .map_err(|e| PortfolioError::Storage(e.to_string()))?;

        info!(portfolio_id = %portfolio.id, ticker = %ticker, "Position added");

        let positions = self.list_positions(user_id).await?;
        positions
            .into_iter()
            .find(|p| p.ticker == ticker)
            .ok_or_else(|| PortfolioError::Storage("position vanished after create".to_string()))
    }

    /// Removes the position for a ticker.
    #[instrument(name = "portfolio_remove_position", skip(self))]
    pub async fn remove_position(&self, user_id: &str, ticker: &str) -> Result<(), PortfolioError> {
        let ticker = Validator::validate_ticker(ticker)?;
        let positions = self.list_positions(user_id).await?;

        let position = positions
            .into_iter()
            .find(|p| p.ticker == ticker)
            .ok_or_else(|| PortfolioError::PositionNotFound(ticker.clone()))?;

        self.db
            .delete(&format!("stock_position:{}", position.id))
            .await
            .map_err(|e| PortfolioError::Storage(e.to_string()))?;

        info!(ticker = %ticker, "Position removed");
        Ok(())
    }

    /// Lists the user's positions. A user without a portfolio has none.
    pub async fn list_positions(
        &self,
        user_id: &str,
    ) -> Result<Vec<StockPosition>, PortfolioError> {
        let Some(portfolio) = self.find_by_user(user_id).await? else {
            return Ok(Vec::new());
        };

        let query = format!(
            "{} WHERE portfolio_id = $pid ORDER BY ticker",
            queries::portfolio::SELECT_POSITIONS
        );
        let rows = self
            .db
            .query_json_with_params(
                &query,
                vec![(
                    "pid".to_string(),
                    serde_json::Value::String(portfolio.id.clone()),
                )],
            )
            .await
            .map_err(|e| PortfolioError::Storage(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| PortfolioError::Storage(format!("position row decode: {}", e)))
            })
            .collect()
    }

    /// Distinct tickers held by the user.
    pub async fn held_tickers(&self, user_id: &str) -> Result<Vec<String>, PortfolioError> {
        let positions = self.list_positions(user_id).await?;
        let mut tickers: Vec<String> = positions.into_iter().map(|p| p.ticker).collect();
        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }
}
