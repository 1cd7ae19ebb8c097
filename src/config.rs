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

//! Environment-driven application settings.
//!
//! All configuration enters through environment variables so the
//! service can run unchanged across development, staging, and
//! production. `Settings::from_env()` is called once at startup and the
//! resulting struct is passed to the composition root.

use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Minimum recommended length for the JWT signing key, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Default WebSocket bind address.
pub const DEFAULT_WS_BIND_ADDR: &str = "127.0.0.1:8765";

/// Configuration errors raised while reading the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    /// An environment variable has an unparseable value
    #[error("Invalid value for {var}: {reason}")]
    InvalidVar { var: String, reason: String },
}

/// Deployment environment.
///
/// Production enables the strict transport posture (HTTPS enforcement,
/// secure cookies, HSTS) in the outer gateway; the core only needs to
/// know which mode it is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(ConfigError::InvalidVar {
                var: "ENVIRONMENT".to_string(),
                reason: format!("unknown environment '{}'", other),
            }),
        }
    }

    /// Returns true when strict transport settings must be enforced.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Application settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path for the embedded database (DATABASE_URL)
    pub database_url: String,
    /// Redis connection string for sessions and cache (REDIS_URL).
    /// When unset, an in-process TTL store is used instead.
    pub redis_url: Option<String>,
    /// JWT signing key (JWT_SECRET_KEY, required)
    pub jwt_secret_key: String,
    /// JWT signing algorithm (JWT_ALGORITHM, default HS256)
    pub jwt_algorithm: String,
    /// Access token lifetime in minutes (ACCESS_TOKEN_EXPIRE_MINUTES, default 15)
    pub access_token_expire_minutes: i64,
    /// Refresh token lifetime in days (REFRESH_TOKEN_EXPIRE_DAYS, default 7)
    pub refresh_token_expire_days: i64,
    /// Allowed CORS origins for the outer gateway (CORS_ORIGINS, comma-separated)
    pub cors_origins: Vec<String>,
    /// Default log filter level (LOG_LEVEL, default INFO)
    pub log_level: String,
    /// Deployment environment (ENVIRONMENT, default development)
    pub environment: Environment,
    /// Stock-data tool server endpoint (MCP_STOCK_DATA_URL)
    pub mcp_stock_data_url: String,
    /// News tool server endpoint (MCP_NEWS_URL)
    pub mcp_news_url: String,
    /// Market-data tool server endpoint (MCP_MARKET_DATA_URL)
    pub mcp_market_data_url: String,
    /// Price broadcast tick interval (PRICE_UPDATE_INTERVAL_SECS, default 60)
    pub price_update_interval: Duration,
    /// WebSocket listener bind address (WS_BIND_ADDR)
    pub ws_bind_addr: String,
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `JWT_SECRET_KEY` is missing or a variable
    /// holds an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret_key = env::var("JWT_SECRET_KEY")
            .map_err(|_| ConfigError::MissingVar("JWT_SECRET_KEY".to_string()))?;

        if jwt_secret_key.len() < MIN_JWT_SECRET_LEN {
            warn!(
                len = jwt_secret_key.len(),
                min = MIN_JWT_SECRET_LEN,
                "JWT_SECRET_KEY is shorter than the recommended minimum"
            );
        }

        let environment = match env::var("ENVIRONMENT") {
            Ok(value) => Environment::parse(&value)?,
            Err(_) => Environment::Development,
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "./data/stockflow-db".to_string()),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            jwt_secret_key,
            jwt_algorithm: env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            access_token_expire_minutes: parse_var("ACCESS_TOKEN_EXPIRE_MINUTES", 15)?,
            refresh_token_expire_days: parse_var("REFRESH_TOKEN_EXPIRE_DAYS", 7)?,
            cors_origins,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            environment,
            mcp_stock_data_url: env::var("MCP_STOCK_DATA_URL")
                .unwrap_or_else(|_| "http://localhost:8002".to_string()),
            mcp_news_url: env::var("MCP_NEWS_URL")
                .unwrap_or_else(|_| "http://localhost:8003".to_string()),
            mcp_market_data_url: env::var("MCP_MARKET_DATA_URL")
                .unwrap_or_else(|_| "http://localhost:8004".to_string()),
            price_update_interval: Duration::from_secs(parse_var(
                "PRICE_UPDATE_INTERVAL_SECS",
                60,
            )?),
            ws_bind_addr: env::var("WS_BIND_ADDR")
                .unwrap_or_else(|_| DEFAULT_WS_BIND_ADDR.to_string()),
        })
    }

    /// Access token lifetime as a chrono duration.
    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_token_expire_minutes)
    }

    /// Refresh token lifetime as a chrono duration.
    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_token_expire_days)
    }
}

fn parse_var<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidVar {
            var: var.to_string(),
            reason: format!("cannot parse '{}'", raw),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!(
            Environment::parse("production").unwrap(),
            Environment::Production
        );
        assert_eq!(
            Environment::parse("Development").unwrap(),
            Environment::Development
        );
        assert!(Environment::parse("qa").is_err());
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(Environment::Development.to_string(), "development");
    }

    #[test]
    fn test_is_production() {
        assert!(Environment::Production.is_production());
        assert!(!Environment::Staging.is_production());
        assert!(!Environment::Development.is_production());
    }

    #[test]
    fn test_parse_var_default() {
        // Variable not set in the test environment
        let value: u64 = parse_var("STOCKFLOW_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
