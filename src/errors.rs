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

//! Application error catalog.
//!
//! Every component surfaces typed errors upward; at the outermost
//! boundary they are translated to a response body of the form
//! `{error: {code, message, retryable}, correlation_id}` with the HTTP
//! status drawn from a fixed code-to-status table. The technical
//! message is logged with the correlation id; only the user-facing
//! message crosses the boundary.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Error severity for logging and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Closed set of application error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    // Validation
    InvalidTicker,
    InvalidQuantity,
    InvalidPrice,
    InvalidDate,
    InvalidCron,
    InvalidInput,

    // Authentication
    InvalidCredentials,
    SessionExpired,
    InsufficientPermissions,
    TokenInvalid,
    DuplicateEmail,

    // External services
    McpConnectionFailed,
    McpTimeout,
    McpInvalidResponse,
    ApiRateLimit,
    ExternalServiceError,
    CircuitOpen,

    // Data
    DatabaseError,
    DatabaseConnectionFailed,
    DataNotFound,
    ConstraintViolation,

    // Business logic
    DuplicatePosition,
    PositionNotFound,
    PortfolioNotFound,
    WorkflowNotFound,
    ExecutionNotFound,
    InvalidOperation,
    WorkflowCancelled,

    // Generic
    InternalError,
}

impl ErrorCode {
    /// Wire representation (SCREAMING_SNAKE_CASE, matching the closed
    /// set the gateway exposes to clients).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidTicker => "INVALID_TICKER",
            ErrorCode::InvalidQuantity => "INVALID_QUANTITY",
            ErrorCode::InvalidPrice => "INVALID_PRICE",
            ErrorCode::InvalidDate => "INVALID_DATE",
            ErrorCode::InvalidCron => "INVALID_CRON",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            ErrorCode::TokenInvalid => "TOKEN_INVALID",
            ErrorCode::DuplicateEmail => "DUPLICATE_EMAIL",
            ErrorCode::McpConnectionFailed => "MCP_CONNECTION_FAILED",
            ErrorCode::McpTimeout => "MCP_TIMEOUT",
            ErrorCode::McpInvalidResponse => "MCP_INVALID_RESPONSE",
            ErrorCode::ApiRateLimit => "API_RATE_LIMIT",
            ErrorCode::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
            ErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::DatabaseConnectionFailed => "DATABASE_CONNECTION_FAILED",
            ErrorCode::DataNotFound => "DATA_NOT_FOUND",
            ErrorCode::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorCode::DuplicatePosition => "DUPLICATE_POSITION",
            ErrorCode::PositionNotFound => "POSITION_NOT_FOUND",
            ErrorCode::PortfolioNotFound => "PORTFOLIO_NOT_FOUND",
            ErrorCode::WorkflowNotFound => "WORKFLOW_NOT_FOUND",
            ErrorCode::ExecutionNotFound => "EXECUTION_NOT_FOUND",
            ErrorCode::InvalidOperation => "INVALID_OPERATION",
            ErrorCode::WorkflowCancelled => "WORKFLOW_CANCELLED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Fixed code-to-HTTP-status mapping used by the gateway layer.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::InvalidTicker
            | ErrorCode::InvalidQuantity
            | ErrorCode::InvalidPrice
            | ErrorCode::InvalidDate
            | ErrorCode::InvalidCron
            | ErrorCode::InvalidInput
            | ErrorCode::InvalidOperation
            | ErrorCode::WorkflowCancelled => 400,
            ErrorCode::InvalidCredentials
            | ErrorCode::SessionExpired
            | ErrorCode::TokenInvalid => 401,
            ErrorCode::InsufficientPermissions => 403,
            ErrorCode::DataNotFound
            | ErrorCode::PositionNotFound
            | ErrorCode::PortfolioNotFound
            | ErrorCode::WorkflowNotFound
            | ErrorCode::ExecutionNotFound => 404,
            ErrorCode::DuplicateEmail
            | ErrorCode::DuplicatePosition
            | ErrorCode::ConstraintViolation => 409,
            ErrorCode::ApiRateLimit => 429,
            ErrorCode::DatabaseError
            | ErrorCode::DatabaseConnectionFailed
            | ErrorCode::InternalError => 500,
            ErrorCode::McpConnectionFailed
            | ErrorCode::McpInvalidResponse
            | ErrorCode::ExternalServiceError
            | ErrorCode::CircuitOpen => 502,
            ErrorCode::McpTimeout => 504,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured application error.
///
/// Carries both a technical message (for logs) and a user-facing
/// message (for responses), plus the retryability hint the clients use
/// to decide whether to back off and try again.
#[derive(Debug)]
pub struct AppError {
    pub code: ErrorCode,
    /// Technical message, logged with the correlation id
    pub message: String,
    /// User-facing message, returned in the response body
    pub user_message: String,
    pub severity: ErrorSeverity,
    pub retryable: bool,
}

impl AppError {
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            user_message: user_message.into(),
            severity: ErrorSeverity::Medium,
            retryable: false,
        }
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Validation error shorthand (non-retryable, low severity).
    pub fn validation(code: ErrorCode, message: impl Into<String> + Clone) -> Self {
        let text: String = message.into();
        Self::new(code, text.clone(), text).with_severity(ErrorSeverity::Low)
    }

    /// Generic internal error with the standard opaque user message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalError,
            message,
            "An unexpected error occurred. Please try again.",
        )
        .with_severity(ErrorSeverity::High)
    }

    /// External-service error shorthand (retryable by default).
    pub fn external(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            code,
            message,
            "Unable to reach an upstream data service. Please try again.",
        )
        .with_severity(ErrorSeverity::High)
        .retryable(true)
    }

    /// Serializes to the wire shape, minting a fresh correlation id.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorBody {
                code: self.code.as_str(),
                message: self.user_message.clone(),
                retryable: self.retryable,
            },
            correlation_id: Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

/// Wire shape for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub correlation_id: String,
}

/// Inner error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

// ---------------------------------------------------------------------
// Gateway translation: domain errors -> the closed catalog
// ---------------------------------------------------------------------

impl From<crate::security::ValidationError> for AppError {
    fn from(err: crate::security::ValidationError) -> Self {
        AppError::validation(ErrorCode::InvalidInput, err.to_string())
    }
}

impl From<crate::auth::AuthError> for AppError {
    fn from(err: crate::auth::AuthError) -> Self {
        use crate::auth::AuthError;
        match err {
            AuthError::InvalidCredentials => AppError::new(
                ErrorCode::InvalidCredentials,
                "credential verification failed",
                "Invalid email or password. Please try again.",
            ),
            AuthError::InvalidToken | AuthError::TokenTypeMismatch => AppError::new(
                ErrorCode::TokenInvalid,
                err.to_string(),
                "Your credentials are invalid. Please log in again.",
            ),
            AuthError::SessionExpired => AppError::new(
                ErrorCode::SessionExpired,
                "session missing from store",
                "Your session has expired. Please log in again.",
            ),
            AuthError::UserNotFound => AppError::new(
                ErrorCode::DataNotFound,
                "token subject does not exist",
                "Account not found.",
            ),
            AuthError::DuplicateEmail => AppError::new(
                ErrorCode::DuplicateEmail,
                "email already registered",
                "An account with this email already exists.",
            ),
            AuthError::Validation(inner) => inner.into(),
            AuthError::Storage(message) => AppError::internal(message),
        }
    }
}

impl From<crate::stocks::MarketDataError> for AppError {
    fn from(err: crate::stocks::MarketDataError) -> Self {
        use crate::stocks::MarketDataError;
        match err {
            MarketDataError::Validation(inner) => inner.into(),
            MarketDataError::CircuitOpen { .. } => AppError::new(
                ErrorCode::CircuitOpen,
                err.to_string(),
                "A market data service is temporarily unavailable. Please try again shortly.",
            )
            .with_severity(ErrorSeverity::High)
            .retryable(true),
            MarketDataError::Exhausted { .. } => {
                AppError::external(ErrorCode::McpConnectionFailed, err.to_string())
            }
            MarketDataError::Tool(tool_err) => {
                AppError::external(ErrorCode::ExternalServiceError, tool_err.to_string())
                    .retryable(tool_err.is_transient())
            }
            MarketDataError::InvalidData(message) => AppError::new(
                ErrorCode::McpInvalidResponse,
                message,
                "A market data service returned unusable data. Please try again.",
            )
            .with_severity(ErrorSeverity::High),
        }
    }
}

impl From<crate::workflow::EngineError> for AppError {
    fn from(err: crate::workflow::EngineError) -> Self {
        use crate::workflow::EngineError;
        match err {
            EngineError::Validation(inner) => inner.into(),
            EngineError::Definition(inner) => {
                AppError::validation(ErrorCode::InvalidInput, inner.to_string())
            }
            EngineError::WorkflowNotFound(id) => AppError::new(
                ErrorCode::WorkflowNotFound,
                format!("workflow {} not found", id),
                "Workflow not found.",
            ),
            EngineError::ExecutionNotFound(id) => AppError::new(
                ErrorCode::ExecutionNotFound,
                format!("execution {} not found", id),
                "Execution not found.",
            ),
            EngineError::TemplateNotFound(name) => AppError::validation(
                ErrorCode::InvalidInput,
                format!("Unknown workflow template '{}'", name),
            ),
            EngineError::Storage(message) => AppError::internal(message),
        }
    }
}

impl From<crate::workflow::SchedulerError> for AppError {
    fn from(err: crate::workflow::SchedulerError) -> Self {
        use crate::workflow::SchedulerError;
        match err {
            SchedulerError::Validation(inner) => {
                AppError::validation(ErrorCode::InvalidCron, inner.to_string())
            }
            SchedulerError::Engine(inner) => inner.into(),
            SchedulerError::JobNotFound(id) => AppError::new(
                ErrorCode::DataNotFound,
                format!("no job for workflow {}", id),
                "No schedule exists for this workflow.",
            ),
        }
    }
}

impl From<crate::alerts::AlertError> for AppError {
    fn from(err: crate::alerts::AlertError) -> Self {
        use crate::alerts::AlertError;
        match err {
            AlertError::Validation(inner) => inner.into(),
            AlertError::NotFound(id) => AppError::new(
                ErrorCode::DataNotFound,
                format!("alert {} not found", id),
                "Alert not found.",
            ),
            AlertError::Storage(message) => AppError::internal(message),
        }
    }
}

impl From<crate::portfolio::PortfolioError> for AppError {
    fn from(err: crate::portfolio::PortfolioError) -> Self {
        use crate::portfolio::PortfolioError;
        match err {
            PortfolioError::Validation(inner) => inner.into(),
            PortfolioError::DuplicatePosition(ticker) => AppError::new(
                ErrorCode::DuplicatePosition,
                format!("position for {} already exists", ticker),
                "A position for this ticker already exists in your portfolio.",
            ),
            PortfolioError::PositionNotFound(ticker) => AppError::new(
                ErrorCode::PositionNotFound,
                format!("position for {} not found", ticker),
                "No position for this ticker.",
            ),
            PortfolioError::Storage(message) => AppError::internal(message),
        }
    }
}
