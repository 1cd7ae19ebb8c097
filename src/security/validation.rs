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

//! Input validation utilities.
//!
//! Provides robust input validation to prevent:
//! - Injection through identifiers (parameterized queries elsewhere)
//! - Invalid data formats reaching the persistence layer
//! - Malformed tickers, cron expressions, and alert parameters

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;
use thiserror::Error;

use crate::models::NotificationChannel;

/// Maximum allowed length for workflow names
pub const MAX_WORKFLOW_NAME_LEN: usize = 256;
/// Maximum allowed length for email addresses
pub const MAX_EMAIL_LEN: usize = 255;
/// Minimum length for passwords
pub const MIN_PASSWORD_LEN: usize = 8;

/// Ticker format: 1-10 letters with an optional 1-2 letter suffix
/// after a dot (e.g. `BRK.B`).
static TICKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{1,10}(\.[A-Za-z]{1,2})?$").expect("valid ticker regex"));

/// Lightweight email shape check; full verification is delivery's job.
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Validation error types
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length
    #[error("Input exceeds maximum length of {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },

    /// Input is below minimum required length
    #[error("Input is below minimum length of {min} characters (got {actual})")]
    TooShort { min: usize, actual: usize },

    /// Input is empty when a value is required
    #[error("Required field cannot be empty: {field}")]
    Empty { field: String },

    /// Input format is invalid
    #[error("Invalid format for {field}: {details}")]
    InvalidFormat { field: String, details: String },

    /// Numeric input must be strictly positive
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: String, value: f64 },

    /// UUID format is invalid
    #[error("Invalid UUID format: {value}")]
    InvalidUuid { value: String },
}

/// Input validator with associated rules per field family.
pub struct Validator;

impl Validator {
    /// Validates a ticker symbol and normalizes it to uppercase.
    ///
    /// Rules:
    /// - Cannot be empty
    /// - 1-10 letters, optional `.XX` suffix
    pub fn validate_ticker(ticker: &str) -> Result<String, ValidationError> {
        let trimmed = ticker.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty {
                field: "ticker".to_string(),
            });
        }

        if !TICKER_RE.is_match(trimmed) {
            return Err(ValidationError::InvalidFormat {
                field: "ticker".to_string(),
                details: format!("'{}' must be 1-10 letters", trimmed),
            });
        }

        Ok(trimmed.to_uppercase())
    }

    /// Validates an email address and normalizes it to lowercase.
    pub fn validate_email(email: &str) -> Result<String, ValidationError> {
        let trimmed = email.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty {
                field: "email".to_string(),
            });
        }

        if trimmed.len() > MAX_EMAIL_LEN {
            return Err(ValidationError::TooLong {
                max: MAX_EMAIL_LEN,
                actual: trimmed.len(),
            });
        }

        if !EMAIL_RE.is_match(trimmed) {
            return Err(ValidationError::InvalidFormat {
                field: "email".to_string(),
                details: "not a valid email address".to_string(),
            });
        }

        Ok(trimmed.to_lowercase())
    }

    /// Validates a password.
    ///
    /// Only a length floor is enforced here; hashing truncation rules
    /// live with the password hasher.
    pub fn validate_password(password: &str) -> Result<(), ValidationError> {
        if password.is_empty() {
            return Err(ValidationError::Empty {
                field: "password".to_string(),
            });
        }

        if password.len() < MIN_PASSWORD_LEN {
            return Err(ValidationError::TooShort {
                min: MIN_PASSWORD_LEN,
                actual: password.len(),
            });
        }

        Ok(())
    }

    /// Validates a strictly positive price.
    pub fn validate_positive_price(price: f64) -> Result<f64, ValidationError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(ValidationError::NotPositive {
                field: "price".to_string(),
                value: price,
            });
        }
        Ok(price)
    }

    /// Validates a strictly positive quantity.
    pub fn validate_positive_quantity(quantity: f64) -> Result<f64, ValidationError> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(ValidationError::NotPositive {
                field: "quantity".to_string(),
                value: quantity,
            });
        }
        Ok(quantity)
    }

    /// Validates that a purchase date is not in the future.
    pub fn validate_purchase_date(date: NaiveDate) -> Result<NaiveDate, ValidationError> {
        let today = chrono::Utc::now().date_naive();
        if date > today {
            return Err(ValidationError::InvalidFormat {
                field: "purchase_date".to_string(),
                details: format!("{} is in the future", date),
            });
        }
        Ok(date)
    }

    /// Validates the delivery channel set: non-empty, no duplicates.
    pub fn validate_notification_channels(
        channels: &[NotificationChannel],
    ) -> Result<(), ValidationError> {
        if channels.is_empty() {
            return Err(ValidationError::Empty {
                field: "notification_channels".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for channel in channels {
            if !seen.insert(channel) {
                return Err(ValidationError::InvalidFormat {
                    field: "notification_channels".to_string(),
                    details: format!("duplicate channel '{}'", channel),
                });
            }
        }

        Ok(())
    }

    /// Validates a cron expression by parsing it.
    ///
    /// Accepts the common five-field form by normalizing it to the
    /// six-field form the parser expects (seconds pinned to 0).
    pub fn validate_cron(expression: &str) -> Result<String, ValidationError> {
        let trimmed = expression.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty {
                field: "schedule".to_string(),
            });
        }

        let normalized = match trimmed.split_whitespace().count() {
            5 => format!("0 {}", trimmed),
            6 | 7 => trimmed.to_string(),
            n => {
                return Err(ValidationError::InvalidFormat {
                    field: "schedule".to_string(),
                    details: format!("expected 5-7 cron fields, got {}", n),
                })
            }
        };

        cron::Schedule::from_str(&normalized).map_err(|e| ValidationError::InvalidFormat {
            field: "schedule".to_string(),
            details: e.to_string(),
        })?;

        Ok(trimmed.to_string())
    }

    /// Validates a workflow name.
    ///
    /// Rules:
    /// - Cannot be empty
    /// - Maximum 256 characters
    /// - Cannot contain control characters
    pub fn validate_workflow_name(name: &str) -> Result<String, ValidationError> {
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty {
                field: "workflow_name".to_string(),
            });
        }

        if trimmed.len() > MAX_WORKFLOW_NAME_LEN {
            return Err(ValidationError::TooLong {
                max: MAX_WORKFLOW_NAME_LEN,
                actual: trimmed.len(),
            });
        }

        if trimmed.chars().any(|c| c.is_control()) {
            return Err(ValidationError::InvalidFormat {
                field: "workflow_name".to_string(),
                details: "cannot contain control characters".to_string(),
            });
        }

        Ok(trimmed.to_string())
    }

    /// Validates a UUID string.
    pub fn validate_uuid(id: &str) -> Result<String, ValidationError> {
        let trimmed = id.trim();

        uuid::Uuid::parse_str(trimmed).map_err(|_| ValidationError::InvalidUuid {
            value: trimmed.to_string(),
        })?;

        Ok(trimmed.to_string())
    }
}
