// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Price alerts and notifications.
//!
//! The alert evaluator checks observed prices against thresholds and
//! performs the one-shot trigger transition; notifications are the
//! append-only record of what was delivered, pushed to live
//! connections through the hub.

pub mod notifications;
pub mod service;

pub use notifications::NotificationService;
pub use service::{AlertError, AlertService};
