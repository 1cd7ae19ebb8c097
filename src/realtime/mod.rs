// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Real-time delivery path.
//!
//! [`hub::Hub`] owns the connection registry and fan-out primitives,
//! [`server`] runs the authenticated WebSocket endpoint on top of it,
//! and [`ticker`] drives periodic market-hours price broadcasts.

pub mod hub;
pub mod server;
pub mod ticker;

pub use hub::{Hub, HubStats};
pub use server::WsServer;
pub use ticker::{utc_market_hours, PriceTickerLoop};
