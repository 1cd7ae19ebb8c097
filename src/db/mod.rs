// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Embedded database layer.

pub mod client;
pub mod queries;
pub mod schema;

pub use client::DBClient;
