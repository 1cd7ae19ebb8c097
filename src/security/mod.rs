// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Input validation.

pub mod validation;

pub use validation::{ValidationError, Validator};
