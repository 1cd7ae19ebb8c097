// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Session and identity core.
//!
//! Credentials are bcrypt-hashed, access is granted through short-lived
//! signed tokens, and refresh tokens are bound to server-side sessions
//! held in the TTL key-value store. Deleting the session invalidates
//! the refresh token even while its signature is still valid; access
//! tokens stay valid until their signed expiry, which is the accepted
//! trade-off for stateless verification.

pub mod password;
pub mod service;
pub mod tokens;

pub use service::{AuthError, AuthService};
pub use tokens::{Claims, TokenSigner, TOKEN_TYPE_ACCESS, TOKEN_TYPE_REFRESH};
