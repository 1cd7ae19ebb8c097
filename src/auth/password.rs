// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Password hashing.
//!
//! Bcrypt with a per-password salt. Bcrypt ignores input beyond 72
//! bytes, so passwords are truncated to that length before hashing; a
//! warning is logged when truncation happens so operators know longer
//! inputs are silently equivalent.

use tracing::warn;

/// Bcrypt's input limit in bytes.
pub const BCRYPT_MAX_BYTES: usize = 72;

fn truncate_to_limit(password: &str) -> &[u8] {
    let bytes = password.as_bytes();
    if bytes.len() > BCRYPT_MAX_BYTES {
        warn!(
            len = bytes.len(),
            limit = BCRYPT_MAX_BYTES,
            "Password exceeds bcrypt limit and will be truncated"
        );
        &bytes[..BCRYPT_MAX_BYTES]
    } else {
        bytes
    }
}

/// Hashes a password with bcrypt and a fresh salt.
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(truncate_to_limit(password), bcrypt::DEFAULT_COST)
}

/// Verifies a password against a stored hash.
///
/// Comparison is constant-time inside the bcrypt library. Any error
/// (malformed hash included) verifies as false.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(truncate_to_limit(password), hash).unwrap_or(false)
}
