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

//! Authentication service.
//!
//! Owns the register/login/logout/refresh/verify flows. Sessions live
//! in the key-value store under `session:{id}` with the refresh-token
//! TTL; the refresh token is only honored while its session entry
//! exists, so logout takes effect immediately.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::audit::{actions, AuditService};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::tokens::{TokenError, TokenSigner, TOKEN_TYPE_ACCESS, TOKEN_TYPE_REFRESH};
use crate::config::Settings;
use crate::db::{queries, DBClient};
use crate::kv::KeyValueStore;
use crate::models::{AuthResponse, User, UserPublic};
use crate::security::{ValidationError, Validator};

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Token signature, structure, or expiry check failed
    #[error("Invalid or expired token")]
    InvalidToken,

    /// An access token was presented where a refresh token is required
    /// (or vice versa)
    #[error("Invalid token type")]
    TokenTypeMismatch,

    /// The server-side session is gone (logout or TTL expiry)
    #[error("Session expired or invalid")]
    SessionExpired,

    /// The token's subject no longer exists
    #[error("User not found")]
    UserNotFound,

    /// Registration with an email that is already taken
    #[error("User with this email already exists")]
    DuplicateEmail,

    /// Input validation failed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Storage-layer failure (database or session store)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<TokenError> for AuthError {
    fn from(_: TokenError) -> Self {
        AuthError::InvalidToken
    }
}

fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// Authentication and session management.
pub struct AuthService {
    db: Arc<DBClient>,
    kv: Arc<dyn KeyValueStore>,
    signer: TokenSigner,
    audit: Arc<AuditService>,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl AuthService {
    /// Builds the service from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured JWT algorithm is unsupported.
    pub fn new(
        db: Arc<DBClient>,
        kv: Arc<dyn KeyValueStore>,
        audit: Arc<AuditService>,
        settings: &Settings,
    ) -> anyhow::Result<Self> {
        let signer = TokenSigner::new(&settings.jwt_secret_key, &settings.jwt_algorithm)?;
        Ok(Self {
            db,
            kv,
            signer,
            audit,
            access_ttl: settings.access_token_ttl(),
            refresh_ttl: settings.refresh_token_ttl(),
        })
    }

    /// Registers a new user and opens a session.
    #[instrument(name = "auth_register", skip_all, fields(email = %email))]
    pub async fn register(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let email = Validator::validate_email(email)?;
        Validator::validate_password(password)?;

        if self.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash =
            hash_password(password).map_err(|e| AuthError::Storage(e.to_string()))?;

        let user_id = Uuid::new_v4().to_string();
        self.db
            .create(
                "user",
                &user_id,
                serde_json::json!({
                    "email": email,
                    "password_hash": password_hash,
                }),
            )
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        let user = self
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        info!(user_id = %user.id, "User registered");
        self.audit
            .record(
                Some(&user.id),
                actions::USER_REGISTERED,
                "user",
                Some(&user.id),
                serde_json::json!({}),
            )
            .await;

        self.open_session(&user).await
    }

    /// Authenticates with email and password and opens a session.
    #[instrument(name = "auth_login", skip_all, fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let email = Validator::validate_email(email).map_err(|_| AuthError::InvalidCredentials)?;

        let user = self
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            warn!(user_id = %user.id, "Login rejected: password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, "User logged in");
        self.audit
            .record(
                Some(&user.id),
                actions::USER_LOGIN,
                "user",
                Some(&user.id),
                serde_json::json!({}),
            )
            .await;

        self.open_session(&user).await
    }

    /// Invalidates the session bound to a refresh token.
    ///
    /// The refresh token then fails even though its signature remains
    /// valid until the signed expiry.
    #[instrument(name = "auth_logout", skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self.signer.decode(refresh_token)?;

        if claims.token_type != TOKEN_TYPE_REFRESH {
            return Err(AuthError::TokenTypeMismatch);
        }

        let session_id = claims.session_id.ok_or(AuthError::InvalidToken)?;
        self.kv
            .delete(&session_key(&session_id))
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        info!(user_id = %claims.sub, "Session terminated");
        self.audit
            .record(
                Some(&claims.sub),
                actions::USER_LOGOUT,
                "user",
                Some(&claims.sub),
                serde_json::json!({}),
            )
            .await;

        Ok(())
    }

    /// Re-mints both tokens against an existing session and extends
    /// the session TTL. The session id is preserved.
    #[instrument(name = "auth_refresh", skip_all)]
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        let claims = self.signer.decode(refresh_token)?;

        if claims.token_type != TOKEN_TYPE_REFRESH {
            return Err(AuthError::TokenTypeMismatch);
        }

        let session_id = claims.session_id.ok_or(AuthError::InvalidToken)?;

        let stored_user = self
            .kv
            .get(&session_key(&session_id))
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        match stored_user {
            Some(user_id) if user_id == claims.sub => {}
            _ => return Err(AuthError::SessionExpired),
        }

        let user = self
            .find_user_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.audit
            .record(
                Some(&user.id),
                actions::SESSION_REFRESHED,
                "user",
                Some(&user.id),
                serde_json::json!({}),
            )
            .await;

        self.issue_tokens(&user, &session_id).await
    }

    /// Verifies an access token and resolves its user.
    #[instrument(name = "auth_verify", skip_all)]
    pub async fn verify_session(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = self.signer.decode(access_token)?;

        if claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(AuthError::TokenTypeMismatch);
        }

        self.find_user_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Returns the public snapshot for `GET /auth/me`.
    pub async fn current_user(&self, access_token: &str) -> Result<UserPublic, AuthError> {
        let user = self.verify_session(access_token).await?;
        Ok(UserPublic::from(&user))
    }

    async fn open_session(&self, user: &User) -> Result<AuthResponse, AuthError> {
        let session_id = Uuid::new_v4().to_string();
        self.issue_tokens(user, &session_id).await
    }

    async fn issue_tokens(
        &self,
        user: &User,
        session_id: &str,
    ) -> Result<AuthResponse, AuthError> {
        let (access_token, access_expires) = self.signer.mint_access(&user.id, self.access_ttl)?;
        let (refresh_token, refresh_expires) =
            self.signer
                .mint_refresh(&user.id, session_id, self.refresh_ttl)?;

        // Session lives exactly as long as the refresh token
        let ttl = (refresh_expires - Utc::now())
            .to_std()
            .unwrap_or_default();
        self.kv
            .set_ex(&session_key(session_id), &user.id, ttl)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        Ok(AuthResponse {
            user: UserPublic::from(user),
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_at: access_expires,
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let query = format!("{} WHERE email = $email", queries::user::SELECT_BASE);
        let rows = self
            .db
            .query_json_with_params(
                &query,
                vec![(
                    "email".to_string(),
                    serde_json::Value::String(email.to_string()),
                )],
            )
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        Self::first_user(rows)
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        let query = format!("{} WHERE meta::id(id) = $id", queries::user::SELECT_BASE);
        let rows = self
            .db
            .query_json_with_params(
                &query,
                vec![(
                    "id".to_string(),
                    serde_json::Value::String(user_id.to_string()),
                )],
            )
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        Self::first_user(rows)
    }

    fn first_user(rows: Vec<serde_json::Value>) -> Result<Option<User>, AuthError> {
        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| AuthError::Storage(format!("user row decode: {}", e))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use tempfile::tempdir;

    async fn service() -> (AuthService, Arc<dyn KeyValueStore>, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let db = Arc::new(
            DBClient::new(temp_dir.path().join("auth_db").to_str().unwrap())
                .await
                .unwrap(),
        );
        db.initialize_schema().await.unwrap();

        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let audit = Arc::new(AuditService::new(db.clone()));

        let settings = test_settings();
        let auth = AuthService::new(db, kv.clone(), audit, &settings).unwrap();
        (auth, kv, temp_dir)
    }

    fn test_settings() -> Settings {
        Settings {
            database_url: String::new(),
            redis_url: None,
            jwt_secret_key: "test-secret-key-at-least-32-bytes!!".to_string(),
            jwt_algorithm: "HS256".to_string(),
            access_token_expire_minutes: 15,
            refresh_token_expire_days: 7,
            cors_origins: vec![],
            log_level: "INFO".to_string(),
            environment: crate::config::Environment::Development,
            mcp_stock_data_url: String::new(),
            mcp_news_url: String::new(),
            mcp_market_data_url: String::new(),
            price_update_interval: std::time::Duration::from_secs(60),
            ws_bind_addr: String::new(),
        }
    }

    #[tokio::test]
    async fn test_register_returns_tokens() {
        let (auth, _kv, _dir) = service().await;

        let response = auth
            .register("alice@example.com", "P@ssword1")
            .await
            .unwrap();

        assert_eq!(response.user.email, "alice@example.com");
        assert_eq!(response.token_type, "bearer");
        assert!(!response.access_token.is_empty());
        assert!(!response.refresh_token.is_empty());
        assert!(response.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let (auth, _kv, _dir) = service().await;
        auth.register("alice@example.com", "P@ssword1")
            .await
            .unwrap();

        let err = auth
            .register("Alice@Example.com", "An0therPwd!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_login_and_verify() {
        let (auth, _kv, _dir) = service().await;
        auth.register("alice@example.com", "P@ssword1")
            .await
            .unwrap();

        let response = auth.login("alice@example.com", "P@ssword1").await.unwrap();
        let user = auth.verify_session(&response.access_token).await.unwrap();
        assert_eq!(user.email, "alice@example.com");

        let me = auth.current_user(&response.access_token).await.unwrap();
        assert_eq!(me.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let (auth, kv, _dir) = service().await;
        auth.register("alice@example.com", "P@ssword1")
            .await
            .unwrap();

        // Session count before the failed login
        let err = auth
            .login("alice@example.com", "WrongPassword1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let err = auth
            .login("nobody@example.com", "P@ssword1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        // No session was created by the failed attempts (register made 1)
        let removed = kv.delete_prefix("session:").await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_refresh_reuses_session_id() {
        let (auth, _kv, _dir) = service().await;
        let initial = auth
            .register("alice@example.com", "P@ssword1")
            .await
            .unwrap();

        let refreshed = auth.refresh_session(&initial.refresh_token).await.unwrap();
        assert_eq!(refreshed.user.email, "alice@example.com");

        // Both refresh tokens decode to the same session id
        let signer = TokenSigner::new("test-secret-key-at-least-32-bytes!!", "HS256").unwrap();
        let first = signer.decode(&initial.refresh_token).unwrap();
        let second = signer.decode(&refreshed.refresh_token).unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn test_logout_invalidates_refresh() {
        let (auth, _kv, _dir) = service().await;
        let response = auth
            .register("alice@example.com", "P@ssword1")
            .await
            .unwrap();

        auth.logout(&response.refresh_token).await.unwrap();

        // Signature still valid, but the session is gone
        let err = auth
            .refresh_session(&response.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));
    }

    #[tokio::test]
    async fn test_access_token_rejected_for_refresh() {
        let (auth, _kv, _dir) = service().await;
        let response = auth
            .register("alice@example.com", "P@ssword1")
            .await
            .unwrap();

        let err = auth
            .refresh_session(&response.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenTypeMismatch));

        let err = auth
            .verify_session(&response.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenTypeMismatch));
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let (auth, _kv, _dir) = service().await;
        let err = auth.verify_session("garbage.token.here").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_invalid_inputs_rejected() {
        let (auth, _kv, _dir) = service().await;

        assert!(matches!(
            auth.register("not-an-email", "P@ssword1").await.unwrap_err(),
            AuthError::Validation(_)
        ));
        assert!(matches!(
            auth.register("alice@example.com", "short").await.unwrap_err(),
            AuthError::Validation(_)
        ));
    }
}
