// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end authentication flow.

use std::sync::Arc;
use std::time::Duration;

use stockflow::audit::AuditService;
use stockflow::auth::service::AuthError;
use stockflow::auth::AuthService;
use stockflow::config::{Environment, Settings};
use stockflow::db::DBClient;
use stockflow::kv::{KeyValueStore, MemoryStore};

fn settings(db_path: &str) -> Settings {
    Settings {
        database_url: db_path.to_string(),
        redis_url: None,
        jwt_secret_key: "integration-test-signing-key-0123456789".to_string(),
        jwt_algorithm: "HS256".to_string(),
        access_token_expire_minutes: 15,
        refresh_token_expire_days: 7,
        cors_origins: vec![],
        log_level: "INFO".to_string(),
        environment: Environment::Development,
        mcp_stock_data_url: "http://localhost:8002".to_string(),
        mcp_news_url: "http://localhost:8003".to_string(),
        mcp_market_data_url: "http://localhost:8004".to_string(),
        price_update_interval: Duration::from_secs(60),
        ws_bind_addr: "127.0.0.1:0".to_string(),
    }
}

async fn auth_service(dir: &tempfile::TempDir) -> AuthService {
    let db = Arc::new(
        DBClient::new(dir.path().join("auth_flow_db").to_str().unwrap())
            .await
            .unwrap(),
    );
    db.initialize_schema().await.unwrap();

    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let audit = Arc::new(AuditService::new(db.clone()));
    AuthService::new(db, kv, audit, &settings("unused")).unwrap()
}

#[tokio::test]
async fn register_me_logout_refresh_flow() {
    let dir = tempfile::tempdir().unwrap();
    let auth = auth_service(&dir).await;

    // Register returns bearer tokens
    let registered = auth
        .register("alice@example.com", "P@ssword1")
        .await
        .expect("registration should succeed");
    assert_eq!(registered.token_type, "bearer");
    assert_eq!(registered.user.email, "alice@example.com");

    // The access token resolves to the user
    let me = auth.current_user(&registered.access_token).await.unwrap();
    assert_eq!(me.email, "alice@example.com");

    // Logout invalidates the session
    auth.logout(&registered.refresh_token).await.unwrap();

    // A subsequent refresh with the same token fails with the
    // session-expired error even though the signature is still valid
    let err = auth
        .refresh_session(&registered.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionExpired));
}

#[tokio::test]
async fn login_then_refresh_rotates_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let auth = auth_service(&dir).await;

    auth.register("bob@example.com", "P@ssword1").await.unwrap();
    let login = auth.login("bob@example.com", "P@ssword1").await.unwrap();

    let refreshed = auth.refresh_session(&login.refresh_token).await.unwrap();
    assert_eq!(refreshed.user.email, "bob@example.com");

    // The new access token verifies
    let me = auth.current_user(&refreshed.access_token).await.unwrap();
    assert_eq!(me.email, "bob@example.com");
}
