// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

use stockflow::config::Settings;
use stockflow::state::AppState;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initializes the tracing subscriber with structured logging.
///
/// In debug mode, uses pretty console output.
/// In release mode, uses JSON format for machine parsing.
/// Controlled via RUST_LOG, falling back to LOG_LEVEL.
fn init_tracing() {
    let fallback = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stockflow={},warn", fallback.to_lowercase())));

    // Use JSON format in release, pretty format in debug
    #[cfg(not(debug_assertions))]
    {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .init();
    }

    #[cfg(debug_assertions)]
    {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .pretty();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging
    init_tracing();

    let settings = Settings::from_env()?;
    tracing::info!(environment = %settings.environment, "Configuration loaded");

    // Ensure the database directory exists
    if let Some(parent) = std::path::Path::new(&settings.database_url).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Build and wire the application
    let app_state = AppState::new(settings).await?;
    tracing::info!("Application state initialized");

    // Register the built-in agents
    app_state.register_default_agents().await;

    // Launch background services and restore persisted schedules
    let handles = app_state.start().await?;

    // Run until interrupted
    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received");

    app_state.shutdown_and_wait(handles).await;
    Ok(())
}
