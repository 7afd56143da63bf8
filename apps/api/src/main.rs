mod alerts;
mod audit;
mod auth;
mod config;
mod db;
mod errors;
mod llm;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::alerts::AlertDispatcher;
use crate::audit::recorder::AuditContext;
use crate::audit::store::PgAuditSink;
use crate::config::Config;
use crate::db::create_pool;
use crate::llm::backoff::BackoffPolicy;
use crate::llm::credentials::CredentialPool;
use crate::llm::engine::{AnthropicClient, InvocationEngine};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobPilot API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url).await?;

    // Build the invocation engine: credential pool + backoff + wire client
    let credentials = CredentialPool::from_config(
        &config.anthropic_api_key,
        &config.anthropic_fallback_api_keys,
    );
    info!(
        "Credential pool initialized ({} key(s), model: {})",
        credentials.len(),
        llm::engine::MODEL
    );
    let policy = BackoffPolicy::new(
        Duration::from_millis(config.llm_backoff_base_ms),
        config.llm_max_retries,
    );
    let upstream = Arc::new(AnthropicClient::new(Duration::from_secs(
        config.llm_request_timeout_secs,
    ))?);
    let engine = Arc::new(InvocationEngine::new(credentials, policy, upstream));

    // Alerting (disabled when no webhook is configured)
    let alerts = Arc::new(AlertDispatcher::new(
        config.alert_webhook_url.clone(),
        config.service_tag.clone(),
    ));
    if config.alert_webhook_url.is_none() {
        info!("ALERT_WEBHOOK_URL not set; operational alerts disabled");
    }

    // Audit pipeline
    let audit = AuditContext {
        sink: Arc::new(PgAuditSink::new(pool.clone())),
        alerts,
        service_tag: config.service_tag.clone(),
    };

    // Build app state
    let state = AppState {
        db: pool,
        engine,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state, audit)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict to the extension origin in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
