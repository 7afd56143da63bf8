use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::llm::engine::InvocationEngine;

/// Shared application state injected into all route handlers via Axum
/// extractors. Everything here is read-only or internally synchronized.
/// The alert dispatcher lives in `AuditContext` instead: alerting is driven
/// by the audit pipeline, not by handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// The invocation engine: credential pool, backoff policy, wire client.
    pub engine: Arc<InvocationEngine>,
    pub config: Config,
}
