//! Identity resolver — maps the extension's opaque `x-api-key` header to a
//! user identity before handlers run.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

/// The resolved caller identity, attached to both the request (for handlers)
/// and the response (for the audit recorder).
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[derive(Debug, sqlx::FromRow)]
struct ApiKeyRow {
    user_id: Uuid,
    active: bool,
}

/// Middleware guarding the generate routes. Missing key → 401, unknown key
/// → 401, deactivated key → 403.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(AppError::MissingApiKey)?;

    let row: Option<ApiKeyRow> =
        sqlx::query_as("SELECT user_id, active FROM api_keys WHERE key = $1")
            .bind(&key)
            .fetch_optional(&state.db)
            .await?;

    let row = row.ok_or(AppError::InvalidApiKey)?;
    if !row.active {
        return Err(AppError::InactiveApiKey);
    }

    // Best-effort usage bookkeeping; a failed touch never fails the request.
    touch_last_used(state.db.clone(), key);

    let user = AuthUser(row.user_id);
    req.extensions_mut().insert(user);
    let mut response = next.run(req).await;
    response.extensions_mut().insert(user);
    Ok(response)
}

fn touch_last_used(db: PgPool, key: String) {
    tokio::spawn(async move {
        let result = sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE key = $1")
            .bind(&key)
            .execute(&db)
            .await;
        if let Err(e) = result {
            warn!("last_used_at update failed: {e}");
        }
    });
}
