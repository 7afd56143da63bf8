//! Audit Recorder — axum middleware that captures each request/response
//! pair and persists a sanitized record without delaying the client.
//!
//! The middleware buffers both bodies (wrap-and-forward, capped), lets the
//! handler run, then hands the captured exchange to a spawned task for
//! sanitization, persistence, and alerting. A failed audit write is
//! invisible to the client.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::alerts::{requires_attention, AlertChannel};
use crate::audit::sanitize::{sanitize_headers, sanitize_value};
use crate::audit::store::{AuditRecord, AuditSink};
use crate::auth::AuthUser;

/// Cap on the audit copy of a body. The exchange itself is always forwarded
/// in full; only what the recorder keeps is bounded.
const MAX_CAPTURE_BYTES: usize = 256 * 1024;

/// Everything the recorder needs, independent of the main `AppState` so the
/// middleware can be exercised without a database handle.
#[derive(Clone)]
pub struct AuditContext {
    pub sink: Arc<dyn AuditSink>,
    pub alerts: Arc<dyn AlertChannel>,
    pub service_tag: String,
}

pub async fn audit_middleware(
    State(ctx): State<AuditContext>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let headers = req.headers().clone();
    let client_ip = extract_client_ip(&headers);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (parts, body) = req.into_parts();
    // Buffer the whole body and forward it unchanged; only the audit copy is
    // capped. Capture must never alter the client-visible exchange.
    let request_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("audit: failed to buffer request body: {e}");
            Bytes::new()
        }
    };
    let request_capture = request_bytes.slice(..request_bytes.len().min(MAX_CAPTURE_BYTES));
    let req = Request::from_parts(parts, Body::from(request_bytes));

    let response = next.run(req).await;

    let duration_ms = started.elapsed().as_millis() as i64;
    let status_code = response.status().as_u16();
    // The identity resolver stamps the resolved user onto the response.
    let user_id = response.extensions().get::<AuthUser>().map(|u| u.0);

    let (parts, body) = response.into_parts();
    let response_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("audit: failed to buffer response body: {e}");
            Bytes::new()
        }
    };
    let response_capture = response_bytes.slice(..response_bytes.len().min(MAX_CAPTURE_BYTES));
    let response = Response::from_parts(parts, Body::from(response_bytes));

    // Sanitize and persist off the response path. The spawned task owns the
    // captured bytes; nothing here can add client-perceived latency.
    tokio::spawn(async move {
        let record = build_record(
            &ctx.service_tag,
            user_id,
            method,
            path,
            status_code,
            &headers,
            &request_capture,
            &response_capture,
            duration_ms,
            client_ip,
            user_agent,
        );

        if let Err(e) = ctx.sink.insert(&record).await {
            warn!(request_id = %record.request_id, "audit insert failed: {e}");
        }

        if requires_attention(status_code, record.error_code.as_deref()) {
            ctx.alerts
                .dispatch(
                    record.error_code.as_deref().unwrap_or("UNKNOWN"),
                    record.error_message.as_deref().unwrap_or(""),
                    record.user_id,
                    &record.path,
                )
                .await;
        }
    });

    response
}

#[allow(clippy::too_many_arguments)]
fn build_record(
    service_tag: &str,
    user_id: Option<Uuid>,
    method: String,
    path: String,
    status_code: u16,
    headers: &HeaderMap,
    request_bytes: &Bytes,
    response_bytes: &Bytes,
    duration_ms: i64,
    client_ip: Option<String>,
    user_agent: Option<String>,
) -> AuditRecord {
    let sanitized_request_body = body_to_value(request_bytes).map(|v| sanitize_value(&v));
    let sanitized_response_body = body_to_value(response_bytes).map(|v| sanitize_value(&v));
    let (error_code, error_message) =
        derive_error_fields(status_code, sanitized_response_body.as_ref());

    AuditRecord {
        request_id: Uuid::new_v4(),
        user_id,
        service_tag: service_tag.to_string(),
        http_method: method,
        path,
        status_code: status_code as i16,
        error_code,
        error_message,
        sanitized_request_body,
        sanitized_response_body,
        sanitized_headers: sanitize_headers(headers),
        duration_ms,
        client_ip,
        user_agent,
        created_at: Utc::now(),
    }
}

/// Captured body → JSON value: parsed JSON when possible, the raw text
/// otherwise (the sanitizer truncates it), nothing when empty.
fn body_to_value(bytes: &Bytes) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
    }
}

/// For error responses, pulls `errorCode`/`error_code` and `message`/`error`
/// out of the body; synthesizes `HTTP_<status>` when no explicit code exists.
fn derive_error_fields(
    status: u16,
    body: Option<&Value>,
) -> (Option<String>, Option<String>) {
    if status < 400 {
        return (None, None);
    }

    let explicit_code = body.and_then(|b| {
        b.get("errorCode")
            .or_else(|| b.get("error_code"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    let message = body.and_then(|b| {
        b.get("message")
            .or_else(|| b.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    (
        Some(explicit_code.unwrap_or_else(|| format!("HTTP_{status}"))),
        message,
    )
}

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
}
