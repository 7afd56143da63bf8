//! Audit storage — the persisted record shape and the Postgres sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// One persisted request/response cycle. Constructed once after the response
/// is produced; never mutated (soft deletion is an external concern).
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub request_id: Uuid,
    pub user_id: Option<Uuid>,
    pub service_tag: String,
    pub http_method: String,
    pub path: String,
    pub status_code: i16,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub sanitized_request_body: Option<serde_json::Value>,
    pub sanitized_response_body: Option<serde_json::Value>,
    pub sanitized_headers: serde_json::Value,
    pub duration_ms: i64,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Where audit records go. Production inserts into Postgres; tests swap in
/// an in-memory sink.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn insert(&self, record: &AuditRecord) -> anyhow::Result<()>;
}

pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn insert(&self, record: &AuditRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (request_id, user_id, service_tag, http_method, path, status_code,
                 error_code, error_message, sanitized_request_body,
                 sanitized_response_body, sanitized_headers, duration_ms,
                 client_ip, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(record.request_id)
        .bind(record.user_id)
        .bind(&record.service_tag)
        .bind(&record.http_method)
        .bind(&record.path)
        .bind(record.status_code)
        .bind(&record.error_code)
        .bind(&record.error_message)
        .bind(&record.sanitized_request_body)
        .bind(&record.sanitized_response_body)
        .bind(&record.sanitized_headers)
        .bind(record.duration_ms)
        .bind(&record.client_ip)
        .bind(&record.user_agent)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
