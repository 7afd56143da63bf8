#![allow(dead_code)]

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use crate::llm::extract::ExtractionError;

/// Application-level error type.
/// Every failure crossing a component boundary is one of these variants;
/// raw upstream/library errors never reach a handler or the response writer.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Inactive API key")]
    InactiveApiKey,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("AI service error: {0}")]
    AiService(String),

    #[error("AI service timeout: {0}")]
    AiServiceTimeout(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable error code, also consumed by the alert gate.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::MissingApiKey => "MISSING_API_KEY",
            AppError::InvalidApiKey => "UNAUTHORIZED",
            AppError::InactiveApiKey => "INACTIVE_API_KEY",
            AppError::RateLimited(_) => "RATE_LIMITED",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::AiService(_) => "AI_SERVICE_ERROR",
            AppError::AiServiceTimeout(_) => "AI_SERVICE_TIMEOUT",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Extraction(_) => "AI_SERVICE_ERROR",
            AppError::Database(e) if is_connection_error(e) => "DATABASE_CONNECTION_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::MissingApiKey | AppError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            AppError::InactiveApiKey => StatusCode::FORBIDDEN,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::AiService(_) | AppError::Extraction(_) => StatusCode::BAD_GATEWAY,
            AppError::AiServiceTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(e) if is_connection_error(e) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable error name shown in the `error` field of the payload.
    pub fn name(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Validation Error",
            AppError::NotFound(_) => "Not Found",
            AppError::Conflict(_) => "Conflict",
            AppError::MissingApiKey => "Missing API Key",
            AppError::InvalidApiKey => "Unauthorized",
            AppError::InactiveApiKey => "Inactive API Key",
            AppError::RateLimited(_) => "Rate Limited",
            AppError::Configuration(_) => "Configuration Error",
            AppError::AiService(_) | AppError::Extraction(_) => "AI Service Error",
            AppError::AiServiceTimeout(_) => "AI Service Timeout",
            AppError::ServiceUnavailable(_) => "Service Unavailable",
            AppError::Database(e) if is_connection_error(e) => "Database Connection Error",
            AppError::Database(_) => "Database Error",
            AppError::Internal(_) => "Internal Server Error",
        }
    }

    /// Client-safe message. Internal variants hide their cause; the cause is
    /// logged server-side in `into_response`.
    fn client_message(&self) -> String {
        match self {
            AppError::Database(e) if is_connection_error(e) => {
                "The database is temporarily unreachable".to_string()
            }
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
            AppError::Configuration(_) => "The service is misconfigured".to_string(),
            other => other.to_string(),
        }
    }

    /// Optional structured details attached to the payload.
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Extraction(e) => Some(json!({ "strategies": e.strategies_tried() })),
            _ => None,
        }
    }
}

/// Recognizes database errors caused by the connection itself (refused,
/// timed out, host not found, or a Postgres class-08 connection exception)
/// so operators can tell "our bug" from "their network".
pub fn is_connection_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db) => db.code().map(|c| c.starts_with("08")).unwrap_or(false),
        other => {
            let msg = other.to_string().to_lowercase();
            msg.contains("connection refused")
                || msg.contains("timed out")
                || msg.contains("host not found")
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(code = self.code(), "request failed: {self}");
        }

        let mut body = json!({
            "success": false,
            "error": self.name(),
            "errorCode": self.code(),
            "message": self.client_message(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_follows_taxonomy() {
        assert_eq!(
            AppError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::MissingApiKey.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::InactiveApiKey.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::RateLimited("x".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::AiService("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::AiServiceTimeout("x".into()).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::ServiceUnavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_pool_timeout_is_connection_error() {
        let err = AppError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), "DATABASE_CONNECTION_ERROR");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_other_db_errors_stay_internal() {
        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.code(), "DATABASE_ERROR");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_message_is_not_leaked() {
        let err = AppError::Internal(anyhow::anyhow!("connection string leaked"));
        assert!(!err.client_message().contains("leaked"));
    }
}
