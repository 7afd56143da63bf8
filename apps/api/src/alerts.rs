//! Alert Dispatcher — best-effort webhook notification for outcomes that
//! require operator attention. A failed dispatch is logged, never surfaced.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

/// Error codes that warrant a notification even independent of HTTP status.
const ATTENTION_CODES: &[&str] = &[
    "DATABASE_ERROR",
    "DATABASE_CONNECTION_ERROR",
    "CONFIGURATION_ERROR",
    "AI_SERVICE_ERROR",
    "SERVICE_UNAVAILABLE",
];

const MAX_MESSAGE_CHARS: usize = 200;
const MAX_PATH_CHARS: usize = 120;
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether an outcome is severe enough to notify a human: 5xx, or one of the
/// attention-worthy error codes. Client errors (4xx) never alert.
pub fn requires_attention(status: u16, error_code: Option<&str>) -> bool {
    if (400..500).contains(&status) {
        return false;
    }
    if status >= 500 {
        return true;
    }
    error_code
        .map(|c| ATTENTION_CODES.contains(&c))
        .unwrap_or(false)
}

/// Where attention-worthy outcomes get pushed. Production uses the webhook
/// `AlertDispatcher`; tests swap in a counting channel to observe gating.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Pushes a condensed notification. Best-effort: implementations must
    /// never propagate a failure.
    async fn dispatch(&self, error_code: &str, message: &str, user_id: Option<Uuid>, path: &str);
}

pub struct AlertDispatcher {
    webhook_url: Option<String>,
    http: reqwest::Client,
    service_tag: String,
}

impl AlertDispatcher {
    pub fn new(webhook_url: Option<String>, service_tag: impl Into<String>) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()
                .unwrap_or_default(),
            service_tag: service_tag.into(),
        }
    }
}

#[async_trait]
impl AlertChannel for AlertDispatcher {
    /// No retry; missing configuration or a send failure only logs.
    async fn dispatch(&self, error_code: &str, message: &str, user_id: Option<Uuid>, path: &str) {
        let Some(url) = &self.webhook_url else {
            debug!("alert webhook not configured; dropping alert {error_code}");
            return;
        };

        let text = format_alert(&self.service_tag, error_code, message, user_id, path);
        match self.http.post(url).json(&json!({ "text": text })).send().await {
            Ok(res) if res.status().is_success() => {
                debug!("alert dispatched: {error_code}");
            }
            Ok(res) => {
                warn!("alert webhook returned {}: {error_code}", res.status());
            }
            Err(e) => {
                warn!("alert dispatch failed: {e}");
            }
        }
    }
}

/// Condensed, length-capped alert line: tag, code, truncated message,
/// user (or "anonymous"), truncated path. Kept skimmable on purpose.
fn format_alert(
    service_tag: &str,
    error_code: &str,
    message: &str,
    user_id: Option<Uuid>,
    path: &str,
) -> String {
    let user = user_id
        .map(|u| u.to_string())
        .unwrap_or_else(|| "anonymous".to_string());
    format!(
        "[{service_tag}] {error_code}: {} | user={user} | path={}",
        truncate(message, MAX_MESSAGE_CHARS),
        truncate(path, MAX_PATH_CHARS),
    )
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_never_require_attention() {
        for status in [400u16, 401, 403, 404, 409, 422, 429, 499] {
            assert!(
                !requires_attention(status, Some("AI_SERVICE_ERROR")),
                "status {status} must not alert"
            );
        }
    }

    #[test]
    fn test_server_errors_always_require_attention() {
        for status in [500u16, 502, 503, 504] {
            assert!(requires_attention(status, None));
        }
    }

    #[test]
    fn test_attention_codes_alert_independent_of_status() {
        assert!(requires_attention(200, Some("DATABASE_CONNECTION_ERROR")));
        assert!(requires_attention(200, Some("CONFIGURATION_ERROR")));
        assert!(!requires_attention(200, Some("VALIDATION_ERROR")));
        assert!(!requires_attention(200, None));
    }

    #[test]
    fn test_alert_line_contains_the_essentials() {
        let user = Uuid::new_v4();
        let line = format_alert(
            "jobpilot-api",
            "AI_SERVICE_ERROR",
            "upstream exploded",
            Some(user),
            "/api/v1/generate/answer",
        );
        assert!(line.contains("jobpilot-api"));
        assert!(line.contains("AI_SERVICE_ERROR"));
        assert!(line.contains("upstream exploded"));
        assert!(line.contains(&user.to_string()));
        assert!(line.contains("/api/v1/generate/answer"));
    }

    #[test]
    fn test_anonymous_user_and_long_message_are_handled() {
        let long = "e".repeat(500);
        let line = format_alert("jobpilot-api", "INTERNAL_ERROR", &long, None, "/x");
        assert!(line.contains("user=anonymous"));
        assert!(line.len() < 400);
    }

    #[tokio::test]
    async fn test_dispatch_without_webhook_is_a_quiet_noop() {
        let dispatcher = AlertDispatcher::new(None, "jobpilot-api");
        // Must not panic or block.
        dispatcher.dispatch("INTERNAL_ERROR", "boom", None, "/x").await;
    }
}
