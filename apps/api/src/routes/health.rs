use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with the configured service identity.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(health_payload(&state.config.service_tag))
}

fn health_payload(service_tag: &str) -> Value {
    json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": service_tag
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_reports_the_configured_service_tag() {
        let payload = health_payload("jobpilot-staging");
        assert_eq!(payload["service"], "jobpilot-staging");
        assert_eq!(payload["status"], "ok");
    }
}
