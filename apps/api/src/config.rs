use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Read once at startup; required variables fail fast with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Primary Anthropic API key (credential rank 0).
    pub anthropic_api_key: String,
    /// Fallback API keys tried in order after the primary (ranks 1..N).
    pub anthropic_fallback_api_keys: Vec<String>,
    /// Retries per credential after the first attempt. Default 2.
    pub llm_max_retries: u32,
    /// Exponential backoff base in milliseconds. Default 500.
    pub llm_backoff_base_ms: u64,
    /// Wall-clock timeout for a single upstream call. Default 60s.
    pub llm_request_timeout_secs: u64,
    /// Webhook URL for operational alerts. Alerts are disabled when unset.
    pub alert_webhook_url: Option<String>,
    /// Service identity stamped on audit records and alerts.
    pub service_tag: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            anthropic_fallback_api_keys: std::env::var("ANTHROPIC_FALLBACK_API_KEYS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            llm_max_retries: parse_env_or("LLM_MAX_RETRIES", 2)?,
            llm_backoff_base_ms: parse_env_or("LLM_BACKOFF_BASE_MS", 500)?,
            llm_request_timeout_secs: parse_env_or("LLM_REQUEST_TIMEOUT_SECS", 60)?,
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL").ok(),
            service_tag: std::env::var("SERVICE_TAG")
                .unwrap_or_else(|_| "jobpilot-api".to_string()),
            port: parse_env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' is not a valid value")),
        Err(_) => Ok(default),
    }
}
