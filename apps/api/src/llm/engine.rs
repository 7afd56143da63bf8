//! Invocation Engine — orchestrates Credential Pool × Backoff Scheduler ×
//! Failure Classifier into one call: `invoke`.
//!
//! Attempts are strictly sequential (never raced) so the upstream provider
//! is billed at most once per successful invocation. A retryable failure
//! retries the same credential up to `max_retries` times with backoff; a
//! terminal failure advances to the next credential immediately. Every
//! credential gets its turn even after a terminal failure on an earlier one,
//! since fallback keys may carry different authorization or quota state.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::llm::backoff::BackoffPolicy;
use crate::llm::classify::{classify, Classification, ErrorKind, RawFailure};
use crate::llm::credentials::{Credential, CredentialPool};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls. Intentionally hardcoded to prevent drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;

/// System suffix applied when the caller expects a machine-readable payload.
const STRUCTURED_OUTPUT_SYSTEM: &str =
    "Respond with a single valid JSON object and no surrounding prose.";

/// A successful upstream completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Seam between the engine and the wire. Production uses `AnthropicClient`;
/// tests script failures against this trait.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn complete(
        &self,
        credential: &Credential,
        prompt: &str,
        requires_structured_output: bool,
    ) -> Result<Completion, RawFailure>;
}

// ────────────────────────────────────────────────────────────────────────────
// Anthropic wire client
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: String,
}

/// Production wire client for the Anthropic Messages API.
/// Stateless beyond the shared reqwest connection pool; the credential is
/// supplied per call, never stored.
pub struct AnthropicClient {
    http: Client,
}

impl AnthropicClient {
    /// `request_timeout` bounds one wire call end to end so a hung upstream
    /// cannot stall a request handler indefinitely.
    pub fn new(request_timeout: std::time::Duration) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl UpstreamClient for AnthropicClient {
    async fn complete(
        &self,
        credential: &Credential,
        prompt: &str,
        requires_structured_output: bool,
    ) -> Result<Completion, RawFailure> {
        let system = if requires_structured_output {
            STRUCTURED_OUTPUT_SYSTEM
        } else {
            ""
        };
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", credential.secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RawFailure::new(format!("upstream call timed out: {e}"))
                } else {
                    RawFailure::new(format!("HTTP error: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Prefer the provider's structured error; fall back to raw body.
            let (code, message) = match serde_json::from_str::<AnthropicError>(&body) {
                Ok(parsed) => (parsed.error.error_type, parsed.error.message),
                Err(_) => (None, body),
            };
            return Err(RawFailure {
                message,
                http_status: Some(status.as_u16()),
                code,
            });
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| RawFailure::new(format!("malformed upstream response: {e}")))?;

        let text = parsed
            .content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.clone())
            .ok_or_else(|| RawFailure::new("upstream returned empty content"))?;

        Ok(Completion {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

/// The engine: one `invoke` call yields one completion or one normalized
/// `AppError`. Shared across requests behind an `Arc`; holds no mutable state.
pub struct InvocationEngine {
    pool: CredentialPool,
    policy: BackoffPolicy,
    upstream: Arc<dyn UpstreamClient>,
}

impl InvocationEngine {
    pub fn new(pool: CredentialPool, policy: BackoffPolicy, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            pool,
            policy,
            upstream,
        }
    }

    /// Calls the upstream provider, rotating credentials and retrying per the
    /// backoff policy. Performs at most `pool.len() * (max_retries + 1)` wire
    /// calls before giving up.
    pub async fn invoke(
        &self,
        prompt: &str,
        service_tag: &str,
        requires_structured_output: bool,
    ) -> Result<Completion, AppError> {
        if self.pool.is_empty() {
            return Err(AppError::Configuration(
                "no upstream API credentials configured".to_string(),
            ));
        }

        let mut last: Option<(Classification, String)> = None;

        for credential in self.pool.list() {
            for attempt in 0..=self.policy.max_retries {
                if attempt > 0 {
                    let delay = self.policy.next_delay(attempt);
                    debug!(
                        rank = credential.rank,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }

                let started = Instant::now();
                match self
                    .upstream
                    .complete(credential, prompt, requires_structured_output)
                    .await
                {
                    Ok(completion) => {
                        info!(
                            service = service_tag,
                            rank = credential.rank,
                            attempt,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            input_tokens = completion.input_tokens,
                            output_tokens = completion.output_tokens,
                            "LLM call succeeded"
                        );
                        return Ok(completion);
                    }
                    Err(failure) => {
                        let classification = classify(&failure);
                        warn!(
                            service = service_tag,
                            rank = credential.rank,
                            attempt,
                            retryable = classification.retryable,
                            kind = ?classification.kind,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "LLM call failed: {}",
                            failure.message
                        );
                        last = Some((classification, failure.message));
                        if !classification.retryable {
                            // Terminal on this credential; the next one may
                            // still have different authorization/quota state.
                            break;
                        }
                    }
                }
            }
        }

        match last {
            Some((classification, message)) => Err(normalize_failure(classification.kind, message)),
            // Unreachable with a non-empty pool, but keep the exit total.
            None => Err(AppError::Configuration(
                "no upstream API credentials configured".to_string(),
            )),
        }
    }
}

/// Converts the final classification of an exhausted invocation into the
/// canonical error shape. Upstream-credential problems surface as 502 — the
/// caller's own request was fine; our deployment is what failed.
fn normalize_failure(kind: ErrorKind, message: String) -> AppError {
    match kind {
        ErrorKind::RateLimited => AppError::RateLimited(message),
        ErrorKind::Overloaded => AppError::ServiceUnavailable(message),
        ErrorKind::Timeout => AppError::AiServiceTimeout(message),
        ErrorKind::Configuration => AppError::Configuration(message),
        ErrorKind::Unauthorized | ErrorKind::Unknown => AppError::AiService(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted upstream: pops one result per call, records which credential
    /// served each call, and asserts calls are never concurrent.
    struct ScriptedUpstream {
        script: Mutex<Vec<Result<Completion, RawFailure>>>,
        calls: Mutex<Vec<usize>>, // credential rank per call
        in_flight: AtomicU32,
        max_in_flight: AtomicU32,
    }

    impl ScriptedUpstream {
        fn new(script: Vec<Result<Completion, RawFailure>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicU32::new(0),
                max_in_flight: AtomicU32::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl UpstreamClient for ScriptedUpstream {
        async fn complete(
            &self,
            credential: &Credential,
            _prompt: &str,
            _structured: bool,
        ) -> Result<Completion, RawFailure> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::task::yield_now().await;

            self.calls.lock().unwrap().push(credential.rank);
            let result = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() {
                    Err(RawFailure::new("script exhausted"))
                } else {
                    script.remove(0)
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn completion(text: &str) -> Completion {
        Completion {
            text: text.to_string(),
            input_tokens: 10,
            output_tokens: 20,
        }
    }

    fn overloaded() -> RawFailure {
        RawFailure::with_status("overloaded", 503)
    }

    fn engine(script: Vec<Result<Completion, RawFailure>>, keys: usize) -> (InvocationEngine, Arc<ScriptedUpstream>) {
        let fallbacks: Vec<String> = (1..keys).map(|i| format!("key-{i}")).collect();
        let pool = CredentialPool::from_config("key-0", &fallbacks);
        let upstream = ScriptedUpstream::new(script);
        let policy = BackoffPolicy::new(Duration::from_millis(500), 2);
        (
            InvocationEngine::new(pool, policy, upstream.clone()),
            upstream,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_overloaded_primary_falls_back_to_secondary() {
        // Credential A always 503; B succeeds first try.
        let (eng, upstream) = engine(
            vec![
                Err(overloaded()),
                Err(overloaded()),
                Err(overloaded()),
                Ok(completion("from B")),
            ],
            2,
        );

        let out = eng.invoke("hi", "test", false).await.unwrap();
        assert_eq!(out.text, "from B");
        // maxRetries+1 = 3 failed attempts on A, then 1 on B.
        assert_eq!(upstream.call_count(), 4);
        assert_eq!(*upstream.calls.lock().unwrap(), vec![0, 0, 0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_does_not_retry_same_credential() {
        // Single credential returning 401: exactly one attempt, no retries.
        let (eng, upstream) = engine(
            vec![Err(RawFailure::with_status("invalid x-api-key", 401))],
            1,
        );

        let err = eng.invoke("hi", "test", false).await.unwrap_err();
        assert_eq!(upstream.call_count(), 1);
        assert_eq!(err.code(), "AI_SERVICE_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_still_advances_to_next_credential() {
        // A is unauthorized, but B may have different quota state — it runs.
        let (eng, upstream) = engine(
            vec![
                Err(RawFailure::with_status("invalid x-api-key", 401)),
                Ok(completion("from B")),
            ],
            2,
        );

        let out = eng.invoke("hi", "test", false).await.unwrap();
        assert_eq!(out.text, "from B");
        assert_eq!(*upstream.calls.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_is_bounded() {
        // 3 credentials × (2 retries + 1) = 9 attempts max.
        let script: Vec<Result<Completion, RawFailure>> =
            (0..20).map(|_| Err(overloaded())).collect();
        let (eng, upstream) = engine(script, 3);

        let err = eng.invoke("hi", "test", false).await.unwrap_err();
        assert_eq!(upstream.call_count(), 9);
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_never_concurrent() {
        let script: Vec<Result<Completion, RawFailure>> =
            (0..5).map(|_| Err(overloaded())).collect();
        let mut full = script;
        full.push(Ok(completion("done")));
        let (eng, upstream) = engine(full, 2);

        eng.invoke("hi", "test", false).await.unwrap();
        assert_eq!(upstream.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_maps_to_429() {
        let script: Vec<Result<Completion, RawFailure>> = (0..3)
            .map(|_| Err(RawFailure::with_status("rate limit exceeded", 429)))
            .collect();
        let (eng, _) = engine(script, 1);

        let err = eng.invoke("hi", "test", false).await.unwrap_err();
        assert_eq!(err.code(), "RATE_LIMITED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_exhaustion_maps_to_504() {
        let script: Vec<Result<Completion, RawFailure>> = (0..3)
            .map(|_| Err(RawFailure::new("upstream call timed out")))
            .collect();
        let (eng, _) = engine(script, 1);

        let err = eng.invoke("hi", "test", false).await.unwrap_err();
        assert_eq!(err.code(), "AI_SERVICE_TIMEOUT");
    }

    #[tokio::test]
    async fn test_empty_pool_is_an_immediate_configuration_error() {
        let pool = CredentialPool::from_config("", &[]);
        let upstream = ScriptedUpstream::new(vec![]);
        let eng = InvocationEngine::new(pool, BackoffPolicy::default(), upstream.clone());

        let err = eng.invoke("hi", "test", false).await.unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
        assert_eq!(upstream.call_count(), 0);
    }
}
