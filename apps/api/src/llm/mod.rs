/// LLM invocation layer — the single point of entry for all Claude API calls.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// All LLM interactions MUST go through `InvocationEngine::invoke`.
///
/// The layer is built from four pieces:
/// - `credentials`: rank-ordered, read-only pool of API keys (primary + fallbacks)
/// - `classify`: pure rule table mapping raw upstream failures to retryable/terminal
/// - `backoff`: exponential delay schedule with a per-credential retry ceiling
/// - `engine`: the credential × retry orchestration plus the Anthropic wire client
///
/// `extract` recovers a JSON value from free-form model output and is invoked
/// by callers that expect structured data.
pub mod backoff;
pub mod classify;
pub mod credentials;
pub mod engine;
pub mod extract;
