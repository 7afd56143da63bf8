//! Failure Classifier — pure, data-driven mapping from a raw upstream
//! failure to `{retryable, kind}`.
//!
//! Rules live in an ordered table (first match wins) so a new upstream
//! provider is supported by adding rows, not by branching logic. The
//! classifier performs no I/O and touches no shared state.

use serde::Serialize;

/// Normalized failure kind produced by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    RateLimited,
    Overloaded,
    Timeout,
    Unauthorized,
    Configuration,
    Unknown,
}

/// A raw upstream failure as observed at the wire: free-form message plus
/// whatever status/code the provider happened to include.
#[derive(Debug, Clone)]
pub struct RawFailure {
    pub message: String,
    pub http_status: Option<u16>,
    pub code: Option<String>,
}

impl RawFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            http_status: None,
            code: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            http_status: Some(status),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            http_status: None,
            code: Some(code.into()),
        }
    }
}

/// Classification outcome: whether the same credential is worth retrying
/// after a delay, and the normalized kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub retryable: bool,
    pub kind: ErrorKind,
}

struct Rule {
    matches: fn(&RawFailure, &str, &str) -> bool,
    retryable: bool,
    kind: ErrorKind,
}

// Ordered rule table. Predicates receive the failure plus its lowercased
// message and code so each rule stays a one-liner.
static RULES: &[Rule] = &[
    Rule {
        matches: |f, msg, _| {
            f.http_status == Some(429) || msg.contains("rate limit") || msg.contains("quota")
        },
        retryable: true,
        kind: ErrorKind::RateLimited,
    },
    Rule {
        matches: |f, msg, code| {
            matches!(f.http_status, Some(500) | Some(502) | Some(503))
                || code == "overloaded_error"
                || msg.contains("overloaded")
                || msg.contains("service unavailable")
                || msg.contains("try again later")
                || msg.contains("temporarily unavailable")
        },
        retryable: true,
        kind: ErrorKind::Overloaded,
    },
    Rule {
        matches: |_, msg, _| msg.contains("timeout") || msg.contains("timed out"),
        retryable: true,
        kind: ErrorKind::Timeout,
    },
    Rule {
        matches: |f, msg, code| {
            matches!(f.http_status, Some(401) | Some(403))
                || code == "authentication_error"
                || code == "permission_error"
                || msg.contains("invalid x-api-key")
                || msg.contains("invalid api key")
                || msg.contains("permission denied")
                || msg.contains("unauthorized")
        },
        retryable: false,
        kind: ErrorKind::Unauthorized,
    },
    Rule {
        matches: |_, msg, code| code == "configuration_error" || msg.contains("not configured"),
        retryable: false,
        kind: ErrorKind::Configuration,
    },
];

/// Classifies a raw failure. Deterministic: same input, same output.
pub fn classify(failure: &RawFailure) -> Classification {
    let msg = failure.message.to_lowercase();
    let code = failure
        .code
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();

    for rule in RULES {
        if (rule.matches)(failure, &msg, &code) {
            return Classification {
                retryable: rule.retryable,
                kind: rule.kind,
            };
        }
    }

    Classification {
        retryable: false,
        kind: ErrorKind::Unknown,
    }
}
