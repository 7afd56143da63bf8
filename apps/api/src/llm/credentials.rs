//! Credential Pool — rank-ordered upstream API keys, read-only after startup.

use std::fmt;

/// A single upstream API credential. Rank 0 is the primary key; ranks 1..N
/// are fallbacks tried in order when earlier credentials fail terminally.
#[derive(Clone)]
pub struct Credential {
    secret: String,
    pub rank: usize,
}

impl Credential {
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

// Keep secrets out of logs: Debug shows the rank only.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("rank", &self.rank)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Ordered pool of credentials built once from configuration.
/// No mutation operations exist; the pool is shared read-only across requests.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    /// Builds the pool from the primary key plus the fallback list.
    /// Blank entries are skipped; an all-blank configuration yields an empty
    /// pool, which the engine surfaces as a Configuration error on first use.
    pub fn from_config(primary: &str, fallbacks: &[String]) -> Self {
        let credentials = std::iter::once(primary)
            .chain(fallbacks.iter().map(String::as_str))
            .filter(|s| !s.trim().is_empty())
            .enumerate()
            .map(|(rank, secret)| Credential {
                secret: secret.trim().to_string(),
                rank,
            })
            .collect();
        Self { credentials }
    }

    /// Credentials in rank order (primary first).
    pub fn list(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_preserves_rank_order() {
        let pool = CredentialPool::from_config("primary", &["fb1".into(), "fb2".into()]);
        let ranks: Vec<usize> = pool.list().iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert_eq!(pool.list()[0].secret(), "primary");
        assert_eq!(pool.list()[2].secret(), "fb2");
    }

    #[test]
    fn test_blank_entries_are_skipped() {
        let pool = CredentialPool::from_config("primary", &["".into(), "  ".into(), "fb".into()]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.list()[1].secret(), "fb");
        assert_eq!(pool.list()[1].rank, 1);
    }

    #[test]
    fn test_all_blank_configuration_yields_empty_pool() {
        let pool = CredentialPool::from_config("", &[]);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_debug_never_prints_the_secret() {
        let pool = CredentialPool::from_config("sk-ant-very-secret", &[]);
        let rendered = format!("{:?}", pool);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
