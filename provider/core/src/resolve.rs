use thiserror::Error;

/// Translates a function name into the set of endpoints currently
/// advertising it.
///
/// The endpoint set is eventually consistent with the discovery service: an
/// empty result means "no replicas", not "unknown function".
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, function: &str) -> Result<Vec<String>, ResolveError>;

    /// Drops the cached endpoint set for `function`, unsubscribing any
    /// discovery watch before the slot is cleared.
    async fn evict(&self, function: &str);
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("discovery request failed: {0}")]
    Discovery(String),
}
