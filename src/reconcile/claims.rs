//! Run-scoped namespace claims.

use dashmap::DashSet;
use std::sync::Arc;

/// The set of namespaces already taken by a worker during one batch.
///
/// Cloning shares the underlying set. A fresh value is created per batch so
/// claims never leak between runs.
#[derive(Debug, Clone, Default)]
pub struct NamespaceClaims {
    claimed: Arc<DashSet<String>>,
}

impl NamespaceClaims {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a namespace. Returns `false` if another caller already holds it.
    ///
    /// The check and the insert happen as one step.
    pub fn claim(&self, namespace: &str) -> bool {
        self.claimed.insert(namespace.to_string())
    }

    #[must_use]
    pub fn is_claimed(&self, namespace: &str) -> bool {
        self.claimed.contains(namespace)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_second_claim_is_refused() {
        let claims = NamespaceClaims::new();
        assert!(claims.claim("visits-dev"));
        assert!(!claims.claim("visits-dev"));
        assert!(claims.claim("visits-prod"));
        assert_eq!(claims.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_claims_have_one_winner() {
        let claims = NamespaceClaims::new();
        let winners = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let claims = claims.clone();
                let winners = Arc::clone(&winners);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    if claims.claim("shared-ns") {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(claims.is_claimed("shared-ns"));
    }
}
