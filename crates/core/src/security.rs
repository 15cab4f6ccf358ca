//! Chain-watcher health tracking, consumed by the API's `GET /healthz`
//! route (SPEC_FULL.md §6.3, §6.4).

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::RwLock;

/// Per-chain connectivity health, as last reported by a `ChainWatcher` task.
#[derive(Debug, Clone)]
pub struct ChainHealth {
    pub is_healthy: bool,
    pub last_success: Option<Instant>,
    pub last_failure: Option<Instant>,
    pub consecutive_failures: u32,
    pub latency_ms: Option<u64>,
}

/// Tracks connectivity health for every chain the node watches.
#[derive(Default)]
pub struct HealthChecker {
    chain_health: RwLock<HashMap<String, ChainHealth>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_success(&self, chain_id: &str, latency_ms: u64) {
        let mut health = self.chain_health.write().await;
        let chain_health = health.entry(chain_id.to_string()).or_insert_with(|| ChainHealth {
            is_healthy: true,
            last_success: None,
            last_failure: None,
            consecutive_failures: 0,
            latency_ms: None,
        });

        chain_health.is_healthy = true;
        chain_health.last_success = Some(Instant::now());
        chain_health.consecutive_failures = 0;
        chain_health.latency_ms = Some(latency_ms);
    }

    pub async fn record_failure(&self, chain_id: &str) {
        let mut health = self.chain_health.write().await;
        let chain_health = health.entry(chain_id.to_string()).or_insert_with(|| ChainHealth {
            is_healthy: true,
            last_success: None,
            last_failure: None,
            consecutive_failures: 0,
            latency_ms: None,
        });

        chain_health.last_failure = Some(Instant::now());
        chain_health.consecutive_failures += 1;

        // Mark as unhealthy after 3 consecutive failures.
        if chain_health.consecutive_failures >= 3 {
            chain_health.is_healthy = false;
        }
    }

    pub async fn get_all_health(&self) -> HashMap<String, ChainHealth> {
        self.chain_health.read().await.clone()
    }

    pub async fn is_healthy(&self, chain_id: &str) -> bool {
        match self.chain_health.read().await.get(chain_id) {
            Some(health) => health.is_healthy,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unhealthy_after_three_consecutive_failures() {
        let checker = HealthChecker::new();
        assert!(checker.is_healthy("ethereum").await);

        for _ in 0..2 {
            checker.record_failure("ethereum").await;
            assert!(checker.is_healthy("ethereum").await);
        }
        checker.record_failure("ethereum").await;
        assert!(!checker.is_healthy("ethereum").await);

        checker.record_success("ethereum", 42).await;
        assert!(checker.is_healthy("ethereum").await);
    }
}
