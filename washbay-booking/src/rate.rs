use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use washbay_core::repository::RateGuard;
use washbay_core::BookingError;

/// Sliding-window attempt counter held in process memory. Suitable for
/// single-instance deployments and tests; multi-instance deployments share a
/// budget through `RedisRateGuard` instead.
pub struct MemoryRateGuard {
    max_attempts: usize,
    window: Duration,
    attempts: Mutex<HashMap<String, Vec<Instant>>>,
}

impl MemoryRateGuard {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts: max_attempts as usize,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateGuard for MemoryRateGuard {
    async fn check(&self, origin: &str) -> Result<bool, BookingError> {
        let mut attempts = self
            .attempts
            .lock()
            .map_err(|_| BookingError::Unavailable("rate guard mutex poisoned".to_string()))?;

        let now = Instant::now();
        let window = self.window;
        let entry = attempts.entry(origin.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < window);
        entry.push(now);

        Ok(entry.len() <= self.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_budget_is_per_origin() {
        let guard = MemoryRateGuard::new(2, Duration::from_secs(60));

        assert!(guard.check("34600111222").await.unwrap());
        assert!(guard.check("34600111222").await.unwrap());
        assert!(!guard.check("34600111222").await.unwrap());

        // A different origin has its own window.
        assert!(guard.check("34600999888").await.unwrap());
    }

    #[tokio::test]
    async fn test_window_expiry_restores_budget() {
        let guard = MemoryRateGuard::new(1, Duration::from_millis(20));

        assert!(guard.check("34600111222").await.unwrap());
        assert!(!guard.check("34600111222").await.unwrap());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(guard.check("34600111222").await.unwrap());
    }
}
