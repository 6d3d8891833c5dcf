use async_trait::async_trait;
use redis::RedisResult;

use washbay_core::repository::RateGuard;
use washbay_core::BookingError;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter: INCR + EXPIRE in one atomic pipeline. Returns
    /// whether the caller is still within `limit` for the current window.
    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

/// Redis-backed reservation-attempt guard, shared by every service instance
/// so horizontally-scaled deployments enforce one budget per origin.
pub struct RedisRateGuard {
    client: RedisClient,
    max_attempts: i64,
    window_seconds: i64,
}

impl RedisRateGuard {
    pub fn new(client: RedisClient, max_attempts: u32, window_seconds: u64) -> Self {
        Self {
            client,
            max_attempts: max_attempts as i64,
            window_seconds: window_seconds as i64,
        }
    }
}

#[async_trait]
impl RateGuard for RedisRateGuard {
    async fn check(&self, origin: &str) -> Result<bool, BookingError> {
        let key = format!("ratelimit:reservations:{}", origin);
        self.client
            .check_rate_limit(&key, self.max_attempts, self.window_seconds)
            .await
            .map_err(|e| BookingError::Unavailable(e.to_string()))
    }
}
