//! Shared key-value facility used for cross-instance agreement and buffering.
//!
//! Anything that offers scalar get/set with TTL, hash fields, a score-ordered
//! set, a blocking list and a TTL-bounded exclusive lock can back the service.
//! Redis does in production; [`in_memory::InMemoryCoordinationStore`] stands in
//! for single-process runs and tests.

use anyhow::{Context, Result};
use std::time::Duration;

pub mod in_memory;
pub mod store_redis;

#[async_trait::async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// One value per requested field, in request order, in a single round trip.
    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()>;

    /// Members with `min <= score < max_exclusive`; `None` bounds are open.
    async fn zrange_by_score(
        &self,
        key: &str,
        min: Option<f64>,
        max_exclusive: Option<f64>,
    ) -> Result<Vec<String>>;

    async fn rpush(&self, key: &str, value: &str) -> Result<()>;

    /// Pops the head of the list, waiting at most `wait` for one to appear.
    async fn blpop(&self, key: &str, wait: Duration) -> Result<Option<String>>;

    async fn llen(&self, key: &str) -> Result<u64>;

    /// Set-if-absent with expiry. `Ok(false)` means another owner holds it.
    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Releases the lock only if `owner` still holds it.
    async fn unlock(&self, key: &str, owner: &str) -> Result<()>;

    async fn get_timestamp(&self, key: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        let parsed = chrono::DateTime::parse_from_rfc3339(&raw)
            .with_context(|| format!("invalid timestamp under {}: {}", key, raw))?;
        Ok(Some(parsed.with_timezone(&chrono::Utc)))
    }

    async fn set_timestamp(&self, key: &str, at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        self.set(key, &at.to_rfc3339(), None).await
    }
}
