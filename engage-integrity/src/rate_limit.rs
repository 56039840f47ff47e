use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Timelike, Utc};
use uuid::Uuid;

use engage_shared::clients::redis::RedisClient;
use engage_shared::errors::{AppError, AppResult};

use crate::config::{RateLimitConfig, WindowLimit};
use crate::models::EngagementType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

/// Fixed-window engagement throttle, one pair of buckets per actor and type.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, actor_id: Uuid, kind: EngagementType, now: DateTime<Utc>) -> AppResult<RateDecision>;

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Bucket keys for the minute and hour windows containing `now`.
///
/// - Per-minute: `rl:engage:{actor}:{type}:min:{YYYYMMDDHHMM}`
/// - Per-hour:   `rl:engage:{actor}:{type}:hr:{YYYYMMDDHH}`
pub fn bucket_keys(actor_id: Uuid, kind: EngagementType, now: DateTime<Utc>) -> (String, String) {
    let kind = kind.as_str().to_lowercase();
    (
        format!("rl:engage:{actor_id}:{kind}:min:{}", now.format("%Y%m%d%H%M")),
        format!("rl:engage:{actor_id}:{kind}:hr:{}", now.format("%Y%m%d%H")),
    )
}

fn secs_left_in_minute(now: DateTime<Utc>) -> u64 {
    60 - u64::from(now.second())
}

fn secs_left_in_hour(now: DateTime<Utc>) -> u64 {
    3600 - u64::from(now.minute() * 60 + now.second())
}

fn decide(limit: WindowLimit, minute_count: u64, hour_count: Option<u64>, now: DateTime<Utc>) -> RateDecision {
    if minute_count > limit.per_minute {
        return RateDecision::Limited { retry_after_secs: secs_left_in_minute(now) };
    }
    match hour_count {
        Some(count) if count > limit.per_hour => {
            RateDecision::Limited { retry_after_secs: secs_left_in_hour(now) }
        }
        _ => RateDecision::Allowed,
    }
}

pub struct RedisRateLimiter {
    redis: RedisClient,
    limits: RateLimitConfig,
}

impl RedisRateLimiter {
    pub fn new(redis: RedisClient, limits: RateLimitConfig) -> Self {
        Self { redis, limits }
    }
}

#[async_trait::async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, actor_id: Uuid, kind: EngagementType, now: DateTime<Utc>) -> AppResult<RateDecision> {
        let limit = self.limits.for_type(kind);
        let (minute_key, hour_key) = bucket_keys(actor_id, kind, now);

        let minute_count = self.redis.incr_window(&minute_key, 60).await.map_err(|e| {
            tracing::error!(error = %e, "redis incr failed for minute key");
            AppError::internal("rate limiter unavailable")
        })?;
        if minute_count > limit.per_minute {
            return Ok(decide(limit, minute_count, None, now));
        }

        let hour_count = self.redis.incr_window(&hour_key, 3600).await.map_err(|e| {
            tracing::error!(error = %e, "redis incr failed for hour key");
            AppError::internal("rate limiter unavailable")
        })?;

        Ok(decide(limit, minute_count, Some(hour_count), now))
    }

    async fn is_healthy(&self) -> bool {
        self.redis.ping().await.is_ok()
    }
}

/// Same bucket scheme as [`RedisRateLimiter`], counted in process.
pub struct MemoryRateLimiter {
    limits: RateLimitConfig,
    buckets: Mutex<HashMap<String, u64>>,
}

impl MemoryRateLimiter {
    pub fn new(limits: RateLimitConfig) -> Self {
        Self {
            limits,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn bump(buckets: &mut HashMap<String, u64>, key: String) -> u64 {
        let count = buckets.entry(key).or_insert(0);
        *count += 1;
        *count
    }
}

#[async_trait::async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, actor_id: Uuid, kind: EngagementType, now: DateTime<Utc>) -> AppResult<RateDecision> {
        let limit = self.limits.for_type(kind);
        let (minute_key, hour_key) = bucket_keys(actor_id, kind, now);
        let hour_stamp = now.format("%Y%m%d%H").to_string();

        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| AppError::internal("rate limiter lock poisoned"))?;
        // Drop buckets from earlier hours.
        buckets.retain(|key, _| key.contains(&hour_stamp));

        let minute_count = Self::bump(&mut buckets, minute_key);
        if minute_count > limit.per_minute {
            return Ok(decide(limit, minute_count, None, now));
        }
        let hour_count = Self::bump(&mut buckets, hour_key);
        Ok(decide(limit, minute_count, Some(hour_count), now))
    }
}
