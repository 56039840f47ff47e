use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use engage_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Engagement, EngagementType, InsertOutcome, NewEngagement};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::store::EngineStore;

#[derive(Debug, Clone)]
pub enum EngagementOutcome {
    /// Stored. `author_id` is the post's author, i.e. the payee for any reward.
    Accepted { engagement: Engagement, author_id: Uuid },
    Duplicate,
    RateLimited { retry_after_secs: u64 },
}

impl EngagementOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            EngagementOutcome::Accepted { .. } => "accepted",
            EngagementOutcome::Duplicate => "duplicate",
            EngagementOutcome::RateLimited { .. } => "rate_limited",
        }
    }
}

/// Validates and records single engagement events.
#[derive(Clone)]
pub struct EngagementGuard {
    store: Arc<dyn EngineStore>,
    limiter: Arc<dyn RateLimiter>,
}

impl EngagementGuard {
    pub fn new(store: Arc<dyn EngineStore>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { store, limiter }
    }

    pub async fn record(&self, post_id: Uuid, actor_id: Uuid, kind: EngagementType) -> AppResult<EngagementOutcome> {
        self.record_at(post_id, actor_id, kind, Utc::now()).await
    }

    pub async fn record_at(
        &self,
        post_id: Uuid,
        actor_id: Uuid,
        kind: EngagementType,
        now: DateTime<Utc>,
    ) -> AppResult<EngagementOutcome> {
        let post = self
            .store
            .find_post(post_id)?
            .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "post not found"))?;

        // Cheap pre-check so repeats don't burn rate-limit budget. The insert
        // below is still what decides.
        if self.store.find_engagement(post_id, actor_id, kind)?.is_some() {
            return Ok(EngagementOutcome::Duplicate);
        }

        if let RateDecision::Limited { retry_after_secs } = self.limiter.check(actor_id, kind, now).await? {
            tracing::info!(actor_id = %actor_id, kind = %kind, retry_after_secs, "engagement rate limited");
            return Ok(EngagementOutcome::RateLimited { retry_after_secs });
        }

        let new = NewEngagement {
            post_id,
            actor_id,
            engagement_type: kind,
            created_at: now,
        };
        match self.store.insert_engagement(new)? {
            InsertOutcome::Inserted(engagement) => Ok(EngagementOutcome::Accepted {
                engagement,
                author_id: post.author_id,
            }),
            InsertOutcome::Duplicate => Ok(EngagementOutcome::Duplicate),
        }
    }

    /// Un-like / un-share. Returns false when there was nothing to remove.
    pub fn remove(&self, post_id: Uuid, actor_id: Uuid, kind: EngagementType) -> AppResult<bool> {
        self.store.delete_engagement(post_id, actor_id, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitConfig, WindowLimit};
    use crate::rate_limit::MemoryRateLimiter;
    use crate::services::test_support::{post_by, user};
    use crate::store::MemoryStore;

    fn guard_with(limits: RateLimitConfig) -> (Arc<MemoryStore>, EngagementGuard, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let author = user();
        let post = post_by(author.id);
        let post_id = post.id;
        store.put_user(author).unwrap();
        store.put_post(post).unwrap();
        let guard = EngagementGuard::new(store.clone(), Arc::new(MemoryRateLimiter::new(limits)));
        (store, guard, post_id)
    }

    #[tokio::test]
    async fn second_identical_engagement_is_duplicate() {
        let (store, guard, post_id) = guard_with(RateLimitConfig::default());
        let actor = Uuid::new_v4();

        let first = guard.record(post_id, actor, EngagementType::Like).await.unwrap();
        assert!(matches!(first, EngagementOutcome::Accepted { .. }));
        let second = guard.record(post_id, actor, EngagementType::Like).await.unwrap();
        assert!(matches!(second, EngagementOutcome::Duplicate));
        assert_eq!(store.engagement_count().unwrap(), 1);

        // A different type on the same post is its own engagement.
        let share = guard.record(post_id, actor, EngagementType::Share).await.unwrap();
        assert!(matches!(share, EngagementOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn excess_engagements_are_rate_limited() {
        let limits = RateLimitConfig {
            comment: WindowLimit { per_minute: 2, per_hour: 50 },
            ..RateLimitConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        let author = user();
        let posts: Vec<_> = (0..3).map(|_| post_by(author.id)).collect();
        for p in &posts {
            store.put_post(p.clone()).unwrap();
        }
        store.put_user(author).unwrap();
        let guard = EngagementGuard::new(store.clone(), Arc::new(MemoryRateLimiter::new(limits)));
        let actor = Uuid::new_v4();
        let now = Utc::now();

        let mut outcomes = Vec::new();
        for p in &posts {
            outcomes.push(guard.record_at(p.id, actor, EngagementType::Comment, now).await.unwrap());
        }
        assert!(matches!(outcomes[0], EngagementOutcome::Accepted { .. }));
        assert!(matches!(outcomes[1], EngagementOutcome::Accepted { .. }));
        assert!(matches!(outcomes[2], EngagementOutcome::RateLimited { .. }));
        assert_eq!(store.engagement_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn unknown_post_is_not_found() {
        let (_, guard, _) = guard_with(RateLimitConfig::default());
        let err = guard
            .record(Uuid::new_v4(), Uuid::new_v4(), EngagementType::Like)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::PostNotFound));
    }

    #[tokio::test]
    async fn remove_deletes_once() {
        let (store, guard, post_id) = guard_with(RateLimitConfig::default());
        let actor = Uuid::new_v4();
        guard.record(post_id, actor, EngagementType::Like).await.unwrap();

        assert!(guard.remove(post_id, actor, EngagementType::Like).unwrap());
        assert!(!guard.remove(post_id, actor, EngagementType::Like).unwrap());
        assert_eq!(store.engagement_count().unwrap(), 0);
    }
}
