//! The engine's public operation set, composed from the individual components
//! over one injected store.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use engage_shared::errors::AppResult;
use engage_shared::types::api::HealthCheck;
use engage_shared::types::pagination::{Paginated, PaginationParams};

use crate::config::PolicyConfig;
use crate::events::{publisher, EventSink, LogSink};
use crate::models::{AdminAction, CreatorWarning, EngagementType, FlagStatus, FlaggedContent, User, WarningSummary};
use crate::rate_limit::{MemoryRateLimiter, RateLimiter};
use crate::services::collaborators::{EmailAndPhoneVerified, MembershipDirectory, TierTable, VerificationGate};
use crate::services::earnings::{EarningsCalculator, EarningsSummary, SettlementResult};
use crate::services::engagement_guard::{EngagementGuard, EngagementOutcome};
use crate::services::flag_review::{FlagReview, ReviewOutcome};
use crate::services::mode_config::{ModeConfigProvider, ModeSnapshot, StoreModeConfig};
use crate::services::settlement::{SettlementJob, SweepReport};
use crate::services::trust::{IssuedWarning, TrustLedger};
use crate::store::EngineStore;

/// Result of the combined engage-then-settle path.
#[derive(Debug, Clone)]
pub struct EngageResult {
    pub outcome: EngagementOutcome,
    /// `None` when nothing was settled: rejected engagement, self-engagement,
    /// or a settlement error (logged, never propagated).
    pub settlement: Option<SettlementResult>,
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn EngineStore>,
    limiter: Arc<dyn RateLimiter>,
    sink: Arc<dyn EventSink>,
    modes: Arc<dyn ModeConfigProvider>,
    guard: EngagementGuard,
    earnings: EarningsCalculator,
    flags: FlagReview,
    trust: TrustLedger,
    settlement: SettlementJob,
}

pub struct EngineBuilder {
    store: Arc<dyn EngineStore>,
    policy: PolicyConfig,
    limiter: Option<Arc<dyn RateLimiter>>,
    sink: Option<Arc<dyn EventSink>>,
    modes: Option<Arc<dyn ModeConfigProvider>>,
    verification: Option<Arc<dyn VerificationGate>>,
    membership: Option<Arc<dyn MembershipDirectory>>,
}

impl EngineBuilder {
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn mode_config(mut self, modes: Arc<dyn ModeConfigProvider>) -> Self {
        self.modes = Some(modes);
        self
    }

    pub fn verification(mut self, gate: Arc<dyn VerificationGate>) -> Self {
        self.verification = Some(gate);
        self
    }

    pub fn membership(mut self, directory: Arc<dyn MembershipDirectory>) -> Self {
        self.membership = Some(directory);
        self
    }

    pub fn build(self) -> Engine {
        let policy = self.policy;
        let store = self.store;
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(MemoryRateLimiter::new(policy.rate_limits.clone())));
        let sink = self.sink.unwrap_or_else(|| Arc::new(LogSink));
        let modes = self
            .modes
            .unwrap_or_else(|| Arc::new(StoreModeConfig::new(store.clone(), &policy.rewards)));
        let verification = self.verification.unwrap_or_else(|| Arc::new(EmailAndPhoneVerified));
        let membership = self
            .membership
            .unwrap_or_else(|| Arc::new(TierTable::new(policy.rewards.tier_multipliers_bps.clone())));

        let trust = TrustLedger::new(store.clone(), sink.clone(), policy.trust.clone());
        Engine {
            guard: EngagementGuard::new(store.clone(), limiter.clone()),
            earnings: EarningsCalculator::new(
                store.clone(),
                modes.clone(),
                verification,
                membership,
                sink.clone(),
                policy.holds.clone(),
            ),
            flags: FlagReview::new(store.clone(), sink.clone(), trust.clone(), policy.detection.clone()),
            settlement: SettlementJob::new(store.clone(), sink.clone(), policy.holds.clone()),
            trust,
            store,
            limiter,
            sink,
            modes,
        }
    }
}

impl Engine {
    pub fn builder(store: Arc<dyn EngineStore>, policy: PolicyConfig) -> EngineBuilder {
        EngineBuilder {
            store,
            policy,
            limiter: None,
            sink: None,
            modes: None,
            verification: None,
            membership: None,
        }
    }

    pub fn store(&self) -> &Arc<dyn EngineStore> {
        &self.store
    }

    // --- engagements and rewards ---

    pub async fn record_engagement(
        &self,
        post_id: Uuid,
        actor_id: Uuid,
        kind: EngagementType,
    ) -> AppResult<EngagementOutcome> {
        let outcome = self.guard.record(post_id, actor_id, kind).await?;
        metrics::counter!("engagements_total", "outcome" => outcome.label()).increment(1);
        if let EngagementOutcome::Accepted { engagement, .. } = &outcome {
            publisher::publish_engagement_recorded(self.sink.as_ref(), engagement).await;
        }
        Ok(outcome)
    }

    pub async fn remove_engagement(&self, post_id: Uuid, actor_id: Uuid, kind: EngagementType) -> AppResult<bool> {
        let removed = self.guard.remove(post_id, actor_id, kind)?;
        if removed {
            publisher::publish_engagement_removed(self.sink.as_ref(), post_id, actor_id, kind).await;
        }
        Ok(removed)
    }

    pub async fn settle_reward(
        &self,
        post_id: Uuid,
        payee_id: Uuid,
        kind: EngagementType,
    ) -> AppResult<SettlementResult> {
        self.earnings.settle_reward(post_id, payee_id, kind).await
    }

    /// Record the engagement and, if accepted, settle the author's reward.
    /// A settlement failure never fails the engagement.
    pub async fn engage(&self, post_id: Uuid, actor_id: Uuid, kind: EngagementType) -> AppResult<EngageResult> {
        let outcome = self.record_engagement(post_id, actor_id, kind).await?;

        let settlement = match &outcome {
            EngagementOutcome::Accepted { author_id, .. } if *author_id == actor_id => {
                tracing::debug!(post_id = %post_id, "self-engagement; no reward");
                None
            }
            EngagementOutcome::Accepted { author_id, .. } => {
                match self.earnings.settle_reward(post_id, *author_id, kind).await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        tracing::error!(post_id = %post_id, payee_id = %author_id, error = %e, "reward settlement failed");
                        None
                    }
                }
            }
            EngagementOutcome::Duplicate | EngagementOutcome::RateLimited { .. } => None,
        };

        Ok(EngageResult { outcome, settlement })
    }

    pub fn creator_earnings_summary(&self, user_id: Uuid) -> AppResult<EarningsSummary> {
        self.earnings.summary(user_id)
    }

    pub fn current_mode(&self) -> AppResult<ModeSnapshot> {
        self.modes.snapshot()
    }

    pub fn invalidate_mode_cache(&self) {
        self.modes.invalidate();
    }

    // --- flags ---

    pub fn pending_flags(&self) -> AppResult<Vec<FlaggedContent>> {
        self.flags.pending_flags()
    }

    pub async fn review_flag(
        &self,
        post_id: Uuid,
        admin_id: Uuid,
        decision: FlagStatus,
        notes: Option<String>,
    ) -> AppResult<ReviewOutcome> {
        self.flags.review(post_id, admin_id, decision, notes).await
    }

    pub async fn run_auto_flag_pass(&self) -> AppResult<usize> {
        self.flags.auto_flag_suspicious_posts().await
    }

    // --- trust and warnings ---

    pub async fn issue_warning(&self, user_id: Uuid, reason: &str) -> AppResult<IssuedWarning> {
        self.trust.issue_warning(user_id, reason).await
    }

    pub async fn clear_warning(&self, warning_id: Uuid, admin_id: Uuid) -> AppResult<CreatorWarning> {
        self.trust.clear_warning(warning_id, admin_id).await
    }

    pub async fn reinstate_user(&self, user_id: Uuid, admin_id: Uuid) -> AppResult<User> {
        self.trust.reinstate_user(user_id, admin_id).await
    }

    pub fn warning_summary(&self, user_id: Uuid) -> AppResult<WarningSummary> {
        self.trust.warning_summary(user_id)
    }

    // --- jobs and operations ---

    pub async fn run_settlement_sweep(&self) -> AppResult<SweepReport> {
        self.settlement.run_sweep().await
    }

    pub fn audit_log(&self, params: &PaginationParams) -> AppResult<Paginated<AdminAction>> {
        let (items, total) = self.store.admin_actions(params)?;
        Ok(Paginated::new(items, total, params))
    }

    pub async fn health_checks(&self) -> Vec<HealthCheck> {
        let mut checks = Vec::with_capacity(3);
        checks.push(match self.store.ping() {
            Ok(()) => HealthCheck::healthy("store"),
            Err(e) => HealthCheck::unhealthy("store", e.to_string()),
        });
        checks.push(if self.limiter.is_healthy().await {
            HealthCheck::healthy("rate_limiter")
        } else {
            HealthCheck::unhealthy("rate_limiter", "unreachable")
        });
        checks.push(if self.sink.is_connected() {
            HealthCheck::healthy("events")
        } else {
            // Event publishing is best-effort.
            HealthCheck::degraded("events", "broker channel closed")
        });
        checks
    }
}

/// Wire shape for [`EngageResult`].
#[derive(Debug, Serialize)]
pub struct EngageResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettlementResult>,
}

impl From<EngageResult> for EngageResponse {
    fn from(result: EngageResult) -> Self {
        let engagement_id = match &result.outcome {
            EngagementOutcome::Accepted { engagement, .. } => Some(engagement.id),
            _ => None,
        };
        Self {
            outcome: result.outcome.label(),
            engagement_id,
            settlement: result.settlement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{post_by, user};
    use crate::store::MemoryStore;
    use engage_shared::errors::AppError;
    use engage_shared::types::api::HealthStatus;

    fn engine() -> (Arc<MemoryStore>, Engine) {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::builder(store.clone(), PolicyConfig::default()).build();
        (store, engine)
    }

    #[tokio::test]
    async fn engage_credits_the_author() {
        let (store, engine) = engine();
        let author = user();
        let post = post_by(author.id);
        let (author_id, post_id) = (author.id, post.id);
        store.put_user(author).unwrap();
        store.put_post(post).unwrap();

        let result = engine.engage(post_id, Uuid::new_v4(), EngagementType::Comment).await.unwrap();
        let settlement = result.settlement.unwrap();
        assert!(settlement.success);
        assert_eq!(settlement.amount, Some(50));
        assert_eq!(store.earnings_for(author_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn self_engagement_is_recorded_but_not_rewarded() {
        let (store, engine) = engine();
        let author = user();
        let post = post_by(author.id);
        let (author_id, post_id) = (author.id, post.id);
        store.put_user(author).unwrap();
        store.put_post(post).unwrap();

        let result = engine.engage(post_id, author_id, EngagementType::Like).await.unwrap();
        assert!(matches!(result.outcome, EngagementOutcome::Accepted { .. }));
        assert!(result.settlement.is_none());
        assert!(store.earnings_for(author_id).unwrap().is_empty());
    }

    struct BrokenModes;

    impl ModeConfigProvider for BrokenModes {
        fn snapshot(&self) -> AppResult<ModeSnapshot> {
            Err(AppError::internal("mode table unavailable"))
        }
    }

    struct ClosedSink;

    #[async_trait::async_trait]
    impl EventSink for ClosedSink {
        async fn publish_raw(&self, _routing_key: &str, _payload: Vec<u8>) -> anyhow::Result<()> {
            anyhow::bail!("channel closed")
        }

        fn is_connected(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn settlement_error_does_not_fail_engagement() {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::builder(store.clone(), PolicyConfig::default())
            .mode_config(Arc::new(BrokenModes))
            .build();
        let author = user();
        let post = post_by(author.id);
        let (author_id, post_id) = (author.id, post.id);
        store.put_user(author).unwrap();
        store.put_post(post).unwrap();

        let result = engine.engage(post_id, Uuid::new_v4(), EngagementType::Like).await.unwrap();
        assert!(matches!(result.outcome, EngagementOutcome::Accepted { .. }));
        assert!(result.settlement.is_none());
        assert_eq!(store.engagement_count().unwrap(), 1);
        assert!(store.earnings_for(author_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_author_is_a_rejected_settlement() {
        let (store, engine) = engine();
        let post = post_by(Uuid::new_v4());
        let post_id = post.id;
        store.put_post(post).unwrap();

        let result = engine.engage(post_id, Uuid::new_v4(), EngagementType::Like).await.unwrap();
        assert!(matches!(result.outcome, EngagementOutcome::Accepted { .. }));
        let settlement = result.settlement.unwrap();
        assert!(!settlement.success);
        assert_eq!(store.engagement_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn health_reports_each_dependency() {
        let (_, engine) = engine();
        let checks = engine.health_checks().await;
        let names: Vec<_> = checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["store", "rate_limiter", "events"]);
    }

    #[tokio::test]
    async fn closed_broker_degrades_health() {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::builder(store, PolicyConfig::default())
            .event_sink(Arc::new(ClosedSink))
            .build();
        let checks = engine.health_checks().await;
        let events = checks.iter().find(|c| c.name == "events").unwrap();
        assert_eq!(events.status, HealthStatus::Degraded);
    }
}
