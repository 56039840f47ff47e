//! Earnings calculator: turns an accepted engagement into a capped, possibly
//! held, Earning for the post author.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use engage_shared::errors::{AppError, AppResult, ErrorCode};

use crate::config::HoldConfig;
use crate::events::{publisher, EventSink};
use crate::models::{
    day_bounds, CapScope, CapState, CapUsage, EngagementType, NewEarning, PlatformMode, User, UserStatus,
    HOLD_LOW_TRUST, HOLD_PROBATION, HOLD_SUSPENDED, HOLD_UNDER_REVIEW,
};
use crate::services::collaborators::{MembershipDirectory, VerificationGate, BPS_ONE};
use crate::services::mode_config::{Caps, ModeConfigProvider, RewardWeights};
use crate::store::EngineStore;

/// Why an engagement or settlement was refused by policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    Duplicate,
    RateLimited,
    CapExceeded,
    Unverified,
    NotFound,
}

impl RejectionKind {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            RejectionKind::Duplicate => ErrorCode::DuplicateEngagement,
            RejectionKind::RateLimited => ErrorCode::RateLimited,
            RejectionKind::CapExceeded => ErrorCode::CapExceeded,
            RejectionKind::Unverified => ErrorCode::PayeeUnverified,
            RejectionKind::NotFound => ErrorCode::NotFound,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementResult {
    pub success: bool,
    pub amount: Option<i64>,
    pub mode: Option<PlatformMode>,
    pub message: Option<String>,
    pub rejection: Option<RejectionKind>,
    pub earning_id: Option<Uuid>,
    pub held_until: Option<DateTime<Utc>>,
    pub hold_reason: Option<String>,
}

impl SettlementResult {
    fn rejected(kind: RejectionKind, message: impl Into<String>, mode: Option<PlatformMode>) -> Self {
        Self {
            success: false,
            amount: None,
            mode,
            message: Some(message.into()),
            rejection: Some(kind),
            earning_id: None,
            held_until: None,
            hold_reason: None,
        }
    }

    fn no_reward(mode: PlatformMode) -> Self {
        Self {
            success: false,
            amount: None,
            mode: Some(mode),
            message: Some("no reward for this engagement".to_string()),
            rejection: None,
            earning_id: None,
            held_until: None,
            hold_reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapHit {
    PerPost,
    Daily,
}

impl CapHit {
    pub fn message(&self) -> &'static str {
        match self {
            CapHit::PerPost => "per-post daily cap reached",
            CapHit::Daily => "daily earnings cap reached",
        }
    }
}

/// Mode weight for the engagement type scaled by the tier multiplier, rounded down.
pub fn base_reward(weights: &RewardWeights, kind: EngagementType, multiplier_bps: u32) -> i64 {
    weights.for_type(kind).max(0) * i64::from(multiplier_bps) / i64::from(BPS_ONE)
}

/// Truncate `reward` to the remaining per-post and per-payee headroom.
/// Zero headroom on either cap is a rejection, not a zero credit.
pub fn fit_to_caps(reward: i64, caps: Caps, usage: CapUsage) -> Result<i64, CapHit> {
    let post_room = (caps.per_post - usage.post_today).max(0);
    if post_room == 0 {
        return Err(CapHit::PerPost);
    }
    let daily_room = (caps.daily - usage.payee_today).max(0);
    if daily_room == 0 {
        return Err(CapHit::Daily);
    }
    Ok(reward.min(post_room).min(daily_room))
}

/// Hold to place on a new earning, if any.
pub fn hold_for(
    payee: &User,
    post_flagged: bool,
    now: DateTime<Utc>,
    holds: &HoldConfig,
) -> Option<(DateTime<Utc>, &'static str)> {
    match payee.status {
        UserStatus::Suspended => return Some((now, HOLD_SUSPENDED)),
        UserStatus::Probation => return Some((now, HOLD_PROBATION)),
        UserStatus::Active => {}
    }
    if post_flagged {
        return Some((now + holds.review_window(), HOLD_UNDER_REVIEW));
    }
    if payee.trust_score < holds.trust_floor {
        return Some((now + holds.review_window(), HOLD_LOW_TRUST));
    }
    None
}

#[derive(Debug, Clone, Serialize)]
pub struct EarningsSummary {
    pub user_id: Uuid,
    pub total_earned: i64,
    pub paid: i64,
    pub available: i64,
    pub pending_held: i64,
    pub today: i64,
    pub today_remaining: i64,
    pub earnings_count: i64,
    pub mode: PlatformMode,
}

#[derive(Clone)]
pub struct EarningsCalculator {
    store: Arc<dyn EngineStore>,
    modes: Arc<dyn ModeConfigProvider>,
    verification: Arc<dyn VerificationGate>,
    membership: Arc<dyn MembershipDirectory>,
    sink: Arc<dyn EventSink>,
    holds: HoldConfig,
}

impl EarningsCalculator {
    pub fn new(
        store: Arc<dyn EngineStore>,
        modes: Arc<dyn ModeConfigProvider>,
        verification: Arc<dyn VerificationGate>,
        membership: Arc<dyn MembershipDirectory>,
        sink: Arc<dyn EventSink>,
        holds: HoldConfig,
    ) -> Self {
        Self {
            store,
            modes,
            verification,
            membership,
            sink,
            holds,
        }
    }

    pub async fn settle_reward(
        &self,
        post_id: Uuid,
        payee_id: Uuid,
        kind: EngagementType,
    ) -> AppResult<SettlementResult> {
        self.settle_reward_at(post_id, payee_id, kind, Utc::now()).await
    }

    pub async fn settle_reward_at(
        &self,
        post_id: Uuid,
        payee_id: Uuid,
        kind: EngagementType,
        now: DateTime<Utc>,
    ) -> AppResult<SettlementResult> {
        if self.store.find_post(post_id)?.is_none() {
            return Ok(SettlementResult::rejected(RejectionKind::NotFound, "post not found", None));
        }
        let Some(payee) = self.store.find_user(payee_id)? else {
            return Ok(SettlementResult::rejected(RejectionKind::NotFound, "payee not found", None));
        };
        if !self.verification.is_fully_verified(&payee) {
            return Ok(SettlementResult::rejected(
                RejectionKind::Unverified,
                "payee must complete verification before earning",
                None,
            ));
        }

        let snapshot = self.modes.snapshot()?;
        let reward = base_reward(&snapshot.weights, kind, self.membership.multiplier_bps(&payee));
        if reward <= 0 {
            return Ok(SettlementResult::no_reward(snapshot.mode));
        }

        let (day_start, day_end) = day_bounds(now);
        let scope = CapScope {
            post_id,
            payee_id,
            day_start,
            day_end,
        };

        let mut hit = None;
        let credited = self.store.credit_within_caps(scope, &mut |state: &CapState| {
            let hold = hold_for(&state.payee, state.post_flagged, now, &self.holds);
            match fit_to_caps(reward, snapshot.caps, state.usage) {
                Ok(amount) => Some(NewEarning {
                    post_id: Some(post_id),
                    user_id: payee_id,
                    amount,
                    held_until: hold.map(|(until, _)| until),
                    hold_reason: hold.map(|(_, reason)| reason.to_string()),
                    engagement_type: Some(kind),
                    mode: snapshot.mode,
                    created_at: now,
                }),
                Err(cap) => {
                    hit = Some(cap);
                    None
                }
            }
        })?;

        let Some(earning) = credited else {
            let cap = hit.ok_or_else(|| AppError::internal("cap scope wrote nothing without a cap hit"))?;
            tracing::info!(post_id = %post_id, payee_id = %payee_id, cap = cap.message(), "reward rejected by cap");
            return Ok(SettlementResult::rejected(
                RejectionKind::CapExceeded,
                cap.message(),
                Some(snapshot.mode),
            ));
        };

        metrics::counter!("rewards_credited_total", "mode" => snapshot.mode.as_str()).increment(1);
        tracing::info!(
            earning_id = %earning.id,
            post_id = %post_id,
            payee_id = %payee_id,
            amount = earning.amount,
            held = earning.held_until.is_some(),
            "reward credited"
        );
        publisher::publish_reward_credited(self.sink.as_ref(), &earning).await;

        let message = if earning.amount < reward {
            format!("credited {} of {} (cap reached)", earning.amount, reward)
        } else {
            format!("credited {}", earning.amount)
        };
        Ok(SettlementResult {
            success: true,
            amount: Some(earning.amount),
            mode: Some(earning.mode),
            message: Some(message),
            rejection: None,
            earning_id: Some(earning.id),
            held_until: earning.held_until,
            hold_reason: earning.hold_reason,
        })
    }

    pub fn summary(&self, user_id: Uuid) -> AppResult<EarningsSummary> {
        self.summary_at(user_id, Utc::now())
    }

    pub fn summary_at(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<EarningsSummary> {
        if self.store.find_user(user_id)?.is_none() {
            return Err(AppError::new(ErrorCode::UserNotFound, "user not found"));
        }
        let (day_start, _) = day_bounds(now);
        let totals = self.store.earnings_totals(user_id, day_start)?;
        let snapshot = self.modes.snapshot()?;

        Ok(EarningsSummary {
            user_id,
            total_earned: totals.total,
            paid: totals.paid,
            available: totals.available,
            pending_held: totals.held,
            today: totals.today,
            today_remaining: (snapshot.caps.daily - totals.today).max(0),
            earnings_count: totals.count,
            mode: snapshot.mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogSink;
    use crate::models::{NewFlag, TrustAdjustment, CONTENT_TYPE_POST};
    use crate::services::collaborators::{EmailAndPhoneVerified, TierTable};
    use crate::services::mode_config::{FixedModeConfig, ModeSnapshot};
    use crate::services::test_support::{post_by, user, SkewedStore};
    use crate::store::MemoryStore;
    use std::collections::HashMap;

    fn snapshot(per_post: i64, daily: i64, like: i64) -> ModeSnapshot {
        ModeSnapshot {
            mode: PlatformMode::Beta,
            caps: Caps { per_post, daily },
            weights: RewardWeights {
                like,
                comment: like * 5,
                share: like * 2,
            },
        }
    }

    fn calculator(store: Arc<MemoryStore>, mode: ModeSnapshot) -> EarningsCalculator {
        EarningsCalculator::new(
            store,
            Arc::new(FixedModeConfig(mode)),
            Arc::new(EmailAndPhoneVerified),
            Arc::new(TierTable::new(HashMap::from([
                ("free".to_string(), 10_000),
                ("pro".to_string(), 15_000),
            ]))),
            Arc::new(LogSink),
            HoldConfig::default(),
        )
    }

    fn seeded(payee: User) -> (Arc<MemoryStore>, Uuid, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let post = post_by(payee.id);
        let ids = (post.id, payee.id);
        store.put_user(payee).unwrap();
        store.put_post(post).unwrap();
        (store, ids.0, ids.1)
    }

    #[test]
    fn fit_truncates_then_rejects() {
        let caps = Caps { per_post: 10, daily: 100 };
        assert_eq!(fit_to_caps(6, caps, CapUsage { post_today: 0, payee_today: 0 }), Ok(6));
        assert_eq!(fit_to_caps(6, caps, CapUsage { post_today: 6, payee_today: 6 }), Ok(4));
        assert_eq!(
            fit_to_caps(6, caps, CapUsage { post_today: 10, payee_today: 10 }),
            Err(CapHit::PerPost)
        );
        assert_eq!(
            fit_to_caps(6, caps, CapUsage { post_today: 0, payee_today: 100 }),
            Err(CapHit::Daily)
        );
    }

    #[test]
    fn base_reward_rounds_down() {
        let w = RewardWeights { like: 3, comment: 10, share: 5 };
        assert_eq!(base_reward(&w, EngagementType::Like, 12_500), 3);
        assert_eq!(base_reward(&w, EngagementType::Comment, 15_000), 15);
    }

    #[tokio::test]
    async fn two_six_token_rewards_under_ten_cap_credit_six_then_four() {
        let (store, post_id, payee_id) = seeded(user());
        let calc = calculator(store.clone(), snapshot(10, 100, 6));

        let first = calc.settle_reward(post_id, payee_id, EngagementType::Like).await.unwrap();
        let second = calc.settle_reward(post_id, payee_id, EngagementType::Like).await.unwrap();
        let third = calc.settle_reward(post_id, payee_id, EngagementType::Like).await.unwrap();

        assert_eq!(first.amount, Some(6));
        assert_eq!(second.amount, Some(4));
        assert!(!third.success);
        assert_eq!(third.rejection, Some(RejectionKind::CapExceeded));
        assert_eq!(third.message.as_deref(), Some("per-post daily cap reached"));

        let total: i64 = store.earnings_for(payee_id).unwrap().iter().map(|e| e.amount).sum();
        assert_eq!(total, 10);
    }

    #[tokio::test]
    async fn daily_cap_spans_posts() {
        let payee = user();
        let (store, first_post, payee_id) = seeded(payee);
        let second_post = post_by(payee_id);
        let second_id = second_post.id;
        store.put_post(second_post).unwrap();
        let calc = calculator(store.clone(), snapshot(100, 15, 10));

        let a = calc.settle_reward(first_post, payee_id, EngagementType::Like).await.unwrap();
        let b = calc.settle_reward(second_id, payee_id, EngagementType::Like).await.unwrap();
        let c = calc.settle_reward(second_id, payee_id, EngagementType::Like).await.unwrap();

        assert_eq!((a.amount, b.amount), (Some(10), Some(5)));
        assert_eq!(c.message.as_deref(), Some("daily earnings cap reached"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_settlements_never_exceed_post_cap() {
        let (store, post_id, payee_id) = seeded(user());
        let calc = calculator(store.clone(), snapshot(50, 1000, 7));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let calc = calc.clone();
                tokio::spawn(async move { calc.settle_reward(post_id, payee_id, EngagementType::Like).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let total: i64 = store.earnings_for(payee_id).unwrap().iter().map(|e| e.amount).sum();
        assert_eq!(total, 50);
    }

    #[tokio::test]
    async fn unverified_payee_gets_nothing() {
        let mut payee = user();
        payee.email_verified = false;
        let (store, post_id, payee_id) = seeded(payee);
        let calc = calculator(store.clone(), snapshot(10, 100, 6));

        let result = calc.settle_reward(post_id, payee_id, EngagementType::Like).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.rejection, Some(RejectionKind::Unverified));
        assert!(store.earnings_for(payee_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_post_or_payee_is_not_found() {
        let (store, post_id, _) = seeded(user());
        let calc = calculator(store, snapshot(10, 100, 6));

        let r = calc.settle_reward(Uuid::new_v4(), Uuid::new_v4(), EngagementType::Like).await.unwrap();
        assert_eq!(r.rejection, Some(RejectionKind::NotFound));
        let r = calc.settle_reward(post_id, Uuid::new_v4(), EngagementType::Like).await.unwrap();
        assert_eq!(r.rejection, Some(RejectionKind::NotFound));
    }

    #[tokio::test]
    async fn zero_weight_is_no_reward() {
        let (store, post_id, payee_id) = seeded(user());
        let calc = calculator(store.clone(), snapshot(10, 100, 0));

        let result = calc.settle_reward(post_id, payee_id, EngagementType::Like).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.rejection, None);
        assert!(store.earnings_for(payee_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn tier_multiplier_scales_reward() {
        let mut payee = user();
        payee.membership_tier = "pro".into();
        let (store, post_id, payee_id) = seeded(payee);
        let calc = calculator(store, snapshot(100, 100, 10));

        let result = calc.settle_reward(post_id, payee_id, EngagementType::Like).await.unwrap();
        assert_eq!(result.amount, Some(15));
    }

    #[tokio::test]
    async fn holds_follow_payee_and_post_state() {
        let now = Utc::now();

        let mut suspended = user();
        suspended.status = UserStatus::Suspended;
        let (store, post_id, payee_id) = seeded(suspended);
        let r = calculator(store, snapshot(100, 100, 10))
            .settle_reward_at(post_id, payee_id, EngagementType::Like, now)
            .await
            .unwrap();
        assert_eq!((r.held_until, r.hold_reason.as_deref()), (Some(now), Some(HOLD_SUSPENDED)));

        let mut probation = user();
        probation.status = UserStatus::Probation;
        probation.probation_until = Some(now + chrono::Duration::days(3));
        let (store, post_id, payee_id) = seeded(probation);
        let r = calculator(store, snapshot(100, 100, 10))
            .settle_reward_at(post_id, payee_id, EngagementType::Like, now)
            .await
            .unwrap();
        assert_eq!(r.hold_reason.as_deref(), Some(HOLD_PROBATION));

        let (store, post_id, payee_id) = seeded(user());
        store
            .raise_flag(
                NewFlag {
                    content_id: post_id,
                    content_type: CONTENT_TYPE_POST.into(),
                    owner_id: payee_id,
                    reason: "test".into(),
                    created_at: now,
                },
                TrustAdjustment::none(),
            )
            .unwrap();
        let r = calculator(store, snapshot(100, 100, 10))
            .settle_reward_at(post_id, payee_id, EngagementType::Like, now)
            .await
            .unwrap();
        assert_eq!(r.held_until, Some(now + chrono::Duration::hours(24)));
        assert_eq!(r.hold_reason.as_deref(), Some(HOLD_UNDER_REVIEW));

        let mut shaky = user();
        shaky.trust_score = 39;
        let (store, post_id, payee_id) = seeded(shaky);
        let r = calculator(store, snapshot(100, 100, 10))
            .settle_reward_at(post_id, payee_id, EngagementType::Like, now)
            .await
            .unwrap();
        assert_eq!(r.hold_reason.as_deref(), Some(HOLD_LOW_TRUST));

        let (store, post_id, payee_id) = seeded(user());
        let r = calculator(store, snapshot(100, 100, 10))
            .settle_reward_at(post_id, payee_id, EngagementType::Like, now)
            .await
            .unwrap();
        assert!(r.held_until.is_none() && r.hold_reason.is_none());
    }

    #[tokio::test]
    async fn hold_uses_payee_status_read_inside_cap_scope() {
        let now = Utc::now();
        let (store, post_id, payee_id) = seeded(user());
        let stale = store.find_user(payee_id).unwrap().unwrap();
        store
            .update_user_status(payee_id, &[UserStatus::Active], crate::models::StatusChange::Suspended { at: now })
            .unwrap()
            .unwrap();

        let mut skewed = SkewedStore::over(store.clone());
        skewed.stale_users.insert(payee_id, stale);
        let calc = EarningsCalculator::new(
            Arc::new(skewed),
            Arc::new(FixedModeConfig(snapshot(100, 100, 10))),
            Arc::new(EmailAndPhoneVerified),
            Arc::new(TierTable::new(HashMap::from([("free".to_string(), 10_000)]))),
            Arc::new(LogSink),
            HoldConfig::default(),
        );

        let r = calc.settle_reward_at(post_id, payee_id, EngagementType::Like, now).await.unwrap();
        assert!(r.success);
        assert_eq!(r.hold_reason.as_deref(), Some(HOLD_SUSPENDED));
        let stored = store.earnings_for(payee_id).unwrap();
        assert_eq!(stored[0].hold_reason.as_deref(), Some(HOLD_SUSPENDED));
    }

    #[tokio::test]
    async fn summary_splits_held_and_available() {
        let (store, post_id, payee_id) = seeded(user());
        let calc = calculator(store.clone(), snapshot(100, 100, 10));
        calc.settle_reward(post_id, payee_id, EngagementType::Comment).await.unwrap();

        let mut flagged = user();
        flagged.id = payee_id;
        flagged.trust_score = 10;
        store.put_user(flagged).unwrap();
        calc.settle_reward(post_id, payee_id, EngagementType::Like).await.unwrap();

        let summary = calc.summary(payee_id).unwrap();
        assert_eq!(summary.total_earned, 60);
        assert_eq!(summary.available, 50);
        assert_eq!(summary.pending_held, 10);
        assert_eq!(summary.today_remaining, 40);
        assert_eq!(summary.earnings_count, 2);
    }
}
