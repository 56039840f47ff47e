//! Held-earnings settlement sweep.
//!
//! Each due row is moved with a conditional update keyed on the `held_until`
//! value read, so rows that changed underneath the sweep are skipped rather
//! than overwritten. Rows the sweep keeps held always get a `held_until` in
//! the future, which is what makes a repeat run a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use engage_shared::errors::{AppError, AppResult};
use engage_shared::types::event::payloads;

use crate::config::HoldConfig;
use crate::events::{publisher, EventSink};
use crate::models::{
    far_future, Earning, HoldState, User, UserStatus, HOLD_PROBATION, HOLD_SUSPENDED,
    HOLD_UNDER_REVIEW,
};
use crate::store::EngineStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub total_reviewed: u64,
    pub released: u64,
    pub still_held: u64,
    pub suspended: u64,
    pub probation_completed: u64,
    /// Rows that changed between read and write.
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Released,
    StillHeld,
    Suspended,
}

/// Where a due earning goes next, given its payee and whether its post is
/// under an unresolved flag.
pub fn next_hold(
    payee: &User,
    post_flagged: bool,
    now: DateTime<Utc>,
    holds: &HoldConfig,
) -> (HoldState, SweepOutcome) {
    if payee.status == UserStatus::Suspended {
        return (
            HoldState::Held { until: far_future(), reason: HOLD_SUSPENDED },
            SweepOutcome::Suspended,
        );
    }
    if post_flagged {
        return (
            HoldState::Held { until: now + holds.review_window(), reason: HOLD_UNDER_REVIEW },
            SweepOutcome::StillHeld,
        );
    }
    if payee.status == UserStatus::Probation {
        if let Some(until) = payee.probation_until.filter(|until| *until > now) {
            return (
                HoldState::Held { until, reason: HOLD_PROBATION },
                SweepOutcome::StillHeld,
            );
        }
    }
    (HoldState::Released, SweepOutcome::Released)
}

#[derive(Clone)]
pub struct SettlementJob {
    store: Arc<dyn EngineStore>,
    sink: Arc<dyn EventSink>,
    holds: HoldConfig,
}

impl SettlementJob {
    pub fn new(store: Arc<dyn EngineStore>, sink: Arc<dyn EventSink>, holds: HoldConfig) -> Self {
        Self { store, sink, holds }
    }

    pub async fn run_sweep(&self) -> AppResult<SweepReport> {
        self.run_sweep_at(Utc::now()).await
    }

    pub async fn run_sweep_at(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let due = self.store.held_earnings_due(now)?;
        let mut report = SweepReport {
            total_reviewed: due.len() as u64,
            ..SweepReport::default()
        };
        let mut payees: HashMap<Uuid, User> = HashMap::new();

        for earning in &due {
            match self.settle_one(earning, &mut payees, now) {
                Ok(Some(SweepOutcome::Released)) => report.released += 1,
                Ok(Some(SweepOutcome::StillHeld)) => report.still_held += 1,
                Ok(Some(SweepOutcome::Suspended)) => report.suspended += 1,
                Ok(None) => {
                    tracing::debug!(earning_id = %earning.id, "earning changed during sweep; skipped");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(earning_id = %earning.id, error = %e, "failed to settle held earning");
                    report.failed += 1;
                }
            }
        }

        let completed = self.store.complete_expired_probations(now)?;
        report.probation_completed = completed.len() as u64;
        for user_id in completed {
            publisher::publish_status_changed(self.sink.as_ref(), user_id, UserStatus::Active, None).await;
        }

        record_metrics(&report);
        tracing::info!(
            total_reviewed = report.total_reviewed,
            released = report.released,
            still_held = report.still_held,
            suspended = report.suspended,
            probation_completed = report.probation_completed,
            skipped = report.skipped,
            failed = report.failed,
            "settlement sweep completed"
        );
        publisher::publish_sweep_completed(
            self.sink.as_ref(),
            payloads::SweepCompleted {
                total_reviewed: report.total_reviewed,
                released: report.released,
                still_held: report.still_held,
                suspended: report.suspended,
                probation_completed: report.probation_completed,
                failed: report.failed,
            },
        )
        .await;

        Ok(report)
    }

    /// `Ok(None)` means the conditional update lost a race.
    fn settle_one(
        &self,
        earning: &Earning,
        payees: &mut HashMap<Uuid, User>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SweepOutcome>> {
        let expected = earning
            .held_until
            .ok_or_else(|| AppError::internal(format!("earning {} is not held", earning.id)))?;

        let payee = match payees.get(&earning.user_id) {
            Some(user) => user.clone(),
            None => {
                let user = self
                    .store
                    .find_user(earning.user_id)?
                    .ok_or_else(|| AppError::internal(format!("payee {} missing", earning.user_id)))?;
                payees.insert(user.id, user.clone());
                user
            }
        };

        let flagged = match earning.post_id {
            Some(post_id) => self.store.has_unresolved_flag(post_id)?,
            None => false,
        };

        let (next, outcome) = next_hold(&payee, flagged, now, &self.holds);
        if self.store.transition_hold(earning.id, expected, &next)? {
            Ok(Some(outcome))
        } else {
            Ok(None)
        }
    }
}

fn record_metrics(report: &SweepReport) {
    for (outcome, count) in [
        ("released", report.released),
        ("still_held", report.still_held),
        ("suspended", report.suspended),
        ("skipped", report.skipped),
        ("failed", report.failed),
    ] {
        metrics::counter!("settlement_sweep_total", "outcome" => outcome).increment(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogSink;
    use crate::models::{NewFlag, PlatformMode, TrustAdjustment, CONTENT_TYPE_POST};
    use crate::services::test_support::{post_by, user};
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn held_earning(user_id: Uuid, post_id: Option<Uuid>, until: DateTime<Utc>) -> Earning {
        Earning {
            id: Uuid::new_v4(),
            post_id,
            user_id,
            amount: 10,
            is_paid: false,
            held_until: Some(until),
            hold_reason: Some(HOLD_UNDER_REVIEW.to_string()),
            engagement_type: None,
            mode: PlatformMode::Beta,
            created_at: until - Duration::hours(24),
        }
    }

    fn job(store: &Arc<MemoryStore>) -> SettlementJob {
        SettlementJob::new(store.clone(), Arc::new(LogSink), HoldConfig::default())
    }

    #[tokio::test]
    async fn suspended_payee_is_parked_in_far_future_even_when_flagged() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut payee = user();
        payee.status = UserStatus::Suspended;
        let post = post_by(payee.id);
        let (payee_id, post_id) = (payee.id, post.id);
        store.put_user(payee).unwrap();
        store.put_post(post).unwrap();
        store
            .raise_flag(
                NewFlag {
                    content_id: post_id,
                    content_type: CONTENT_TYPE_POST.into(),
                    owner_id: payee_id,
                    reason: "ring".into(),
                    created_at: now,
                },
                TrustAdjustment::none(),
            )
            .unwrap();
        store.put_earning(held_earning(payee_id, Some(post_id), now - Duration::minutes(1))).unwrap();

        let report = job(&store).run_sweep_at(now).await.unwrap();
        assert_eq!(report.suspended, 1);

        let earning = &store.earnings_for(payee_id).unwrap()[0];
        assert_eq!(earning.held_until, Some(far_future()));
        assert_eq!(earning.hold_reason.as_deref(), Some(HOLD_SUSPENDED));
    }

    #[tokio::test]
    async fn flagged_post_extends_hold_by_review_window() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let payee = user();
        let post = post_by(payee.id);
        let (payee_id, post_id) = (payee.id, post.id);
        store.put_user(payee).unwrap();
        store.put_post(post).unwrap();
        store
            .raise_flag(
                NewFlag {
                    content_id: post_id,
                    content_type: CONTENT_TYPE_POST.into(),
                    owner_id: payee_id,
                    reason: "velocity".into(),
                    created_at: now,
                },
                TrustAdjustment::none(),
            )
            .unwrap();
        store.put_earning(held_earning(payee_id, Some(post_id), now)).unwrap();

        let report = job(&store).run_sweep_at(now).await.unwrap();
        assert_eq!(report.still_held, 1);
        let earning = &store.earnings_for(payee_id).unwrap()[0];
        assert_eq!(earning.held_until, Some(now + Duration::hours(24)));
    }

    #[tokio::test]
    async fn probation_hold_lands_exactly_on_probation_end() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let t = now + Duration::days(3);
        let mut payee = user();
        payee.status = UserStatus::Probation;
        payee.probation_until = Some(t);
        let payee_id = payee.id;
        store.put_user(payee).unwrap();
        store.put_earning(held_earning(payee_id, None, now - Duration::hours(1))).unwrap();
        store.put_earning(held_earning(payee_id, None, now)).unwrap();

        let job = job(&store);
        let first = job.run_sweep_at(now).await.unwrap();
        assert_eq!(first.still_held, 2);
        assert!(store
            .earnings_for(payee_id)
            .unwrap()
            .iter()
            .all(|e| e.held_until == Some(t) && e.hold_reason.as_deref() == Some(HOLD_PROBATION)));

        // Just before T nothing is due and the user stays on probation.
        let before = job.run_sweep_at(t - Duration::seconds(1)).await.unwrap();
        assert_eq!(before, SweepReport::default());
        assert_eq!(store.find_user(payee_id).unwrap().unwrap().status, UserStatus::Probation);

        // At T both earnings release and the probation completes.
        let at_t = job.run_sweep_at(t).await.unwrap();
        assert_eq!(at_t.released, 2);
        assert_eq!(at_t.probation_completed, 1);
        assert_eq!(store.find_user(payee_id).unwrap().unwrap().status, UserStatus::Active);
    }

    #[tokio::test]
    async fn repeat_sweep_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let payee = user();
        let payee_id = payee.id;
        store.put_user(payee).unwrap();
        for _ in 0..3 {
            store.put_earning(held_earning(payee_id, None, now - Duration::hours(2))).unwrap();
        }

        let job = job(&store);
        let first = job.run_sweep_at(now).await.unwrap();
        assert_eq!(first.released, 3);
        let snapshot: Vec<_> = store
            .earnings_for(payee_id)
            .unwrap()
            .into_iter()
            .map(|e| (e.id, e.held_until, e.hold_reason))
            .collect();

        let second = job.run_sweep_at(now).await.unwrap();
        let third = job.run_sweep_at(now).await.unwrap();
        assert_eq!(second, SweepReport::default());
        assert_eq!(second, third);
        let after: Vec<_> = store
            .earnings_for(payee_id)
            .unwrap()
            .into_iter()
            .map(|e| (e.id, e.held_until, e.hold_reason))
            .collect();
        assert_eq!(snapshot, after);
    }

    #[tokio::test]
    async fn missing_payee_fails_row_without_aborting_sweep() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let payee = user();
        let payee_id = payee.id;
        store.put_user(payee).unwrap();
        store.put_earning(held_earning(Uuid::new_v4(), None, now)).unwrap();
        store.put_earning(held_earning(payee_id, None, now)).unwrap();

        let report = job(&store).run_sweep_at(now).await.unwrap();
        assert_eq!(report.total_reviewed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.released, 1);
    }

    #[test]
    fn expired_probation_releases() {
        let now = Utc::now();
        let mut payee = user();
        payee.status = UserStatus::Probation;
        payee.probation_until = Some(now);
        let (state, outcome) = next_hold(&payee, false, now, &HoldConfig::default());
        assert_eq!(state, HoldState::Released);
        assert_eq!(outcome, SweepOutcome::Released);
    }
}
