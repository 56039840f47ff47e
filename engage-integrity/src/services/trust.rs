//! Trust score ledger and the warning ladder.
//!
//! Warnings cost `warning_penalty` trust points each. After every issuance the
//! active warnings inside the escalation window are counted: reaching the
//! probation threshold puts an ACTIVE user on probation, reaching the suspend
//! threshold suspends. Nothing here ever lifts a suspension; that is
//! [`TrustLedger::reinstate_user`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use engage_shared::errors::{AppError, AppResult, ErrorCode};

use crate::config::TrustConfig;
use crate::events::{publisher, EventSink};
use crate::models::{
    ClearOutcome, CreatorWarning, NewAdminAction, NewWarning, StatusChange, TrustAdjustment, User,
    UserStatus, WarningSummary,
};
use crate::store::EngineStore;

#[derive(Debug, Clone, Serialize)]
pub struct IssuedWarning {
    pub warning: CreatorWarning,
    pub trust_score: i32,
    pub active_warnings: i64,
    /// Set when this warning moved the user to a new status.
    pub escalated_to: Option<UserStatus>,
}

#[derive(Clone)]
pub struct TrustLedger {
    store: Arc<dyn EngineStore>,
    sink: Arc<dyn EventSink>,
    policy: TrustConfig,
}

impl TrustLedger {
    pub fn new(store: Arc<dyn EngineStore>, sink: Arc<dyn EventSink>, policy: TrustConfig) -> Self {
        Self { store, sink, policy }
    }

    pub fn policy(&self) -> &TrustConfig {
        &self.policy
    }

    pub async fn issue_warning(&self, user_id: Uuid, reason: &str) -> AppResult<IssuedWarning> {
        self.issue_warning_at(user_id, reason, Utc::now()).await
    }

    pub async fn issue_warning_at(
        &self,
        user_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<IssuedWarning> {
        if self.store.find_user(user_id)?.is_none() {
            return Err(AppError::new(ErrorCode::UserNotFound, "user not found"));
        }

        let (warning, trust_score) = self.store.issue_warning(
            NewWarning {
                user_id,
                reason: reason.to_string(),
                created_at: now,
            },
            self.warning_penalty(),
        )?;
        self.after_warning(warning, trust_score, now).await
    }

    pub fn warning_penalty(&self) -> TrustAdjustment {
        TrustAdjustment::penalty(self.policy.warning_penalty)
    }

    /// Count the window, escalate and announce a warning that is already stored.
    pub(crate) async fn after_warning(
        &self,
        warning: CreatorWarning,
        trust_score: i32,
        now: DateTime<Utc>,
    ) -> AppResult<IssuedWarning> {
        let user_id = warning.user_id;
        let since = now - Duration::days(self.policy.escalation_window_days);
        let active = self.store.count_active_warnings_since(user_id, since)?;
        let escalated = self.escalate(user_id, active, now)?;

        tracing::info!(
            user_id = %user_id,
            warning_id = %warning.id,
            active_warnings = active,
            trust_score,
            "creator warning issued"
        );
        publisher::publish_warning_issued(self.sink.as_ref(), &warning, active).await;
        if let Some(user) = &escalated {
            publisher::publish_status_changed(self.sink.as_ref(), user.id, user.status, user.probation_until)
                .await;
        }

        Ok(IssuedWarning {
            warning,
            trust_score,
            active_warnings: active,
            escalated_to: escalated.map(|u| u.status),
        })
    }

    fn escalate(&self, user_id: Uuid, active: i64, now: DateTime<Utc>) -> AppResult<Option<User>> {
        if active >= self.policy.suspend_threshold {
            let user = self.store.update_user_status(
                user_id,
                &[UserStatus::Active, UserStatus::Probation],
                StatusChange::Suspended { at: now },
            )?;
            if user.is_some() {
                tracing::warn!(user_id = %user_id, active_warnings = active, "user suspended");
            }
            return Ok(user);
        }
        if active >= self.policy.probation_threshold {
            let until = now + Duration::days(self.policy.probation_days);
            let user = self.store.update_user_status(
                user_id,
                &[UserStatus::Active],
                StatusChange::Probation { until },
            )?;
            if user.is_some() {
                tracing::warn!(user_id = %user_id, until = %until, "user placed on probation");
            }
            return Ok(user);
        }
        Ok(None)
    }

    /// Clear an active warning and give back the points it actually took.
    /// Probation or suspension already applied stays in place.
    pub async fn clear_warning(&self, warning_id: Uuid, admin_id: Uuid) -> AppResult<CreatorWarning> {
        let warning = match self.store.clear_warning(warning_id, admin_id, Utc::now())? {
            ClearOutcome::Cleared(warning) => warning,
            ClearOutcome::AlreadyCleared => {
                return Err(AppError::new(
                    ErrorCode::WarningAlreadyCleared,
                    "warning has already been cleared",
                ))
            }
            ClearOutcome::NotFound => {
                return Err(AppError::new(ErrorCode::WarningNotFound, "warning not found"))
            }
        };

        self.store.record_admin_action(NewAdminAction {
            admin_id,
            action: "clear_warning".to_string(),
            target_user_id: Some(warning.user_id),
            details: Some(serde_json::json!({ "warning_id": warning_id })),
        })?;
        publisher::publish_warning_cleared(self.sink.as_ref(), &warning, admin_id).await;

        Ok(warning)
    }

    /// Administrative return to ACTIVE from probation or suspension.
    pub async fn reinstate_user(&self, user_id: Uuid, admin_id: Uuid) -> AppResult<User> {
        self.reinstate_user_at(user_id, admin_id, Utc::now()).await
    }

    /// Parked suspension and probation holds are brought due at `now` so the
    /// next sweep releases them.
    pub async fn reinstate_user_at(&self, user_id: Uuid, admin_id: Uuid, now: DateTime<Utc>) -> AppResult<User> {
        let previous = self
            .store
            .find_user(user_id)?
            .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

        let user = self
            .store
            .update_user_status(
                user_id,
                &[UserStatus::Active, UserStatus::Probation, UserStatus::Suspended],
                StatusChange::Active,
            )?
            .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;
        let requeued = self.store.requeue_status_holds(user_id, now)?;

        self.store.record_admin_action(NewAdminAction {
            admin_id,
            action: "reinstate_user".to_string(),
            target_user_id: Some(user_id),
            details: Some(serde_json::json!({ "previous_status": previous.status })),
        })?;
        tracing::info!(
            user_id = %user_id,
            admin_id = %admin_id,
            from = %previous.status,
            requeued_holds = requeued,
            "user reinstated"
        );
        publisher::publish_status_changed(self.sink.as_ref(), user_id, user.status, None).await;

        Ok(user)
    }

    pub fn warning_summary(&self, user_id: Uuid) -> AppResult<WarningSummary> {
        self.store.warning_summary(user_id)
    }
}
