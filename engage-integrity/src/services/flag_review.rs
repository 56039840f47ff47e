//! Auto-flagging and the admin review state machine.
//!
//! A flag is PENDING until an admin resolves it to CLEARED or CONFIRMED,
//! exactly once. Raising a flag costs the owner a provisional `flag_penalty`;
//! the flag records the score before and the points actually taken so a
//! CLEARED review can give back `clear_recovery_percent` of them, never
//! lifting the score past where it stood before the flag.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use engage_shared::errors::{AppError, AppResult, ErrorCode};

use crate::config::DetectionConfig;
use crate::events::{publisher, EventSink};
use crate::models::{
    FlagResolution, FlagStatus, FlaggedContent, NewAdminAction, NewFlag, NewWarning,
    ResolvedFlag, TrustAdjustment, CONTENT_TYPE_POST,
};
use crate::services::detection;
use crate::services::trust::TrustLedger;
use crate::store::EngineStore;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReviewOutcome {
    Resolved { flag: FlaggedContent, trust_score: i32 },
    /// No unresolved flag exists for the content.
    NoPendingFlag,
    /// Another reviewer resolved it first.
    AlreadyResolved,
}

impl ReviewOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ReviewOutcome::Resolved { .. })
    }
}

/// Trust change a review applies to the content owner.
pub fn review_adjustment(flag: &FlaggedContent, decision: FlagStatus, ledger: &TrustLedger) -> TrustAdjustment {
    let policy = ledger.policy();
    match decision {
        FlagStatus::Confirmed => TrustAdjustment::penalty(policy.confirm_penalty),
        FlagStatus::Cleared => {
            let points = flag.trust_penalty * policy.clear_recovery_percent / 100;
            TrustAdjustment::restore(points, Some(flag.trust_before))
        }
        FlagStatus::Pending => TrustAdjustment::none(),
    }
}

#[derive(Clone)]
pub struct FlagReview {
    store: Arc<dyn EngineStore>,
    sink: Arc<dyn EventSink>,
    ledger: TrustLedger,
    detection: DetectionConfig,
}

impl FlagReview {
    pub fn new(
        store: Arc<dyn EngineStore>,
        sink: Arc<dyn EventSink>,
        ledger: TrustLedger,
        detection: DetectionConfig,
    ) -> Self {
        Self {
            store,
            sink,
            ledger,
            detection,
        }
    }

    pub async fn auto_flag_suspicious_posts(&self) -> AppResult<usize> {
        self.auto_flag_suspicious_posts_at(Utc::now()).await
    }

    /// Returns the number of newly created flags.
    pub async fn auto_flag_suspicious_posts_at(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let since = now - Duration::hours(self.detection.lookback_hours);
        let engagements = self.store.engagements_since(since)?;
        if engagements.is_empty() {
            return Ok(0);
        }

        let post_ids: Vec<Uuid> = engagements
            .iter()
            .map(|e| e.post_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let posts: HashMap<_, _> = self
            .store
            .find_posts(&post_ids)?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let suspicions = detection::detect(&engagements, &posts, now, &self.detection);
        let penalty = TrustAdjustment::penalty(self.ledger.policy().flag_penalty);
        let mut created = 0;

        for suspicion in suspicions {
            let new = NewFlag {
                content_id: suspicion.post_id,
                content_type: CONTENT_TYPE_POST.to_string(),
                owner_id: suspicion.owner_id,
                reason: suspicion.reason(),
                created_at: now,
            };
            let Some(flag) = self.store.raise_flag(new, penalty)? else {
                continue;
            };
            created += 1;
            metrics::counter!("flags_created_total").increment(1);
            tracing::warn!(
                flag_id = %flag.id,
                post_id = %flag.content_id,
                owner_id = %flag.owner_id,
                reason = %flag.reason,
                "content auto-flagged"
            );
            publisher::publish_content_flagged(self.sink.as_ref(), &flag).await;
        }

        tracing::info!(scanned = engagements.len(), flagged = created, "auto-flag pass completed");
        Ok(created)
    }

    /// Returns true only if this call resolved the flag.
    pub async fn review_flagged_post(
        &self,
        post_id: Uuid,
        admin_id: Uuid,
        decision: FlagStatus,
        notes: Option<String>,
    ) -> AppResult<bool> {
        Ok(self.review(post_id, admin_id, decision, notes).await?.is_resolved())
    }

    pub async fn review(
        &self,
        post_id: Uuid,
        admin_id: Uuid,
        decision: FlagStatus,
        notes: Option<String>,
    ) -> AppResult<ReviewOutcome> {
        if decision == FlagStatus::Pending {
            return Err(AppError::new(
                ErrorCode::InvalidReviewDecision,
                "decision must be CLEARED or CONFIRMED",
            ));
        }

        let Some(flag) = self.store.find_unresolved_flag(post_id)? else {
            return Ok(ReviewOutcome::NoPendingFlag);
        };

        let now = Utc::now();
        let warning = (decision == FlagStatus::Confirmed).then(|| {
            let new = NewWarning {
                user_id: flag.owner_id,
                reason: format!("flag confirmed: {}", flag.reason),
                created_at: now,
            };
            (new, self.ledger.warning_penalty())
        });
        let resolution = FlagResolution {
            status: decision,
            reviewed_by: admin_id,
            notes,
            reviewed_at: now,
            trust: review_adjustment(&flag, decision, &self.ledger),
            warning,
        };
        let resolved = self.store.resolve_flag(flag.id, resolution)?;
        let Some(ResolvedFlag { flag, trust_score, warning }) = resolved else {
            return Ok(ReviewOutcome::AlreadyResolved);
        };

        self.store.record_admin_action(NewAdminAction {
            admin_id,
            action: format!("review_flag_{}", decision.as_str().to_lowercase()),
            target_user_id: Some(flag.owner_id),
            details: Some(serde_json::json!({
                "flag_id": flag.id,
                "content_id": flag.content_id,
                "notes": flag.notes,
            })),
        })?;
        tracing::info!(
            flag_id = %flag.id,
            decision = %decision,
            trust_score,
            "flag reviewed"
        );
        publisher::publish_flag_reviewed(self.sink.as_ref(), &flag, trust_score).await;

        if let Some(warning) = warning {
            let warning_id = warning.id;
            // Flag and warning are already committed.
            if let Err(e) = self.ledger.after_warning(warning, trust_score, now).await {
                tracing::error!(
                    flag_id = %flag.id,
                    warning_id = %warning_id,
                    error = %e,
                    "warning escalation failed after review"
                );
            }
        }

        Ok(ReviewOutcome::Resolved { flag, trust_score })
    }

    pub fn pending_flags(&self) -> AppResult<Vec<FlaggedContent>> {
        self.store.pending_flags()
    }
}
