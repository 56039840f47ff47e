use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use engage_shared::types::event::{payloads, routing_keys, Event};

use super::EventSink;
use crate::models::{
    CreatorWarning, Earning, Engagement, EngagementType, FlaggedContent, UserStatus,
};

const SOURCE: &str = "engage-integrity";

async fn emit<T: Serialize>(sink: &dyn EventSink, routing_key: &str, event: Event<T>) {
    let payload = match serde_json::to_vec(&event) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, routing_key = %routing_key, "failed to serialize event");
            return;
        }
    };

    if let Err(e) = sink.publish_raw(routing_key, payload).await {
        tracing::error!(error = %e, routing_key = %routing_key, "failed to publish event");
    }
}

pub async fn publish_engagement_recorded(sink: &dyn EventSink, engagement: &Engagement) {
    let event = Event::new(
        SOURCE,
        routing_keys::ENGAGEMENT_RECORDED,
        payloads::EngagementRecorded {
            engagement_id: engagement.id,
            post_id: engagement.post_id,
            actor_id: engagement.actor_id,
            engagement_type: engagement.engagement_type.to_string(),
        },
    )
    .with_user(engagement.actor_id);

    emit(sink, routing_keys::ENGAGEMENT_RECORDED, event).await;
}

pub async fn publish_engagement_removed(
    sink: &dyn EventSink,
    post_id: Uuid,
    actor_id: Uuid,
    kind: EngagementType,
) {
    let event = Event::new(
        SOURCE,
        routing_keys::ENGAGEMENT_REMOVED,
        payloads::EngagementRemoved {
            post_id,
            actor_id,
            engagement_type: kind.to_string(),
        },
    )
    .with_user(actor_id);

    emit(sink, routing_keys::ENGAGEMENT_REMOVED, event).await;
}

pub async fn publish_reward_credited(sink: &dyn EventSink, earning: &Earning) {
    let event = Event::new(
        SOURCE,
        routing_keys::EARNINGS_REWARD_CREDITED,
        payloads::RewardCredited {
            earning_id: earning.id,
            post_id: earning.post_id,
            user_id: earning.user_id,
            amount: earning.amount,
            mode: earning.mode.to_string(),
            held_until: earning.held_until,
            hold_reason: earning.hold_reason.clone(),
        },
    )
    .with_user(earning.user_id);

    emit(sink, routing_keys::EARNINGS_REWARD_CREDITED, event).await;
}

pub async fn publish_sweep_completed(sink: &dyn EventSink, report: payloads::SweepCompleted) {
    let event = Event::new(SOURCE, routing_keys::EARNINGS_SWEEP_COMPLETED, report);
    emit(sink, routing_keys::EARNINGS_SWEEP_COMPLETED, event).await;
}

pub async fn publish_content_flagged(sink: &dyn EventSink, flag: &FlaggedContent) {
    let event = Event::new(
        SOURCE,
        routing_keys::INTEGRITY_CONTENT_FLAGGED,
        payloads::ContentFlagged {
            flag_id: flag.id,
            content_id: flag.content_id,
            owner_id: flag.owner_id,
            reason: flag.reason.clone(),
        },
    )
    .with_user(flag.owner_id);

    emit(sink, routing_keys::INTEGRITY_CONTENT_FLAGGED, event).await;
}

pub async fn publish_flag_reviewed(sink: &dyn EventSink, flag: &FlaggedContent, trust_score: i32) {
    let Some(reviewed_by) = flag.reviewed_by else {
        tracing::warn!(flag_id = %flag.id, "skipping flag.reviewed event for unreviewed flag");
        return;
    };
    let event = Event::new(
        SOURCE,
        routing_keys::INTEGRITY_FLAG_REVIEWED,
        payloads::FlagReviewed {
            flag_id: flag.id,
            content_id: flag.content_id,
            owner_id: flag.owner_id,
            status: flag.status.to_string(),
            reviewed_by,
            trust_score: Some(trust_score),
        },
    )
    .with_user(flag.owner_id);

    emit(sink, routing_keys::INTEGRITY_FLAG_REVIEWED, event).await;
}

pub async fn publish_warning_issued(sink: &dyn EventSink, warning: &CreatorWarning, active_warnings: i64) {
    let event = Event::new(
        SOURCE,
        routing_keys::INTEGRITY_WARNING_ISSUED,
        payloads::WarningIssued {
            warning_id: warning.id,
            user_id: warning.user_id,
            reason: warning.reason.clone(),
            active_warnings,
        },
    )
    .with_user(warning.user_id);

    emit(sink, routing_keys::INTEGRITY_WARNING_ISSUED, event).await;
}

pub async fn publish_warning_cleared(sink: &dyn EventSink, warning: &CreatorWarning, cleared_by: Uuid) {
    let event = Event::new(
        SOURCE,
        routing_keys::INTEGRITY_WARNING_CLEARED,
        payloads::WarningCleared {
            warning_id: warning.id,
            user_id: warning.user_id,
            cleared_by,
        },
    )
    .with_user(warning.user_id);

    emit(sink, routing_keys::INTEGRITY_WARNING_CLEARED, event).await;
}

pub async fn publish_status_changed(
    sink: &dyn EventSink,
    user_id: Uuid,
    status: UserStatus,
    probation_until: Option<DateTime<Utc>>,
) {
    let event = Event::new(
        SOURCE,
        routing_keys::INTEGRITY_STATUS_CHANGED,
        payloads::StatusChanged {
            user_id,
            status: status.to_string(),
            probation_until,
        },
    )
    .with_user(user_id);

    emit(sink, routing_keys::INTEGRITY_STATUS_CHANGED, event).await;
}
