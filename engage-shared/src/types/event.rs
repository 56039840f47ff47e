use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ Event envelope wrapping all domain events.
///
/// Routing key format: `engage.{domain}.{entity}.{action}`
/// Example: `engage.earnings.reward.credited`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Engagement events
    pub const ENGAGEMENT_RECORDED: &str = "engage.engagement.event.recorded";
    pub const ENGAGEMENT_REMOVED: &str = "engage.engagement.event.removed";

    // Earnings events
    pub const EARNINGS_REWARD_CREDITED: &str = "engage.earnings.reward.credited";
    pub const EARNINGS_SWEEP_COMPLETED: &str = "engage.earnings.sweep.completed";

    // Integrity events
    pub const INTEGRITY_CONTENT_FLAGGED: &str = "engage.integrity.content.flagged";
    pub const INTEGRITY_FLAG_REVIEWED: &str = "engage.integrity.flag.reviewed";
    pub const INTEGRITY_WARNING_ISSUED: &str = "engage.integrity.warning.issued";
    pub const INTEGRITY_WARNING_CLEARED: &str = "engage.integrity.warning.cleared";
    pub const INTEGRITY_STATUS_CHANGED: &str = "engage.integrity.user.status_changed";
}

/// Common event data payloads
pub mod payloads {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct EngagementRecorded {
        pub engagement_id: Uuid,
        pub post_id: Uuid,
        pub actor_id: Uuid,
        pub engagement_type: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct EngagementRemoved {
        pub post_id: Uuid,
        pub actor_id: Uuid,
        pub engagement_type: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RewardCredited {
        pub earning_id: Uuid,
        pub post_id: Option<Uuid>,
        pub user_id: Uuid,
        pub amount: i64,
        pub mode: String,
        pub held_until: Option<DateTime<Utc>>,
        pub hold_reason: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SweepCompleted {
        pub total_reviewed: u64,
        pub released: u64,
        pub still_held: u64,
        pub suspended: u64,
        pub probation_completed: u64,
        pub failed: u64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ContentFlagged {
        pub flag_id: Uuid,
        pub content_id: Uuid,
        pub owner_id: Uuid,
        pub reason: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FlagReviewed {
        pub flag_id: Uuid,
        pub content_id: Uuid,
        pub owner_id: Uuid,
        pub status: String,
        pub reviewed_by: Uuid,
        pub trust_score: Option<i32>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct WarningIssued {
        pub warning_id: Uuid,
        pub user_id: Uuid,
        pub reason: String,
        pub active_warnings: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct WarningCleared {
        pub warning_id: Uuid,
        pub user_id: Uuid,
        pub cleared_by: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct StatusChanged {
        pub user_id: Uuid,
        pub status: String,
        pub probation_until: Option<DateTime<Utc>>,
    }
}
