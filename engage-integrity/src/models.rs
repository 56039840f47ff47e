use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{
    admin_actions, creator_warnings, earnings, engagements, flagged_content,
    platform_mode_config, posts, users,
};

/// Declares a closed string-backed enum stored in a `Varchar` column.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
            diesel::AsExpression, diesel::FromSqlRow,
        )]
        #[diesel(sql_type = diesel::sql_types::Text)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_uppercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!("unknown {}: {s}", stringify!($name))),
                }
            }
        }

        impl diesel::serialize::ToSql<diesel::sql_types::Text, diesel::pg::Pg> for $name {
            fn to_sql<'b>(
                &'b self,
                out: &mut diesel::serialize::Output<'b, '_, diesel::pg::Pg>,
            ) -> diesel::serialize::Result {
                use std::io::Write;
                out.write_all(self.as_str().as_bytes())?;
                Ok(diesel::serialize::IsNull::No)
            }
        }

        impl diesel::deserialize::FromSql<diesel::sql_types::Text, diesel::pg::Pg> for $name {
            fn from_sql(bytes: diesel::pg::PgValue<'_>) -> diesel::deserialize::Result<Self> {
                let raw = <String as diesel::deserialize::FromSql<
                    diesel::sql_types::Text,
                    diesel::pg::Pg,
                >>::from_sql(bytes)?;
                raw.parse().map_err(Into::into)
            }
        }
    };
}

text_enum!(
    /// Kind of engagement a user performs on a post.
    EngagementType {
        Like => "LIKE",
        Comment => "COMMENT",
        Share => "SHARE",
    }
);

text_enum!(
    UserStatus {
        Active => "ACTIVE",
        Probation => "PROBATION",
        Suspended => "SUSPENDED",
    }
);

text_enum!(
    FlagStatus {
        Pending => "PENDING",
        Cleared => "CLEARED",
        Confirmed => "CONFIRMED",
    }
);

text_enum!(
    /// Platform-wide reward regime.
    PlatformMode {
        Beta => "BETA",
        Natural => "NATURAL",
    }
);

impl EngagementType {
    pub const ALL: [EngagementType; 3] = [Self::Like, Self::Comment, Self::Share];
}

pub const CONTENT_TYPE_POST: &str = "POST";

pub const HOLD_SUSPENDED: &str = "suspended";
pub const HOLD_UNDER_REVIEW: &str = "under review";
pub const HOLD_PROBATION: &str = "probation";
pub const HOLD_LOW_TRUST: &str = "low trust";

pub const TRUST_MIN: i32 = 0;
pub const TRUST_MAX: i32 = 100;

/// Held-until sentinel for earnings that must never release on their own.
pub fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// UTC calendar-day bounds containing `at`.
pub fn day_bounds(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = at
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(at);
    (start, start + chrono::Duration::days(1))
}

// --- User ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub trust_score: i32,
    pub status: UserStatus,
    pub probation_until: Option<DateTime<Utc>>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub membership_tier: String,
    pub created_at: DateTime<Utc>,
}

/// A status transition requested by the trust ledger or an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Probation { until: DateTime<Utc> },
    Suspended { at: DateTime<Utc> },
    Active,
}

impl StatusChange {
    pub fn status(&self) -> UserStatus {
        match self {
            StatusChange::Probation { .. } => UserStatus::Probation,
            StatusChange::Suspended { .. } => UserStatus::Suspended,
            StatusChange::Active => UserStatus::Active,
        }
    }

    /// Apply to a user row in place.
    pub fn apply(&self, user: &mut User) {
        match *self {
            StatusChange::Probation { until } => {
                user.status = UserStatus::Probation;
                user.probation_until = Some(until);
            }
            StatusChange::Suspended { at } => {
                user.status = UserStatus::Suspended;
                user.suspended_at = Some(at);
            }
            StatusChange::Active => {
                user.status = UserStatus::Active;
                user.probation_until = None;
                user.suspended_at = None;
            }
        }
    }
}

/// A bounded change to a trust score.
///
/// Negative deltas clamp at zero. Positive deltas clamp at 100 and, when a
/// ceiling is set, never lift the score past it (nor lower a score already above it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustAdjustment {
    pub delta: i32,
    pub ceiling: Option<i32>,
}

impl TrustAdjustment {
    pub fn penalty(points: i32) -> Self {
        Self { delta: -points.abs(), ceiling: None }
    }

    pub fn restore(points: i32, ceiling: Option<i32>) -> Self {
        Self { delta: points.abs(), ceiling }
    }

    pub fn none() -> Self {
        Self { delta: 0, ceiling: None }
    }

    pub fn apply(&self, current: i32) -> i32 {
        let raw = (current + self.delta).clamp(TRUST_MIN, TRUST_MAX);
        match self.ceiling {
            Some(ceiling) if self.delta > 0 => raw.min(ceiling).max(current),
            _ => raw,
        }
    }
}

// --- Post ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = posts)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub likes_count: i32,
    pub comments_count: i32,
    pub shares_count: i32,
    pub created_at: DateTime<Utc>,
}

// --- Engagement ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = engagements)]
pub struct Engagement {
    pub id: Uuid,
    pub post_id: Uuid,
    pub actor_id: Uuid,
    pub engagement_type: EngagementType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = engagements)]
pub struct NewEngagement {
    pub post_id: Uuid,
    pub actor_id: Uuid,
    pub engagement_type: EngagementType,
    pub created_at: DateTime<Utc>,
}

/// Result of a uniqueness-guarded insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome<T> {
    Inserted(T),
    Duplicate,
}

// --- Earning ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = earnings)]
pub struct Earning {
    pub id: Uuid,
    pub post_id: Option<Uuid>,
    pub user_id: Uuid,
    pub amount: i64,
    pub is_paid: bool,
    pub held_until: Option<DateTime<Utc>>,
    pub hold_reason: Option<String>,
    pub engagement_type: Option<EngagementType>,
    pub mode: PlatformMode,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = earnings)]
pub struct NewEarning {
    pub post_id: Option<Uuid>,
    pub user_id: Uuid,
    pub amount: i64,
    pub held_until: Option<DateTime<Utc>>,
    pub hold_reason: Option<String>,
    pub engagement_type: Option<EngagementType>,
    pub mode: PlatformMode,
    pub created_at: DateTime<Utc>,
}

/// Target hold state for a settlement transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldState {
    Held { until: DateTime<Utc>, reason: &'static str },
    Released,
}

impl HoldState {
    pub fn held_until(&self) -> Option<DateTime<Utc>> {
        match self {
            HoldState::Held { until, .. } => Some(*until),
            HoldState::Released => None,
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            HoldState::Held { reason, .. } => Some(reason),
            HoldState::Released => None,
        }
    }
}

/// Key for the serialized cap-check-and-write scope.
#[derive(Debug, Clone, Copy)]
pub struct CapScope {
    pub post_id: Uuid,
    pub payee_id: Uuid,
    pub day_start: DateTime<Utc>,
    pub day_end: DateTime<Utc>,
}

/// Amounts already credited today, read inside a cap scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapUsage {
    pub post_today: i64,
    pub payee_today: i64,
}

/// Everything read inside a cap scope that decides the new earning: cap
/// usage plus the payee and flag state its hold depends on.
#[derive(Debug, Clone)]
pub struct CapState {
    pub usage: CapUsage,
    pub payee: User,
    pub post_flagged: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct EarningsTotals {
    pub total: i64,
    pub paid: i64,
    pub available: i64,
    pub held: i64,
    pub today: i64,
    pub count: i64,
}

// --- FlaggedContent ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = flagged_content)]
pub struct FlaggedContent {
    pub id: Uuid,
    pub content_id: Uuid,
    pub content_type: String,
    pub owner_id: Uuid,
    pub reason: String,
    pub status: FlagStatus,
    pub resolved: bool,
    pub reviewed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub trust_before: i32,
    pub trust_penalty: i32,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = flagged_content)]
pub struct NewFlag {
    pub content_id: Uuid,
    pub content_type: String,
    pub owner_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Reviewer decision applied to a pending flag.
#[derive(Debug, Clone)]
pub struct FlagResolution {
    pub status: FlagStatus,
    pub reviewed_by: Uuid,
    pub notes: Option<String>,
    pub reviewed_at: DateTime<Utc>,
    pub trust: TrustAdjustment,
    /// Warning issued to the owner in the same unit as the resolution.
    pub warning: Option<(NewWarning, TrustAdjustment)>,
}

#[derive(Debug, Clone)]
pub struct ResolvedFlag {
    pub flag: FlaggedContent,
    /// Owner's score after every adjustment in the resolution.
    pub trust_score: i32,
    pub warning: Option<CreatorWarning>,
}

// --- CreatorWarning ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = creator_warnings)]
pub struct CreatorWarning {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub cleared_at: Option<DateTime<Utc>>,
    pub cleared_by: Option<Uuid>,
    /// Trust points this warning actually took (after clamping at zero).
    pub trust_penalty: i32,
}

impl CreatorWarning {
    pub fn is_active(&self) -> bool {
        self.cleared_at.is_none()
    }
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = creator_warnings)]
pub struct NewWarning {
    pub user_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum ClearOutcome {
    Cleared(CreatorWarning),
    AlreadyCleared,
    NotFound,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct WarningSummary {
    pub active: i64,
    pub total: i64,
    pub last_issued_at: Option<DateTime<Utc>>,
}

// --- PlatformModeConfig ---

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = platform_mode_config)]
pub struct PlatformModeConfig {
    pub mode: PlatformMode,
    pub per_post_cap: i64,
    pub daily_cap: i64,
    pub like_reward: i64,
    pub comment_reward: i64,
    pub share_reward: i64,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

// --- AdminAction ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = admin_actions)]
pub struct AdminAction {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action: String,
    pub target_user_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = admin_actions)]
pub struct NewAdminAction {
    pub admin_id: Uuid,
    pub action: String,
    pub target_user_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
}
