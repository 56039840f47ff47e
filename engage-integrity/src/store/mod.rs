//! Storage repository for the engine.
//!
//! Every component reads and mutates shared state through [`EngineStore`], which
//! is built once at startup and injected. Methods that must be atomic against
//! concurrent callers say so; implementations are expected to honour that with
//! a transaction (Postgres) or a single lock (memory).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use engage_shared::errors::AppResult;
use engage_shared::types::pagination::PaginationParams;

use crate::models::{
    AdminAction, CapScope, CapState, ClearOutcome, CreatorWarning, Earning, EarningsTotals,
    Engagement, EngagementType, FlagResolution, FlaggedContent, HoldState, InsertOutcome,
    NewAdminAction, NewEarning, NewEngagement, NewFlag, NewWarning, PlatformModeConfig, Post,
    ResolvedFlag, StatusChange, TrustAdjustment, User, UserStatus, WarningSummary,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Decides what to write from the state read inside the cap scope. Returning
/// `None` writes nothing.
pub type CapDecision<'a> = dyn FnMut(&CapState) -> Option<NewEarning> + 'a;

pub trait EngineStore: Send + Sync {
    /// Cheap liveness check for `/health`.
    fn ping(&self) -> AppResult<()>;

    // --- users and posts ---

    fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>>;

    fn find_post(&self, post_id: Uuid) -> AppResult<Option<Post>>;

    fn find_posts(&self, post_ids: &[Uuid]) -> AppResult<Vec<Post>>;

    /// Transition a user's status if it is currently one of `allowed_from`.
    /// Returns the updated row, or `None` if the user was not in an allowed state.
    fn update_user_status(
        &self,
        user_id: Uuid,
        allowed_from: &[UserStatus],
        change: StatusChange,
    ) -> AppResult<Option<User>>;

    /// Move every probation that ended at or before `now` back to ACTIVE.
    fn complete_expired_probations(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>>;

    // --- engagements ---

    fn find_engagement(
        &self,
        post_id: Uuid,
        actor_id: Uuid,
        kind: EngagementType,
    ) -> AppResult<Option<Engagement>>;

    /// Insert guarded by the (post, actor, type) uniqueness constraint.
    fn insert_engagement(&self, new: NewEngagement) -> AppResult<InsertOutcome<Engagement>>;

    fn delete_engagement(&self, post_id: Uuid, actor_id: Uuid, kind: EngagementType) -> AppResult<bool>;

    fn engagements_since(&self, since: DateTime<Utc>) -> AppResult<Vec<Engagement>>;

    // --- earnings ---

    /// Read today's usage, the payee row and the post's flag state, then write
    /// the decided earning, as one serialized unit per (post, day) and
    /// (payee, day). The payee row stays locked until the write commits, so a
    /// concurrent status change lands either before the read or after the write.
    fn credit_within_caps(
        &self,
        scope: CapScope,
        decide: &mut CapDecision<'_>,
    ) -> AppResult<Option<Earning>>;

    /// Unpaid earnings whose hold has come due.
    fn held_earnings_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Earning>>;

    /// Conditional hold transition: applies only if the row is still unpaid and
    /// its `held_until` still equals `expected`.
    fn transition_hold(&self, earning_id: Uuid, expected: DateTime<Utc>, next: &HoldState) -> AppResult<bool>;

    /// Bring a user's suspension and probation holds due at `now`, so the next
    /// sweep re-evaluates them. Returns the number of rows moved.
    fn requeue_status_holds(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<u64>;

    fn earnings_totals(&self, user_id: Uuid, day_start: DateTime<Utc>) -> AppResult<EarningsTotals>;

    // --- flags ---

    fn has_unresolved_flag(&self, content_id: Uuid) -> AppResult<bool>;

    fn find_unresolved_flag(&self, content_id: Uuid) -> AppResult<Option<FlaggedContent>>;

    /// Create a PENDING flag unless one is already unresolved for the content,
    /// and apply `penalty` to the owner's trust score in the same unit.
    fn raise_flag(&self, new: NewFlag, penalty: TrustAdjustment) -> AppResult<Option<FlaggedContent>>;

    /// Resolve a PENDING flag exactly once, apply the trust adjustment and
    /// issue the resolution's warning, all in one unit. Returns `None` if the
    /// flag was missing or already resolved.
    fn resolve_flag(&self, flag_id: Uuid, resolution: FlagResolution) -> AppResult<Option<ResolvedFlag>>;

    fn pending_flags(&self) -> AppResult<Vec<FlaggedContent>>;

    // --- warnings ---

    /// Append a warning and apply `penalty` atomically, recording the points
    /// actually taken on the row. Returns the warning and the new trust score.
    fn issue_warning(&self, new: NewWarning, penalty: TrustAdjustment) -> AppResult<(CreatorWarning, i32)>;

    fn count_active_warnings_since(&self, user_id: Uuid, since: DateTime<Utc>) -> AppResult<i64>;

    /// Clear an active warning and give back the points it recorded, atomically.
    fn clear_warning(&self, warning_id: Uuid, cleared_by: Uuid, at: DateTime<Utc>) -> AppResult<ClearOutcome>;

    fn warning_summary(&self, user_id: Uuid) -> AppResult<WarningSummary>;

    // --- mode config and audit ---

    fn active_mode_config(&self) -> AppResult<Option<PlatformModeConfig>>;

    fn record_admin_action(&self, action: NewAdminAction) -> AppResult<()>;

    fn admin_actions(&self, params: &PaginationParams) -> AppResult<(Vec<AdminAction>, u64)>;
}
