pub mod collaborators;
pub mod detection;
pub mod earnings;
pub mod engagement_guard;
pub mod flag_review;
pub mod mode_config;
pub mod settlement;
pub mod trust;

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use engage_shared::errors::{AppError, AppResult};
    use engage_shared::types::pagination::PaginationParams;

    use crate::models::{
        AdminAction, CapScope, ClearOutcome, CreatorWarning, Earning, EarningsTotals, Engagement,
        EngagementType, FlagResolution, FlaggedContent, HoldState, InsertOutcome, NewAdminAction,
        NewEngagement, NewFlag, NewWarning, PlatformMode, PlatformModeConfig, Post, ResolvedFlag,
        StatusChange, TrustAdjustment, User, UserStatus, WarningSummary,
    };
    use crate::store::{CapDecision, EngineStore, MemoryStore};

    /// Active, fully verified, free-tier user with full trust.
    pub fn user() -> User {
        User {
            id: Uuid::new_v4(),
            trust_score: 100,
            status: UserStatus::Active,
            probation_until: None,
            suspended_at: None,
            email_verified: true,
            phone_verified: true,
            membership_tier: "free".into(),
            created_at: Utc::now(),
        }
    }

    pub fn post_by(author_id: Uuid) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id,
            likes_count: 0,
            comments_count: 0,
            shares_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn mode_row(mode: PlatformMode, per_post_cap: i64, daily_cap: i64) -> PlatformModeConfig {
        PlatformModeConfig {
            mode,
            per_post_cap,
            daily_cap,
            like_reward: 10,
            comment_reward: 50,
            share_reward: 25,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    /// Memory store that can hand out a stale user row from `find_user` and
    /// fail warning counts, for exercising races and partial failures.
    pub struct SkewedStore {
        pub inner: Arc<MemoryStore>,
        pub stale_users: HashMap<Uuid, User>,
        pub fail_warning_counts: bool,
    }

    impl SkewedStore {
        pub fn over(inner: Arc<MemoryStore>) -> Self {
            Self {
                inner,
                stale_users: HashMap::new(),
                fail_warning_counts: false,
            }
        }
    }

    impl EngineStore for SkewedStore {
        fn ping(&self) -> AppResult<()> {
            self.inner.ping()
        }

        fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
            match self.stale_users.get(&user_id) {
                Some(stale) => Ok(Some(stale.clone())),
                None => self.inner.find_user(user_id),
            }
        }

        fn find_post(&self, post_id: Uuid) -> AppResult<Option<Post>> {
            self.inner.find_post(post_id)
        }

        fn find_posts(&self, post_ids: &[Uuid]) -> AppResult<Vec<Post>> {
            self.inner.find_posts(post_ids)
        }

        fn update_user_status(
            &self,
            user_id: Uuid,
            allowed_from: &[UserStatus],
            change: StatusChange,
        ) -> AppResult<Option<User>> {
            self.inner.update_user_status(user_id, allowed_from, change)
        }

        fn complete_expired_probations(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
            self.inner.complete_expired_probations(now)
        }

        fn find_engagement(
            &self,
            post_id: Uuid,
            actor_id: Uuid,
            kind: EngagementType,
        ) -> AppResult<Option<Engagement>> {
            self.inner.find_engagement(post_id, actor_id, kind)
        }

        fn insert_engagement(&self, new: NewEngagement) -> AppResult<InsertOutcome<Engagement>> {
            self.inner.insert_engagement(new)
        }

        fn delete_engagement(&self, post_id: Uuid, actor_id: Uuid, kind: EngagementType) -> AppResult<bool> {
            self.inner.delete_engagement(post_id, actor_id, kind)
        }

        fn engagements_since(&self, since: DateTime<Utc>) -> AppResult<Vec<Engagement>> {
            self.inner.engagements_since(since)
        }

        fn credit_within_caps(
            &self,
            scope: CapScope,
            decide: &mut CapDecision<'_>,
        ) -> AppResult<Option<Earning>> {
            self.inner.credit_within_caps(scope, decide)
        }

        fn held_earnings_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Earning>> {
            self.inner.held_earnings_due(now)
        }

        fn transition_hold(&self, earning_id: Uuid, expected: DateTime<Utc>, next: &HoldState) -> AppResult<bool> {
            self.inner.transition_hold(earning_id, expected, next)
        }

        fn requeue_status_holds(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<u64> {
            self.inner.requeue_status_holds(user_id, now)
        }

        fn earnings_totals(&self, user_id: Uuid, day_start: DateTime<Utc>) -> AppResult<EarningsTotals> {
            self.inner.earnings_totals(user_id, day_start)
        }

        fn has_unresolved_flag(&self, content_id: Uuid) -> AppResult<bool> {
            self.inner.has_unresolved_flag(content_id)
        }

        fn find_unresolved_flag(&self, content_id: Uuid) -> AppResult<Option<FlaggedContent>> {
            self.inner.find_unresolved_flag(content_id)
        }

        fn raise_flag(&self, new: NewFlag, penalty: TrustAdjustment) -> AppResult<Option<FlaggedContent>> {
            self.inner.raise_flag(new, penalty)
        }

        fn resolve_flag(&self, flag_id: Uuid, resolution: FlagResolution) -> AppResult<Option<ResolvedFlag>> {
            self.inner.resolve_flag(flag_id, resolution)
        }

        fn pending_flags(&self) -> AppResult<Vec<FlaggedContent>> {
            self.inner.pending_flags()
        }

        fn issue_warning(&self, new: NewWarning, penalty: TrustAdjustment) -> AppResult<(CreatorWarning, i32)> {
            self.inner.issue_warning(new, penalty)
        }

        fn count_active_warnings_since(&self, user_id: Uuid, since: DateTime<Utc>) -> AppResult<i64> {
            if self.fail_warning_counts {
                return Err(AppError::internal("warning count unavailable"));
            }
            self.inner.count_active_warnings_since(user_id, since)
        }

        fn clear_warning(&self, warning_id: Uuid, cleared_by: Uuid, at: DateTime<Utc>) -> AppResult<ClearOutcome> {
            self.inner.clear_warning(warning_id, cleared_by, at)
        }

        fn warning_summary(&self, user_id: Uuid) -> AppResult<WarningSummary> {
            self.inner.warning_summary(user_id)
        }

        fn active_mode_config(&self) -> AppResult<Option<PlatformModeConfig>> {
            self.inner.active_mode_config()
        }

        fn record_admin_action(&self, action: NewAdminAction) -> AppResult<()> {
            self.inner.record_admin_action(action)
        }

        fn admin_actions(&self, params: &PaginationParams) -> AppResult<(Vec<AdminAction>, u64)> {
            self.inner.admin_actions(params)
        }
    }
}
