//! In-process store. Every operation runs under one mutex, which gives the
//! same atomicity the Postgres store gets from transactions and constraints.
//! Used for tests and single-node development.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use engage_shared::errors::{AppError, AppResult};
use engage_shared::types::pagination::PaginationParams;

use super::{CapDecision, EngineStore};
use crate::models::{
    AdminAction, CapScope, CapState, CapUsage, ClearOutcome, CreatorWarning, Earning,
    EarningsTotals, Engagement, EngagementType, FlagResolution, FlagStatus, FlaggedContent,
    HoldState, InsertOutcome, NewAdminAction, NewEngagement, NewFlag, NewWarning,
    PlatformModeConfig, Post, ResolvedFlag, StatusChange, TrustAdjustment, User, UserStatus,
    WarningSummary, HOLD_PROBATION, HOLD_SUSPENDED,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    posts: HashMap<Uuid, Post>,
    engagements: Vec<Engagement>,
    earnings: Vec<Earning>,
    flags: Vec<FlaggedContent>,
    warnings: Vec<CreatorWarning>,
    modes: Vec<PlatformModeConfig>,
    admin_actions: Vec<AdminAction>,
}

impl MemoryState {
    fn adjust_trust(&mut self, user_id: Uuid, adjustment: TrustAdjustment) -> AppResult<(i32, i32)> {
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::internal(format!("user {user_id} missing from store")))?;
        let before = user.trust_score;
        user.trust_score = adjustment.apply(before);
        Ok((before, user.trust_score))
    }

    fn insert_warning(
        &mut self,
        new: NewWarning,
        penalty: TrustAdjustment,
    ) -> AppResult<(CreatorWarning, i32)> {
        let (before, after) = self.adjust_trust(new.user_id, penalty)?;
        let warning = CreatorWarning {
            id: Uuid::now_v7(),
            user_id: new.user_id,
            reason: new.reason,
            created_at: new.created_at,
            cleared_at: None,
            cleared_by: None,
            trust_penalty: before - after,
        };
        self.warnings.push(warning.clone());
        Ok((warning, after))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::internal("memory store lock poisoned"))
    }

    /// Seed or replace a user row (owned by the host application).
    pub fn put_user(&self, user: User) -> AppResult<()> {
        self.lock()?.users.insert(user.id, user);
        Ok(())
    }

    /// Seed or replace a post row (owned by the host application).
    pub fn put_post(&self, post: Post) -> AppResult<()> {
        self.lock()?.posts.insert(post.id, post);
        Ok(())
    }

    /// Install a mode row; activating one deactivates the others.
    pub fn put_mode_config(&self, config: PlatformModeConfig) -> AppResult<()> {
        let mut state = self.lock()?;
        if config.is_active {
            for existing in state.modes.iter_mut() {
                existing.is_active = false;
            }
        }
        state.modes.retain(|m| m.mode != config.mode);
        state.modes.push(config);
        Ok(())
    }

    /// Seed an earning row directly, bypassing cap checks.
    pub fn put_earning(&self, earning: Earning) -> AppResult<()> {
        self.lock()?.earnings.push(earning);
        Ok(())
    }

    pub fn earnings_for(&self, user_id: Uuid) -> AppResult<Vec<Earning>> {
        Ok(self
            .lock()?
            .earnings
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    pub fn engagement_count(&self) -> AppResult<usize> {
        Ok(self.lock()?.engagements.len())
    }
}

impl EngineStore for MemoryStore {
    fn ping(&self) -> AppResult<()> {
        self.lock().map(|_| ())
    }

    fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    fn find_post(&self, post_id: Uuid) -> AppResult<Option<Post>> {
        Ok(self.lock()?.posts.get(&post_id).cloned())
    }

    fn find_posts(&self, post_ids: &[Uuid]) -> AppResult<Vec<Post>> {
        let state = self.lock()?;
        Ok(post_ids.iter().filter_map(|id| state.posts.get(id).cloned()).collect())
    }

    fn update_user_status(
        &self,
        user_id: Uuid,
        allowed_from: &[UserStatus],
        change: StatusChange,
    ) -> AppResult<Option<User>> {
        let mut state = self.lock()?;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(None);
        };
        if !allowed_from.contains(&user.status) {
            return Ok(None);
        }
        change.apply(user);
        Ok(Some(user.clone()))
    }

    fn complete_expired_probations(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let mut state = self.lock()?;
        let mut completed = Vec::new();
        for user in state.users.values_mut() {
            let expired = user.status == UserStatus::Probation
                && user.probation_until.is_some_and(|until| until <= now);
            if expired {
                StatusChange::Active.apply(user);
                completed.push(user.id);
            }
        }
        Ok(completed)
    }

    fn find_engagement(
        &self,
        post_id: Uuid,
        actor_id: Uuid,
        kind: EngagementType,
    ) -> AppResult<Option<Engagement>> {
        Ok(self
            .lock()?
            .engagements
            .iter()
            .find(|e| e.post_id == post_id && e.actor_id == actor_id && e.engagement_type == kind)
            .cloned())
    }

    fn insert_engagement(&self, new: NewEngagement) -> AppResult<InsertOutcome<Engagement>> {
        let mut state = self.lock()?;
        let exists = state.engagements.iter().any(|e| {
            e.post_id == new.post_id
                && e.actor_id == new.actor_id
                && e.engagement_type == new.engagement_type
        });
        if exists {
            return Ok(InsertOutcome::Duplicate);
        }
        let engagement = Engagement {
            id: Uuid::now_v7(),
            post_id: new.post_id,
            actor_id: new.actor_id,
            engagement_type: new.engagement_type,
            created_at: new.created_at,
        };
        state.engagements.push(engagement.clone());
        Ok(InsertOutcome::Inserted(engagement))
    }

    fn delete_engagement(&self, post_id: Uuid, actor_id: Uuid, kind: EngagementType) -> AppResult<bool> {
        let mut state = self.lock()?;
        let before = state.engagements.len();
        state
            .engagements
            .retain(|e| !(e.post_id == post_id && e.actor_id == actor_id && e.engagement_type == kind));
        Ok(state.engagements.len() != before)
    }

    fn engagements_since(&self, since: DateTime<Utc>) -> AppResult<Vec<Engagement>> {
        Ok(self
            .lock()?
            .engagements
            .iter()
            .filter(|e| e.created_at >= since)
            .cloned()
            .collect())
    }

    fn credit_within_caps(
        &self,
        scope: CapScope,
        decide: &mut CapDecision<'_>,
    ) -> AppResult<Option<Earning>> {
        let mut state = self.lock()?;
        let payee = state
            .users
            .get(&scope.payee_id)
            .cloned()
            .ok_or_else(|| AppError::internal(format!("user {} missing from store", scope.payee_id)))?;
        let post_flagged = state
            .flags
            .iter()
            .any(|f| f.content_id == scope.post_id && !f.resolved);
        let in_day = |e: &&Earning| e.created_at >= scope.day_start && e.created_at < scope.day_end;
        let usage = CapUsage {
            post_today: state
                .earnings
                .iter()
                .filter(in_day)
                .filter(|e| e.post_id == Some(scope.post_id))
                .map(|e| e.amount)
                .sum(),
            payee_today: state
                .earnings
                .iter()
                .filter(in_day)
                .filter(|e| e.user_id == scope.payee_id)
                .map(|e| e.amount)
                .sum(),
        };

        let Some(new) = decide(&CapState { usage, payee, post_flagged }) else {
            return Ok(None);
        };
        let earning = Earning {
            id: Uuid::now_v7(),
            post_id: new.post_id,
            user_id: new.user_id,
            amount: new.amount,
            is_paid: false,
            held_until: new.held_until,
            hold_reason: new.hold_reason,
            engagement_type: new.engagement_type,
            mode: new.mode,
            created_at: new.created_at,
        };
        state.earnings.push(earning.clone());
        Ok(Some(earning))
    }

    fn held_earnings_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Earning>> {
        let mut due: Vec<Earning> = self
            .lock()?
            .earnings
            .iter()
            .filter(|e| !e.is_paid && e.held_until.is_some_and(|until| until <= now))
            .cloned()
            .collect();
        due.sort_by_key(|e| (e.held_until, e.created_at));
        Ok(due)
    }

    fn transition_hold(&self, earning_id: Uuid, expected: DateTime<Utc>, next: &HoldState) -> AppResult<bool> {
        let mut state = self.lock()?;
        let Some(earning) = state.earnings.iter_mut().find(|e| e.id == earning_id) else {
            return Ok(false);
        };
        if earning.is_paid || earning.held_until != Some(expected) {
            return Ok(false);
        }
        earning.held_until = next.held_until();
        earning.hold_reason = next.reason().map(str::to_string);
        Ok(true)
    }

    fn requeue_status_holds(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.lock()?;
        let mut moved = 0;
        for earning in state.earnings.iter_mut() {
            let parked = earning.user_id == user_id
                && !earning.is_paid
                && earning.held_until.is_some_and(|until| until > now)
                && matches!(earning.hold_reason.as_deref(), Some(HOLD_SUSPENDED | HOLD_PROBATION));
            if parked {
                earning.held_until = Some(now);
                moved += 1;
            }
        }
        Ok(moved)
    }

    fn earnings_totals(&self, user_id: Uuid, day_start: DateTime<Utc>) -> AppResult<EarningsTotals> {
        let state = self.lock()?;
        let mut totals = EarningsTotals::default();
        for e in state.earnings.iter().filter(|e| e.user_id == user_id) {
            totals.total += e.amount;
            totals.count += 1;
            if e.is_paid {
                totals.paid += e.amount;
            } else if e.held_until.is_some() {
                totals.held += e.amount;
            } else {
                totals.available += e.amount;
            }
            if e.created_at >= day_start {
                totals.today += e.amount;
            }
        }
        Ok(totals)
    }

    fn has_unresolved_flag(&self, content_id: Uuid) -> AppResult<bool> {
        Ok(self
            .lock()?
            .flags
            .iter()
            .any(|f| f.content_id == content_id && !f.resolved))
    }

    fn find_unresolved_flag(&self, content_id: Uuid) -> AppResult<Option<FlaggedContent>> {
        Ok(self
            .lock()?
            .flags
            .iter()
            .find(|f| f.content_id == content_id && !f.resolved)
            .cloned())
    }

    fn raise_flag(&self, new: NewFlag, penalty: TrustAdjustment) -> AppResult<Option<FlaggedContent>> {
        let mut state = self.lock()?;
        let pending = state
            .flags
            .iter()
            .any(|f| f.content_id == new.content_id && f.content_type == new.content_type && !f.resolved);
        if pending {
            return Ok(None);
        }
        let (before, after) = state.adjust_trust(new.owner_id, penalty)?;
        let flag = FlaggedContent {
            id: Uuid::now_v7(),
            content_id: new.content_id,
            content_type: new.content_type,
            owner_id: new.owner_id,
            reason: new.reason,
            status: FlagStatus::Pending,
            resolved: false,
            reviewed_by: None,
            notes: None,
            trust_before: before,
            trust_penalty: before - after,
            created_at: new.created_at,
            reviewed_at: None,
        };
        state.flags.push(flag.clone());
        Ok(Some(flag))
    }

    fn resolve_flag(&self, flag_id: Uuid, resolution: FlagResolution) -> AppResult<Option<ResolvedFlag>> {
        let mut state = self.lock()?;
        let Some(index) = state.flags.iter().position(|f| f.id == flag_id && !f.resolved) else {
            return Ok(None);
        };
        let owner_id = state.flags[index].owner_id;
        if !state.users.contains_key(&owner_id) {
            return Err(AppError::internal(format!("user {owner_id} missing from store")));
        }

        let flag = &mut state.flags[index];
        flag.status = resolution.status;
        flag.resolved = true;
        flag.reviewed_by = Some(resolution.reviewed_by);
        flag.notes = resolution.notes;
        flag.reviewed_at = Some(resolution.reviewed_at);
        let flag = flag.clone();

        let (_, mut trust_score) = state.adjust_trust(owner_id, resolution.trust)?;
        let warning = match resolution.warning {
            Some((new, penalty)) => {
                let (warning, score) = state.insert_warning(new, penalty)?;
                trust_score = score;
                Some(warning)
            }
            None => None,
        };
        Ok(Some(ResolvedFlag { flag, trust_score, warning }))
    }

    fn pending_flags(&self) -> AppResult<Vec<FlaggedContent>> {
        let mut flags: Vec<FlaggedContent> = self
            .lock()?
            .flags
            .iter()
            .filter(|f| f.status == FlagStatus::Pending)
            .cloned()
            .collect();
        flags.sort_by_key(|f| f.created_at);
        Ok(flags)
    }

    fn issue_warning(&self, new: NewWarning, penalty: TrustAdjustment) -> AppResult<(CreatorWarning, i32)> {
        self.lock()?.insert_warning(new, penalty)
    }

    fn count_active_warnings_since(&self, user_id: Uuid, since: DateTime<Utc>) -> AppResult<i64> {
        Ok(self
            .lock()?
            .warnings
            .iter()
            .filter(|w| w.user_id == user_id && w.is_active() && w.created_at >= since)
            .count() as i64)
    }

    fn clear_warning(&self, warning_id: Uuid, cleared_by: Uuid, at: DateTime<Utc>) -> AppResult<ClearOutcome> {
        let mut state = self.lock()?;
        let Some(warning) = state.warnings.iter_mut().find(|w| w.id == warning_id) else {
            return Ok(ClearOutcome::NotFound);
        };
        if !warning.is_active() {
            return Ok(ClearOutcome::AlreadyCleared);
        }
        warning.cleared_at = Some(at);
        warning.cleared_by = Some(cleared_by);
        let warning = warning.clone();
        state.adjust_trust(warning.user_id, TrustAdjustment::restore(warning.trust_penalty, None))?;
        Ok(ClearOutcome::Cleared(warning))
    }

    fn warning_summary(&self, user_id: Uuid) -> AppResult<WarningSummary> {
        let state = self.lock()?;
        let mut summary = WarningSummary::default();
        for w in state.warnings.iter().filter(|w| w.user_id == user_id) {
            summary.total += 1;
            if w.is_active() {
                summary.active += 1;
            }
            summary.last_issued_at = summary.last_issued_at.max(Some(w.created_at));
        }
        Ok(summary)
    }

    fn active_mode_config(&self) -> AppResult<Option<PlatformModeConfig>> {
        Ok(self.lock()?.modes.iter().find(|m| m.is_active).cloned())
    }

    fn record_admin_action(&self, action: NewAdminAction) -> AppResult<()> {
        self.lock()?.admin_actions.push(AdminAction {
            id: Uuid::now_v7(),
            admin_id: action.admin_id,
            action: action.action,
            target_user_id: action.target_user_id,
            details: action.details,
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn admin_actions(&self, params: &PaginationParams) -> AppResult<(Vec<AdminAction>, u64)> {
        let state = self.lock()?;
        let mut actions: Vec<&AdminAction> = state.admin_actions.iter().collect();
        actions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let page = actions
            .iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .map(|a| (*a).clone())
            .collect();
        Ok((page, actions.len() as u64))
    }
}
