//! Postgres-backed store over the shared r2d2 pool.
//!
//! Uniqueness is enforced by indexes (see `migrations/`), cap scopes by
//! transaction-level advisory locks, and trust changes by `SELECT ... FOR UPDATE`.

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Nullable, Timestamptz, Uuid as SqlUuid};
use uuid::Uuid;

use engage_shared::clients::db::{checkout, DbPool};
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
use crate::schema::{
    admin_actions, creator_warnings, earnings, engagements, flagged_content,
    platform_mode_config, posts, users,
};

const LOCK_NS_POST: u64 = 0x01;
const LOCK_NS_PAYEE: u64 = 0x02;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Advisory lock key for one (entity, day) pair. Collisions only over-serialize.
fn lock_key(namespace: u64, id: Uuid, day_start: DateTime<Utc>) -> i64 {
    let mut low = [0u8; 8];
    low.copy_from_slice(&id.as_bytes()[8..16]);
    let day = (day_start.timestamp() / 86_400) as u64;
    (u64::from_le_bytes(low) ^ day.rotate_left(32) ^ (namespace << 56)) as i64
}

fn advisory_xact_lock(conn: &mut PgConnection, key: i64) -> AppResult<()> {
    diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
        .bind::<BigInt, _>(key)
        .execute(conn)?;
    Ok(())
}

/// Lock the user row and apply a bounded trust change. Returns (before, after).
fn adjust_trust(conn: &mut PgConnection, user_id: Uuid, adjustment: TrustAdjustment) -> AppResult<(i32, i32)> {
    let before: i32 = users::table
        .find(user_id)
        .select(users::trust_score)
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::internal(format!("user {user_id} missing from store")))?;

    let after = adjustment.apply(before);
    if after != before {
        diesel::update(users::table.find(user_id))
            .set(users::trust_score.eq(after))
            .execute(conn)?;
    }
    Ok((before, after))
}

/// Insert a warning and charge its penalty, recording the points actually taken.
fn insert_warning(
    conn: &mut PgConnection,
    new: &NewWarning,
    penalty: TrustAdjustment,
) -> AppResult<(CreatorWarning, i32)> {
    let warning = diesel::insert_into(creator_warnings::table)
        .values(new)
        .get_result::<CreatorWarning>(conn)?;
    let (before, after) = adjust_trust(conn, warning.user_id, penalty)?;
    let warning = diesel::update(creator_warnings::table.find(warning.id))
        .set(creator_warnings::trust_penalty.eq(before - after))
        .get_result::<CreatorWarning>(conn)?;
    Ok((warning, after))
}

#[derive(QueryableByName)]
struct SumRow {
    #[diesel(sql_type = BigInt)]
    total: i64,
}

fn sum_earnings(
    conn: &mut PgConnection,
    column: &str,
    id: Uuid,
    scope: &CapScope,
) -> AppResult<i64> {
    // `column` is one of two fixed identifiers, never caller input.
    let sql = format!(
        "SELECT COALESCE(SUM(amount), 0)::BIGINT AS total \
         FROM earnings \
         WHERE {column} = $1 \
         AND created_at >= $2 \
         AND created_at < $3"
    );
    let row = diesel::sql_query(sql)
        .bind::<SqlUuid, _>(id)
        .bind::<Timestamptz, _>(scope.day_start)
        .bind::<Timestamptz, _>(scope.day_end)
        .get_result::<SumRow>(conn)?;
    Ok(row.total)
}

#[derive(QueryableByName)]
struct TotalsRow {
    #[diesel(sql_type = BigInt)]
    total: i64,
    #[diesel(sql_type = BigInt)]
    paid: i64,
    #[diesel(sql_type = BigInt)]
    available: i64,
    #[diesel(sql_type = BigInt)]
    held: i64,
    #[diesel(sql_type = BigInt)]
    today: i64,
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(QueryableByName)]
struct WarningSummaryRow {
    #[diesel(sql_type = BigInt)]
    active: i64,
    #[diesel(sql_type = BigInt)]
    total: i64,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    last_issued_at: Option<DateTime<Utc>>,
}

impl EngineStore for PgStore {
    fn ping(&self) -> AppResult<()> {
        let mut conn = checkout(&self.pool)?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }

    fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let mut conn = checkout(&self.pool)?;
        Ok(users::table
            .find(user_id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn find_post(&self, post_id: Uuid) -> AppResult<Option<Post>> {
        let mut conn = checkout(&self.pool)?;
        Ok(posts::table
            .find(post_id)
            .select(Post::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn find_posts(&self, post_ids: &[Uuid]) -> AppResult<Vec<Post>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }
        let mut conn = checkout(&self.pool)?;
        Ok(posts::table
            .filter(posts::id.eq_any(post_ids))
            .select(Post::as_select())
            .load(&mut conn)?)
    }

    fn update_user_status(
        &self,
        user_id: Uuid,
        allowed_from: &[UserStatus],
        change: StatusChange,
    ) -> AppResult<Option<User>> {
        let mut conn = checkout(&self.pool)?;
        let target = users::table
            .filter(users::id.eq(user_id))
            .filter(users::status.eq_any(allowed_from.to_vec()));

        let updated = match change {
            StatusChange::Probation { until } => diesel::update(target)
                .set((
                    users::status.eq(UserStatus::Probation),
                    users::probation_until.eq(Some(until)),
                ))
                .get_result::<User>(&mut conn)
                .optional()?,
            StatusChange::Suspended { at } => diesel::update(target)
                .set((
                    users::status.eq(UserStatus::Suspended),
                    users::suspended_at.eq(Some(at)),
                ))
                .get_result::<User>(&mut conn)
                .optional()?,
            StatusChange::Active => diesel::update(target)
                .set((
                    users::status.eq(UserStatus::Active),
                    users::probation_until.eq(None::<DateTime<Utc>>),
                    users::suspended_at.eq(None::<DateTime<Utc>>),
                ))
                .get_result::<User>(&mut conn)
                .optional()?,
        };
        Ok(updated)
    }

    fn complete_expired_probations(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let mut conn = checkout(&self.pool)?;
        let ids = diesel::update(
            users::table
                .filter(users::status.eq(UserStatus::Probation))
                .filter(users::probation_until.le(now)),
        )
        .set((
            users::status.eq(UserStatus::Active),
            users::probation_until.eq(None::<DateTime<Utc>>),
        ))
        .returning(users::id)
        .get_results::<Uuid>(&mut conn)?;
        Ok(ids)
    }

    fn find_engagement(
        &self,
        post_id: Uuid,
        actor_id: Uuid,
        kind: EngagementType,
    ) -> AppResult<Option<Engagement>> {
        let mut conn = checkout(&self.pool)?;
        Ok(engagements::table
            .filter(engagements::post_id.eq(post_id))
            .filter(engagements::actor_id.eq(actor_id))
            .filter(engagements::engagement_type.eq(kind))
            .select(Engagement::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn insert_engagement(&self, new: NewEngagement) -> AppResult<InsertOutcome<Engagement>> {
        let mut conn = checkout(&self.pool)?;
        match diesel::insert_into(engagements::table)
            .values(&new)
            .get_result::<Engagement>(&mut conn)
        {
            Ok(engagement) => Ok(InsertOutcome::Inserted(engagement)),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete_engagement(&self, post_id: Uuid, actor_id: Uuid, kind: EngagementType) -> AppResult<bool> {
        let mut conn = checkout(&self.pool)?;
        let deleted = diesel::delete(
            engagements::table
                .filter(engagements::post_id.eq(post_id))
                .filter(engagements::actor_id.eq(actor_id))
                .filter(engagements::engagement_type.eq(kind)),
        )
        .execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn engagements_since(&self, since: DateTime<Utc>) -> AppResult<Vec<Engagement>> {
        let mut conn = checkout(&self.pool)?;
        Ok(engagements::table
            .filter(engagements::created_at.ge(since))
            .order(engagements::created_at.asc())
            .select(Engagement::as_select())
            .load(&mut conn)?)
    }

    fn credit_within_caps(
        &self,
        scope: CapScope,
        decide: &mut CapDecision<'_>,
    ) -> AppResult<Option<Earning>> {
        let mut pooled = checkout(&self.pool)?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<_, AppError, _>(|conn| {
            // Post key before payee key in every transaction keeps lock order acyclic.
            advisory_xact_lock(conn, lock_key(LOCK_NS_POST, scope.post_id, scope.day_start))?;
            advisory_xact_lock(conn, lock_key(LOCK_NS_PAYEE, scope.payee_id, scope.day_start))?;

            // Status changes lock the same row, so the hold decision sees committed state.
            let payee = users::table
                .find(scope.payee_id)
                .select(User::as_select())
                .for_update()
                .first(conn)
                .optional()?
                .ok_or_else(|| AppError::internal(format!("user {} missing from store", scope.payee_id)))?;
            let open_flags: i64 = flagged_content::table
                .filter(flagged_content::content_id.eq(scope.post_id))
                .filter(flagged_content::resolved.eq(false))
                .count()
                .get_result(conn)?;
            let usage = CapUsage {
                post_today: sum_earnings(conn, "post_id", scope.post_id, &scope)?,
                payee_today: sum_earnings(conn, "user_id", scope.payee_id, &scope)?,
            };
            let state = CapState {
                usage,
                payee,
                post_flagged: open_flags > 0,
            };

            let Some(new) = decide(&state) else {
                return Ok(None);
            };
            let earning = diesel::insert_into(earnings::table)
                .values(&new)
                .get_result::<Earning>(conn)?;
            Ok(Some(earning))
        })
    }

    fn held_earnings_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Earning>> {
        let mut conn = checkout(&self.pool)?;
        Ok(earnings::table
            .filter(earnings::is_paid.eq(false))
            .filter(earnings::held_until.le(now))
            .order((earnings::held_until.asc(), earnings::created_at.asc()))
            .select(Earning::as_select())
            .load(&mut conn)?)
    }

    fn transition_hold(&self, earning_id: Uuid, expected: DateTime<Utc>, next: &HoldState) -> AppResult<bool> {
        let mut conn = checkout(&self.pool)?;
        let updated = diesel::update(
            earnings::table
                .filter(earnings::id.eq(earning_id))
                .filter(earnings::is_paid.eq(false))
                .filter(earnings::held_until.eq(expected)),
        )
        .set((
            earnings::held_until.eq(next.held_until()),
            earnings::hold_reason.eq(next.reason()),
        ))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn requeue_status_holds(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<u64> {
        let mut conn = checkout(&self.pool)?;
        let moved = diesel::update(
            earnings::table
                .filter(earnings::user_id.eq(user_id))
                .filter(earnings::is_paid.eq(false))
                .filter(earnings::held_until.gt(now))
                .filter(earnings::hold_reason.eq_any([HOLD_SUSPENDED, HOLD_PROBATION])),
        )
        .set(earnings::held_until.eq(Some(now)))
        .execute(&mut conn)?;
        Ok(moved as u64)
    }

    fn earnings_totals(&self, user_id: Uuid, day_start: DateTime<Utc>) -> AppResult<EarningsTotals> {
        let mut conn = checkout(&self.pool)?;
        let row = diesel::sql_query(
            "SELECT \
               COALESCE(SUM(amount), 0)::BIGINT AS total, \
               COALESCE(SUM(amount) FILTER (WHERE is_paid), 0)::BIGINT AS paid, \
               COALESCE(SUM(amount) FILTER (WHERE NOT is_paid AND held_until IS NULL), 0)::BIGINT AS available, \
               COALESCE(SUM(amount) FILTER (WHERE NOT is_paid AND held_until IS NOT NULL), 0)::BIGINT AS held, \
               COALESCE(SUM(amount) FILTER (WHERE created_at >= $2), 0)::BIGINT AS today, \
               COUNT(*) AS count \
             FROM earnings \
             WHERE user_id = $1"
        )
        .bind::<SqlUuid, _>(user_id)
        .bind::<Timestamptz, _>(day_start)
        .get_result::<TotalsRow>(&mut conn)?;

        Ok(EarningsTotals {
            total: row.total,
            paid: row.paid,
            available: row.available,
            held: row.held,
            today: row.today,
            count: row.count,
        })
    }

    fn has_unresolved_flag(&self, content_id: Uuid) -> AppResult<bool> {
        let mut conn = checkout(&self.pool)?;
        let count: i64 = flagged_content::table
            .filter(flagged_content::content_id.eq(content_id))
            .filter(flagged_content::resolved.eq(false))
            .count()
            .get_result(&mut conn)?;
        Ok(count > 0)
    }

    fn find_unresolved_flag(&self, content_id: Uuid) -> AppResult<Option<FlaggedContent>> {
        let mut conn = checkout(&self.pool)?;
        Ok(flagged_content::table
            .filter(flagged_content::content_id.eq(content_id))
            .filter(flagged_content::resolved.eq(false))
            .select(FlaggedContent::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn raise_flag(&self, new: NewFlag, penalty: TrustAdjustment) -> AppResult<Option<FlaggedContent>> {
        let mut pooled = checkout(&self.pool)?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<_, AppError, _>(|conn| {
            // The partial unique index on unresolved flags turns a second insert into a no-op.
            let inserted = diesel::insert_into(flagged_content::table)
                .values(&new)
                .on_conflict_do_nothing()
                .get_result::<FlaggedContent>(conn)
                .optional()?;
            let Some(flag) = inserted else {
                return Ok(None);
            };

            let (before, after) = adjust_trust(conn, flag.owner_id, penalty)?;
            let flag = diesel::update(flagged_content::table.find(flag.id))
                .set((
                    flagged_content::trust_before.eq(before),
                    flagged_content::trust_penalty.eq(before - after),
                ))
                .get_result::<FlaggedContent>(conn)?;
            Ok(Some(flag))
        })
    }

    fn resolve_flag(&self, flag_id: Uuid, resolution: FlagResolution) -> AppResult<Option<ResolvedFlag>> {
        let mut pooled = checkout(&self.pool)?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<_, AppError, _>(|conn| {
            let resolved = diesel::update(
                flagged_content::table
                    .filter(flagged_content::id.eq(flag_id))
                    .filter(flagged_content::resolved.eq(false)),
            )
            .set((
                flagged_content::status.eq(resolution.status),
                flagged_content::resolved.eq(true),
                flagged_content::reviewed_by.eq(Some(resolution.reviewed_by)),
                flagged_content::notes.eq(resolution.notes.as_deref()),
                flagged_content::reviewed_at.eq(Some(resolution.reviewed_at)),
            ))
            .get_result::<FlaggedContent>(conn)
            .optional()?;

            let Some(flag) = resolved else {
                return Ok(None);
            };
            let (_, mut trust_score) = adjust_trust(conn, flag.owner_id, resolution.trust)?;
            let warning = match &resolution.warning {
                Some((new, penalty)) => {
                    let (warning, score) = insert_warning(conn, new, *penalty)?;
                    trust_score = score;
                    Some(warning)
                }
                None => None,
            };
            Ok(Some(ResolvedFlag { flag, trust_score, warning }))
        })
    }

    fn pending_flags(&self) -> AppResult<Vec<FlaggedContent>> {
        let mut conn = checkout(&self.pool)?;
        Ok(flagged_content::table
            .filter(flagged_content::status.eq(FlagStatus::Pending))
            .order(flagged_content::created_at.asc())
            .select(FlaggedContent::as_select())
            .load(&mut conn)?)
    }

    fn issue_warning(&self, new: NewWarning, penalty: TrustAdjustment) -> AppResult<(CreatorWarning, i32)> {
        let mut pooled = checkout(&self.pool)?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<_, AppError, _>(|conn| insert_warning(conn, &new, penalty))
    }

    fn count_active_warnings_since(&self, user_id: Uuid, since: DateTime<Utc>) -> AppResult<i64> {
        let mut conn = checkout(&self.pool)?;
        Ok(creator_warnings::table
            .filter(creator_warnings::user_id.eq(user_id))
            .filter(creator_warnings::cleared_at.is_null())
            .filter(creator_warnings::created_at.ge(since))
            .count()
            .get_result(&mut conn)?)
    }

    fn clear_warning(&self, warning_id: Uuid, cleared_by: Uuid, at: DateTime<Utc>) -> AppResult<ClearOutcome> {
        let mut pooled = checkout(&self.pool)?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<_, AppError, _>(|conn| {
            let existing = creator_warnings::table
                .find(warning_id)
                .select(CreatorWarning::as_select())
                .for_update()
                .first(conn)
                .optional()?;
            let Some(existing) = existing else {
                return Ok(ClearOutcome::NotFound);
            };
            if !existing.is_active() {
                return Ok(ClearOutcome::AlreadyCleared);
            }

            let warning = diesel::update(creator_warnings::table.find(warning_id))
                .set((
                    creator_warnings::cleared_at.eq(Some(at)),
                    creator_warnings::cleared_by.eq(Some(cleared_by)),
                ))
                .get_result::<CreatorWarning>(conn)?;
            adjust_trust(conn, warning.user_id, TrustAdjustment::restore(warning.trust_penalty, None))?;
            Ok(ClearOutcome::Cleared(warning))
        })
    }

    fn warning_summary(&self, user_id: Uuid) -> AppResult<WarningSummary> {
        let mut conn = checkout(&self.pool)?;
        let row = diesel::sql_query(
            "SELECT \
               COUNT(*) FILTER (WHERE cleared_at IS NULL) AS active, \
               COUNT(*) AS total, \
               MAX(created_at) AS last_issued_at \
             FROM creator_warnings \
             WHERE user_id = $1"
        )
        .bind::<SqlUuid, _>(user_id)
        .get_result::<WarningSummaryRow>(&mut conn)?;

        Ok(WarningSummary {
            active: row.active,
            total: row.total,
            last_issued_at: row.last_issued_at,
        })
    }

    fn active_mode_config(&self) -> AppResult<Option<PlatformModeConfig>> {
        let mut conn = checkout(&self.pool)?;
        Ok(platform_mode_config::table
            .filter(platform_mode_config::is_active.eq(true))
            .select(PlatformModeConfig::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn record_admin_action(&self, action: NewAdminAction) -> AppResult<()> {
        let mut conn = checkout(&self.pool)?;
        diesel::insert_into(admin_actions::table)
            .values(&action)
            .execute(&mut conn)
            .map_err(|e| AppError::internal(format!("failed to log admin action: {e}")))?;
        Ok(())
    }

    fn admin_actions(&self, params: &PaginationParams) -> AppResult<(Vec<AdminAction>, u64)> {
        let mut conn = checkout(&self.pool)?;

        let items = admin_actions::table
            .order(admin_actions::created_at.desc())
            .offset(params.offset() as i64)
            .limit(params.limit() as i64)
            .select(AdminAction::as_select())
            .load(&mut conn)?;

        let total: i64 = admin_actions::table.count().get_result(&mut conn)?;

        Ok((items, total as u64))
    }
}
