//! PostgreSQL adapter for Devory storage.
//!
//! This adapter is the transactional source-of-truth backend. Post row locks
//! are `SELECT ... FOR UPDATE` inside an explicit transaction with a bounded
//! `lock_timeout`; the `(post_id, requester_id)` uniqueness rule is a table
//! constraint.

use crate::traits::{CollaborationStore, CollaborationTx, QueryWindow, RateLimitStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devory_types::{
    CollaborationPost, JoinRequest, JoinRequestStatus, NewCollaborationPost, PostId, PostKind,
    PostStatus, ProfileStats, RateLimitAction, RateLimitPolicy, RequestId, UserId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;

const POST_COLUMNS: &str = "id, owner_id, kind, title, status, required_slots, filled_slots, created_at, updated_at";
const REQUEST_COLUMNS: &str =
    "id, post_id, requester_id, status, message, created_at, updated_at";
const PROFILE_COLUMNS: &str =
    "user_id, total_posts, total_likes_received, collaborations_accepted, reputation_score";

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresCollaborationStore {
    pool: PgPool,
}

impl PostgresCollaborationStore {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS devory_collaboration_posts (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                status TEXT NOT NULL,
                required_slots INTEGER CHECK (required_slots IS NULL OR required_slots > 0),
                filled_slots INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                CHECK (required_slots IS NULL OR filled_slots <= required_slots)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS devory_join_requests (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL REFERENCES devory_collaboration_posts(id),
                requester_id TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                UNIQUE (post_id, requester_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS devory_profile_stats (
                user_id TEXT PRIMARY KEY,
                total_posts BIGINT NOT NULL DEFAULT 0,
                total_likes_received BIGINT NOT NULL DEFAULT 0,
                collaborations_accepted BIGINT NOT NULL DEFAULT 0,
                reputation_score BIGINT NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS devory_rate_limit_events (
                user_id TEXT NOT NULL,
                action TEXT NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS devory_rate_limit_events_lookup
                ON devory_rate_limit_events (user_id, action, occurred_at)
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        tracing::debug!("devory schema ready");
        Ok(())
    }
}

#[async_trait]
impl CollaborationStore for PostgresCollaborationStore {
    async fn create_post(
        &self,
        post: NewCollaborationPost,
        created_at: DateTime<Utc>,
    ) -> StorageResult<CollaborationPost> {
        if post.required_slots == Some(0) {
            return Err(StorageError::InvalidInput(
                "required_slots must be positive".to_string(),
            ));
        }
        let record = post.into_post(PostId::generate(), created_at);

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        sqlx::query(
            r#"
            INSERT INTO devory_collaboration_posts
                (id, owner_id, kind, title, status, required_slots, filled_slots, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.owner_id.as_str())
        .bind(post_kind_to_str(record.kind))
        .bind(&record.title)
        .bind(post_status_to_str(record.status))
        .bind(record.required_slots.map(to_i32).transpose()?)
        .bind(to_i32(record.filled_slots)?)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO devory_profile_stats (user_id, total_posts, reputation_score)
            VALUES ($1, 1, 5)
            ON CONFLICT (user_id) DO UPDATE
               SET total_posts = devory_profile_stats.total_posts + 1,
                   reputation_score = (devory_profile_stats.total_posts + 1) * 5
                                    + devory_profile_stats.total_likes_received * 2
                                    + devory_profile_stats.collaborations_accepted * 10
            "#,
        )
        .bind(record.owner_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(record)
    }

    async fn get_post(&self, post_id: &PostId) -> StorageResult<Option<CollaborationPost>> {
        let row = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM devory_collaboration_posts WHERE id = $1"
        ))
        .bind(post_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(post_row_to_record).transpose()
    }

    async fn get_request(&self, request_id: &RequestId) -> StorageResult<Option<JoinRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM devory_join_requests WHERE id = $1"
        ))
        .bind(request_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(request_row_to_record).transpose()
    }

    async fn find_request(
        &self,
        post_id: &PostId,
        requester_id: &UserId,
    ) -> StorageResult<Option<JoinRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM devory_join_requests WHERE post_id = $1 AND requester_id = $2"
        ))
        .bind(post_id.as_str())
        .bind(requester_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(request_row_to_record).transpose()
    }

    async fn insert_request(&self, request: JoinRequest) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO devory_join_requests
                (id, post_id, requester_id, status, message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(request.id.as_str())
        .bind(request.post_id.as_str())
        .bind(request.requester_id.as_str())
        .bind(request.status.as_str())
        .bind(request.message.as_deref())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_requests(
        &self,
        post_id: &PostId,
        window: QueryWindow,
    ) -> StorageResult<Vec<JoinRequest>> {
        // LIMIT NULL means no limit in PostgreSQL.
        let limit = if window.limit == 0 {
            None
        } else {
            Some(to_i64(window.limit)?)
        };
        let rows = sqlx::query(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
              FROM devory_join_requests
             WHERE post_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(post_id.as_str())
        .bind(limit)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(request_row_to_record).collect()
    }

    async fn transition_request(
        &self,
        request_id: &RequestId,
        expected_from: JoinRequestStatus,
        to: JoinRequestStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<JoinRequest> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        conditional_transition(&mut *conn, request_id, expected_from, to, updated_at).await
    }

    async fn get_profile(&self, user_id: &UserId) -> StorageResult<Option<ProfileStats>> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM devory_profile_stats WHERE user_id = $1"
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(profile_row_to_record).transpose()
    }

    async fn record_like_received(&self, user_id: &UserId) -> StorageResult<ProfileStats> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO devory_profile_stats (user_id, total_likes_received, reputation_score)
            VALUES ($1, 1, 2)
            ON CONFLICT (user_id) DO UPDATE
               SET total_likes_received = devory_profile_stats.total_likes_received + 1,
                   reputation_score = devory_profile_stats.total_posts * 5
                                    + (devory_profile_stats.total_likes_received + 1) * 2
                                    + devory_profile_stats.collaborations_accepted * 10
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        profile_row_to_record(row)
    }

    async fn begin(&self, lock_timeout: Duration) -> StorageResult<Box<dyn CollaborationTx>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        // SET does not take bind parameters; the value is an integer we own.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = {}",
            lock_timeout.as_millis().max(1)
        ))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Box::new(PostgresCollaborationTx { tx }))
    }
}

/// Unit of work over one PostgreSQL transaction.
///
/// Dropping the handle without `commit` rolls the transaction back.
pub struct PostgresCollaborationTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CollaborationTx for PostgresCollaborationTx {
    async fn get_request(&mut self, request_id: &RequestId) -> StorageResult<Option<JoinRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM devory_join_requests WHERE id = $1"
        ))
        .bind(request_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(request_row_to_record).transpose()
    }

    async fn lock_post_for_update(
        &mut self,
        post_id: &PostId,
    ) -> StorageResult<Option<CollaborationPost>> {
        let row = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM devory_collaboration_posts WHERE id = $1 FOR UPDATE"
        ))
        .bind(post_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(post_row_to_record).transpose()
    }

    async fn transition_request(
        &mut self,
        request_id: &RequestId,
        expected_from: JoinRequestStatus,
        to: JoinRequestStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<JoinRequest> {
        conditional_transition(&mut *self.tx, request_id, expected_from, to, updated_at).await
    }

    async fn save_post(&mut self, post: &CollaborationPost) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE devory_collaboration_posts
               SET status = $1,
                   filled_slots = $2,
                   updated_at = $3
             WHERE id = $4
            "#,
        )
        .bind(post_status_to_str(post.status))
        .bind(to_i32(post.filled_slots)?)
        .bind(post.updated_at)
        .bind(post.id.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("post {} not found", post.id)));
        }
        Ok(())
    }

    async fn increment_collaborations(&mut self, user_id: &UserId) -> StorageResult<ProfileStats> {
        // Right-hand sides read the pre-update row, so the score is computed
        // from the incremented counter exactly once.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO devory_profile_stats (user_id, collaborations_accepted, reputation_score)
            VALUES ($1, 1, 10)
            ON CONFLICT (user_id) DO UPDATE
               SET collaborations_accepted = devory_profile_stats.collaborations_accepted + 1,
                   reputation_score = devory_profile_stats.total_posts * 5
                                    + devory_profile_stats.total_likes_received * 2
                                    + (devory_profile_stats.collaborations_accepted + 1) * 10
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        profile_row_to_record(row)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

async fn conditional_transition(
    conn: &mut sqlx::PgConnection,
    request_id: &RequestId,
    expected_from: JoinRequestStatus,
    to: JoinRequestStatus,
    updated_at: DateTime<Utc>,
) -> StorageResult<JoinRequest> {
    if !expected_from.can_transition_to(to) {
        return Err(StorageError::InvalidInput(format!(
            "transition {:?} -> {:?} is not allowed",
            expected_from, to
        )));
    }

    let row = sqlx::query(&format!(
        r#"
        UPDATE devory_join_requests
           SET status = $1,
               updated_at = $2
         WHERE id = $3
           AND status = $4
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(to.as_str())
    .bind(updated_at)
    .bind(request_id.as_str())
    .bind(expected_from.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;

    if let Some(row) = row {
        return request_row_to_record(row);
    }

    let exists = sqlx::query("SELECT status FROM devory_join_requests WHERE id = $1")
        .bind(request_id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
    match exists {
        Some(row) => {
            let found: String = row.try_get("status").map_err(map_sqlx_error)?;
            Err(StorageError::InvariantViolation(format!(
                "invalid request transition: expected {:?}, found {found}",
                expected_from
            )))
        }
        None => Err(StorageError::NotFound(format!(
            "request {request_id} not found"
        ))),
    }
}

/// Rolling-window counter stored as one row per admitted attempt.
#[derive(Clone)]
pub struct PostgresRateLimiter {
    pool: PgPool,
}

impl PostgresRateLimiter {
    /// Share the pool (and schema) of an existing store.
    pub fn from_store(store: &PostgresCollaborationStore) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }
}

#[async_trait]
impl RateLimitStore for PostgresRateLimiter {
    async fn check_and_increment(
        &self,
        user_id: &UserId,
        action: RateLimitAction,
        policy: RateLimitPolicy,
    ) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Serialize attempts per (user, action) so count-then-insert is atomic.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2))")
            .bind(user_id.as_str())
            .bind(action.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let now = Utc::now();
        let cutoff = now - policy.window;
        let used: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS used
              FROM devory_rate_limit_events
             WHERE user_id = $1
               AND action = $2
               AND occurred_at > $3
            "#,
        )
        .bind(user_id.as_str())
        .bind(action.as_str())
        .bind(cutoff)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .try_get("used")
        .map_err(map_sqlx_error)?;

        if used >= i64::from(policy.limit) {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO devory_rate_limit_events (user_id, action, occurred_at) VALUES ($1, $2, $3)",
        )
        .bind(user_id.as_str())
        .bind(action.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM devory_rate_limit_events WHERE user_id = $1 AND action = $2 AND occurred_at <= $3")
            .bind(user_id.as_str())
            .bind(action.as_str())
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(true)
    }
}

fn post_row_to_record(row: PgRow) -> StorageResult<CollaborationPost> {
    let kind: String = row.try_get("kind").map_err(map_sqlx_error)?;
    let status: String = row.try_get("status").map_err(map_sqlx_error)?;
    let required_slots: Option<i32> = row.try_get("required_slots").map_err(map_sqlx_error)?;
    let filled_slots: i32 = row.try_get("filled_slots").map_err(map_sqlx_error)?;

    Ok(CollaborationPost {
        id: PostId::new(row.try_get::<String, _>("id").map_err(map_sqlx_error)?),
        owner_id: UserId::new(row.try_get::<String, _>("owner_id").map_err(map_sqlx_error)?),
        kind: parse_post_kind(&kind)?,
        title: row.try_get("title").map_err(map_sqlx_error)?,
        status: parse_post_status(&status)?,
        required_slots: required_slots.map(from_i32).transpose()?,
        filled_slots: from_i32(filled_slots)?,
        created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx_error)?,
    })
}

fn request_row_to_record(row: PgRow) -> StorageResult<JoinRequest> {
    let status: String = row.try_get("status").map_err(map_sqlx_error)?;
    Ok(JoinRequest {
        id: RequestId::new(row.try_get::<String, _>("id").map_err(map_sqlx_error)?),
        post_id: PostId::new(row.try_get::<String, _>("post_id").map_err(map_sqlx_error)?),
        requester_id: UserId::new(
            row.try_get::<String, _>("requester_id")
                .map_err(map_sqlx_error)?,
        ),
        status: JoinRequestStatus::parse(&status).ok_or_else(|| {
            StorageError::Serialization(format!("unknown request status `{status}`"))
        })?,
        message: row.try_get("message").map_err(map_sqlx_error)?,
        created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx_error)?,
    })
}

fn profile_row_to_record(row: PgRow) -> StorageResult<ProfileStats> {
    let counter = |column: &str| -> StorageResult<u64> {
        let value: i64 = row.try_get(column).map_err(map_sqlx_error)?;
        u64::try_from(value)
            .map_err(|_| StorageError::Serialization(format!("negative {column}: {value}")))
    };
    Ok(ProfileStats {
        user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(map_sqlx_error)?),
        total_posts: counter("total_posts")?,
        total_likes_received: counter("total_likes_received")?,
        collaborations_accepted: counter("collaborations_accepted")?,
        reputation_score: counter("reputation_score")?,
    })
}

fn post_kind_to_str(kind: PostKind) -> &'static str {
    match kind {
        PostKind::Idea => "idea",
        PostKind::Collaboration => "collaboration",
    }
}

fn parse_post_kind(raw: &str) -> StorageResult<PostKind> {
    match raw {
        "idea" => Ok(PostKind::Idea),
        "collaboration" => Ok(PostKind::Collaboration),
        _ => Err(StorageError::Serialization(format!(
            "unknown post kind `{raw}`"
        ))),
    }
}

fn post_status_to_str(status: PostStatus) -> &'static str {
    match status {
        PostStatus::Open => "open",
        PostStatus::Closed => "closed",
    }
}

fn parse_post_status(raw: &str) -> StorageResult<PostStatus> {
    match raw {
        "open" => Ok(PostStatus::Open),
        "closed" => Ok(PostStatus::Closed),
        _ => Err(StorageError::Serialization(format!(
            "unknown post status `{raw}`"
        ))),
    }
}

/// Map driver errors onto the storage taxonomy by SQLSTATE.
fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(mapped) = map_sqlstate(db_err.code().as_deref(), db_err.message()) {
            return mapped;
        }
    }
    if matches!(err, sqlx::Error::PoolTimedOut) {
        return StorageError::Timeout(err.to_string());
    }
    StorageError::Backend(err.to_string())
}

/// SQLSTATE classes with a dedicated storage error; anything else is `Backend`.
fn map_sqlstate(code: Option<&str>, message: &str) -> Option<StorageError> {
    let message = message.to_string();
    match code? {
        // unique_violation
        "23505" => Some(StorageError::Conflict(message)),
        // foreign_key_violation
        "23503" => Some(StorageError::NotFound(message)),
        // serialization_failure, deadlock_detected
        "40001" | "40P01" => Some(StorageError::Conflict(message)),
        // lock_not_available
        "55P03" => {
            tracing::warn!(error = %message, "post row lock wait timed out");
            Some(StorageError::Timeout(message))
        }
        _ => None,
    }
}

fn to_i32(value: u32) -> StorageResult<i32> {
    i32::try_from(value).map_err(|_| StorageError::InvalidInput("slot count too large".to_string()))
}

fn from_i32(value: i32) -> StorageResult<u32> {
    u32::try_from(value)
        .map_err(|_| StorageError::Serialization(format!("negative slot count: {value}")))
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Opt-in: set `DEVORY_TEST_DATABASE_URL` to run against a live server.
    async fn live_store() -> Option<PostgresCollaborationStore> {
        let url = std::env::var("DEVORY_TEST_DATABASE_URL").ok()?;
        Some(
            PostgresCollaborationStore::connect(&url)
                .await
                .expect("connect test database"),
        )
    }

    #[tokio::test]
    async fn lock_then_fill_closes_post() {
        let Some(store) = live_store().await else {
            return;
        };
        let owner = UserId::new(format!("owner-{}", uuid_suffix()));
        let post = store
            .create_post(
                NewCollaborationPost::collaboration(owner.clone(), "solar car", Some(1)),
                Utc::now(),
            )
            .await
            .unwrap();

        let mut tx = store.begin(Duration::from_secs(5)).await.unwrap();
        let mut locked = tx.lock_post_for_update(&post.id).await.unwrap().unwrap();
        locked.fill_slot(Utc::now());
        tx.save_post(&locked).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.filled_slots, 1);
        assert_eq!(stored.status, PostStatus::Closed);
        let profile = store.get_profile(&owner).await.unwrap().unwrap();
        assert_eq!(profile.total_posts, 1);
        assert_eq!(profile.reputation_score, 5);
    }

    #[tokio::test]
    async fn duplicate_request_maps_to_conflict() {
        let Some(store) = live_store().await else {
            return;
        };
        let post = store
            .create_post(
                NewCollaborationPost::collaboration(UserId::new("owner"), "drone", Some(3)),
                Utc::now(),
            )
            .await
            .unwrap();
        let requester = UserId::new(format!("bob-{}", uuid_suffix()));
        store
            .insert_request(JoinRequest::pending(
                post.id.clone(),
                requester.clone(),
                None,
                Utc::now(),
            ))
            .await
            .unwrap();
        let again = store
            .insert_request(JoinRequest::pending(post.id, requester, None, Utc::now()))
            .await;
        assert!(matches!(again, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn second_locker_hits_lock_timeout() {
        let Some(store) = live_store().await else {
            return;
        };
        let post = store
            .create_post(
                NewCollaborationPost::collaboration(UserId::new("owner"), "rover", Some(2)),
                Utc::now(),
            )
            .await
            .unwrap();

        let mut holder = store.begin(Duration::from_secs(5)).await.unwrap();
        assert!(holder.lock_post_for_update(&post.id).await.unwrap().is_some());

        let mut waiter = store.begin(Duration::from_millis(100)).await.unwrap();
        let started = std::time::Instant::now();
        let blocked = waiter.lock_post_for_update(&post.id).await;
        assert!(matches!(blocked, Err(StorageError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
        waiter.rollback().await.unwrap();

        holder.rollback().await.unwrap();
        let mut retry = store.begin(Duration::from_millis(100)).await.unwrap();
        assert!(retry.lock_post_for_update(&post.id).await.unwrap().is_some());
        retry.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn rate_limiter_refuses_eleventh_attempt() {
        let Some(store) = live_store().await else {
            return;
        };
        let limiter = PostgresRateLimiter::from_store(&store);
        let user = UserId::new(format!("eager-{}", uuid_suffix()));
        let policy = RateLimitPolicy::join_requests();

        for attempt in 1..=10 {
            let admitted = limiter
                .check_and_increment(&user, RateLimitAction::JoinRequest, policy)
                .await
                .unwrap();
            assert!(admitted, "attempt {attempt} should be admitted");
        }
        let eleventh = limiter
            .check_and_increment(&user, RateLimitAction::JoinRequest, policy)
            .await
            .unwrap();
        assert!(!eleventh);

        // Quota is per user.
        let other = UserId::new(format!("calm-{}", uuid_suffix()));
        assert!(limiter
            .check_and_increment(&other, RateLimitAction::JoinRequest, policy)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn conditional_transition_rejects_stale_status() {
        let Some(store) = live_store().await else {
            return;
        };
        let post = store
            .create_post(
                NewCollaborationPost::collaboration(UserId::new("owner"), "kiosk", Some(2)),
                Utc::now(),
            )
            .await
            .unwrap();
        let request = JoinRequest::pending(
            post.id,
            UserId::new(format!("bob-{}", uuid_suffix())),
            None,
            Utc::now(),
        );
        let request_id = request.id.clone();
        store.insert_request(request).await.unwrap();

        let rejected = store
            .transition_request(
                &request_id,
                JoinRequestStatus::Pending,
                JoinRequestStatus::Rejected,
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, JoinRequestStatus::Rejected);

        let stale = store
            .transition_request(
                &request_id,
                JoinRequestStatus::Pending,
                JoinRequestStatus::Accepted,
                Utc::now(),
            )
            .await;
        assert!(matches!(stale, Err(StorageError::InvariantViolation(_))));

        let missing = store
            .transition_request(
                &RequestId::generate(),
                JoinRequestStatus::Pending,
                JoinRequestStatus::Accepted,
                Utc::now(),
            )
            .await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn increment_collaborations_upserts_and_scores() {
        let Some(store) = live_store().await else {
            return;
        };
        let owner = UserId::new(format!("maker-{}", uuid_suffix()));
        store.record_like_received(&owner).await.unwrap();

        let mut tx = store.begin(Duration::from_secs(5)).await.unwrap();
        tx.increment_collaborations(&owner).await.unwrap();
        let staged = tx.increment_collaborations(&owner).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(staged.collaborations_accepted, 2);
        assert_eq!(staged.reputation_score, 2 + 2 * 10);
        let stored = store.get_profile(&owner).await.unwrap().unwrap();
        assert_eq!(stored.collaborations_accepted, 2);
        assert_eq!(stored.total_likes_received, 1);
        assert_eq!(stored.reputation_score, 22);

        // First acceptance for a user with no row inserts one.
        let fresh = UserId::new(format!("new-{}", uuid_suffix()));
        let mut tx = store.begin(Duration::from_secs(5)).await.unwrap();
        let created = tx.increment_collaborations(&fresh).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(created.collaborations_accepted, 1);
        assert_eq!(created.reputation_score, 10);
    }

    #[test]
    fn sqlstates_map_to_storage_errors() {
        assert!(matches!(
            map_sqlstate(Some("23505"), "dup"),
            Some(StorageError::Conflict(_))
        ));
        assert!(matches!(
            map_sqlstate(Some("23503"), "fk"),
            Some(StorageError::NotFound(_))
        ));
        for code in ["40001", "40P01"] {
            assert!(matches!(
                map_sqlstate(Some(code), "retry"),
                Some(StorageError::Conflict(_))
            ));
        }
        match map_sqlstate(Some("55P03"), "canceling statement due to lock timeout") {
            Some(StorageError::Timeout(message)) => assert!(message.contains("lock timeout")),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(map_sqlstate(Some("42P01"), "undefined table").is_none());
        assert!(map_sqlstate(None, "no code").is_none());
    }

    #[test]
    fn pool_timeout_is_a_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StorageError::Timeout(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StorageError::Backend(_)
        ));
    }

    fn uuid_suffix() -> String {
        PostId::generate().0.trim_start_matches("post-").to_string()
    }

    #[test]
    fn enum_storage_names_round_trip() {
        for kind in [PostKind::Idea, PostKind::Collaboration] {
            assert_eq!(parse_post_kind(post_kind_to_str(kind)).unwrap(), kind);
        }
        for status in [PostStatus::Open, PostStatus::Closed] {
            assert_eq!(parse_post_status(post_status_to_str(status)).unwrap(), status);
        }
        assert!(parse_post_status("archived").is_err());
    }
}
