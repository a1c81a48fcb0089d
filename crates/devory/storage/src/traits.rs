use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devory_types::{
    CollaborationPost, JoinRequest, JoinRequestStatus, NewCollaborationPost, PostId,
    ProfileStats, RateLimitAction, RateLimitPolicy, RequestId, UserId,
};
use std::time::Duration;

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Storage interface for collaboration posts, join requests and profiles.
///
/// Methods on this trait run in their own implicit transaction. Decisions
/// that change slot capacity must go through [`CollaborationStore::begin`].
#[async_trait]
pub trait CollaborationStore: Send + Sync {
    /// Insert a new OPEN post and credit the owner's post counter.
    async fn create_post(
        &self,
        post: NewCollaborationPost,
        created_at: DateTime<Utc>,
    ) -> StorageResult<CollaborationPost>;

    async fn get_post(&self, post_id: &PostId) -> StorageResult<Option<CollaborationPost>>;

    async fn get_request(&self, request_id: &RequestId) -> StorageResult<Option<JoinRequest>>;

    /// Look up the single request a user may hold against a post.
    async fn find_request(
        &self,
        post_id: &PostId,
        requester_id: &UserId,
    ) -> StorageResult<Option<JoinRequest>>;

    /// Insert a request. Fails with `Conflict` when the `(post, requester)`
    /// pair already has one.
    async fn insert_request(&self, request: JoinRequest) -> StorageResult<()>;

    /// List requests for a post newest-first.
    async fn list_requests(
        &self,
        post_id: &PostId,
        window: QueryWindow,
    ) -> StorageResult<Vec<JoinRequest>>;

    /// Single-row compare-and-set of a request status.
    ///
    /// Fails with `InvariantViolation` when the stored status is not
    /// `expected_from`, and `NotFound` when the request does not exist.
    async fn transition_request(
        &self,
        request_id: &RequestId,
        expected_from: JoinRequestStatus,
        to: JoinRequestStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<JoinRequest>;

    async fn get_profile(&self, user_id: &UserId) -> StorageResult<Option<ProfileStats>>;

    /// Credit one received like and recompute the reputation score.
    async fn record_like_received(&self, user_id: &UserId) -> StorageResult<ProfileStats>;

    /// Open a unit of work. Dropping the handle without `commit` discards
    /// every write made through it and releases its locks.
    ///
    /// `lock_timeout` bounds every row-lock wait inside the unit of work;
    /// expiry surfaces as `StorageError::Timeout`.
    async fn begin(&self, lock_timeout: Duration) -> StorageResult<Box<dyn CollaborationTx>>;
}

/// Transaction handle for capacity-changing decisions.
#[async_trait]
pub trait CollaborationTx: Send {
    async fn get_request(&mut self, request_id: &RequestId) -> StorageResult<Option<JoinRequest>>;

    /// Take an exclusive lock on the post row and return its current value.
    ///
    /// The lock is held until the transaction commits or is dropped. Values
    /// returned here reflect every commit that happened before the lock was
    /// granted. Lock waits are bounded and fail with `Timeout`.
    async fn lock_post_for_update(
        &mut self,
        post_id: &PostId,
    ) -> StorageResult<Option<CollaborationPost>>;

    /// Conditional request transition inside the transaction.
    ///
    /// Same contract as [`CollaborationStore::transition_request`]. A
    /// concurrent transition that commits first makes this transaction fail
    /// no later than `commit`.
    async fn transition_request(
        &mut self,
        request_id: &RequestId,
        expected_from: JoinRequestStatus,
        to: JoinRequestStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<JoinRequest>;

    /// Persist slot counters and status. The post must be locked by this
    /// transaction.
    async fn save_post(&mut self, post: &CollaborationPost) -> StorageResult<()>;

    /// Increment `collaborations_accepted` and recompute the score from the
    /// stored counters. Returns the resulting stats.
    async fn increment_collaborations(&mut self, user_id: &UserId) -> StorageResult<ProfileStats>;

    async fn commit(self: Box<Self>) -> StorageResult<()>;

    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

/// Rolling-window submission counter.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count this attempt and report whether it fits inside the policy.
    ///
    /// Rejected attempts are not recorded.
    async fn check_and_increment(
        &self,
        user_id: &UserId,
        action: RateLimitAction,
        policy: RateLimitPolicy,
    ) -> StorageResult<bool>;
}
