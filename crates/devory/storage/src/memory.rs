//! In-memory reference implementation for Devory storage traits.
//!
//! Deterministic and test-friendly. Row locks are per-post async mutexes held
//! by the transaction handle; transaction writes are staged in the handle and
//! applied under a single state write lock on commit.

use crate::traits::{CollaborationStore, CollaborationTx, QueryWindow, RateLimitStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devory_types::{
    CollaborationPost, JoinRequest, JoinRequestStatus, NewCollaborationPost, PostId,
    ProfileStats, RateLimitAction, RateLimitPolicy, RequestId, UserId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
struct MemoryState {
    posts: HashMap<PostId, CollaborationPost>,
    requests: HashMap<RequestId, JoinRequest>,
    request_pairs: HashMap<(PostId, UserId), RequestId>,
    profiles: HashMap<UserId, ProfileStats>,
}

type PostLocks = Mutex<HashMap<PostId, Arc<AsyncMutex<()>>>>;

/// In-memory collaboration store.
pub struct InMemoryCollaborationStore {
    state: Arc<RwLock<MemoryState>>,
    post_locks: Arc<PostLocks>,
}

impl Default for InMemoryCollaborationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCollaborationStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            post_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn poisoned(what: &str) -> StorageError {
    StorageError::Backend(format!("{what} lock poisoned"))
}

#[async_trait]
impl CollaborationStore for InMemoryCollaborationStore {
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

        let mut state = self.state.write().map_err(|_| poisoned("state"))?;
        let record = post.into_post(PostId::generate(), created_at);
        let owner = record.owner_id.clone();
        state
            .profiles
            .entry(owner.clone())
            .or_insert_with(|| ProfileStats::empty(owner))
            .record_post();
        state.posts.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_post(&self, post_id: &PostId) -> StorageResult<Option<CollaborationPost>> {
        let state = self.state.read().map_err(|_| poisoned("state"))?;
        Ok(state.posts.get(post_id).cloned())
    }

    async fn get_request(&self, request_id: &RequestId) -> StorageResult<Option<JoinRequest>> {
        let state = self.state.read().map_err(|_| poisoned("state"))?;
        Ok(state.requests.get(request_id).cloned())
    }

    async fn find_request(
        &self,
        post_id: &PostId,
        requester_id: &UserId,
    ) -> StorageResult<Option<JoinRequest>> {
        let state = self.state.read().map_err(|_| poisoned("state"))?;
        Ok(state
            .request_pairs
            .get(&(post_id.clone(), requester_id.clone()))
            .and_then(|id| state.requests.get(id))
            .cloned())
    }

    async fn insert_request(&self, request: JoinRequest) -> StorageResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned("state"))?;

        if !state.posts.contains_key(&request.post_id) {
            return Err(StorageError::NotFound(format!(
                "post {} not found",
                request.post_id
            )));
        }
        let pair = (request.post_id.clone(), request.requester_id.clone());
        if state.request_pairs.contains_key(&pair) {
            return Err(StorageError::Conflict(format!(
                "user {} already has a request for post {}",
                request.requester_id, request.post_id
            )));
        }
        if state.requests.contains_key(&request.id) {
            return Err(StorageError::Conflict(format!(
                "request {} already exists",
                request.id
            )));
        }

        state.request_pairs.insert(pair, request.id.clone());
        state.requests.insert(request.id.clone(), request);
        Ok(())
    }

    async fn list_requests(
        &self,
        post_id: &PostId,
        window: QueryWindow,
    ) -> StorageResult<Vec<JoinRequest>> {
        let state = self.state.read().map_err(|_| poisoned("state"))?;
        let mut values = state
            .requests
            .values()
            .filter(|request| &request.post_id == post_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apply_window(values, window))
    }

    async fn transition_request(
        &self,
        request_id: &RequestId,
        expected_from: JoinRequestStatus,
        to: JoinRequestStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<JoinRequest> {
        check_transition(expected_from, to)?;
        let mut state = self.state.write().map_err(|_| poisoned("state"))?;
        let record = state
            .requests
            .get_mut(request_id)
            .ok_or_else(|| StorageError::NotFound(format!("request {request_id} not found")))?;

        if record.status != expected_from {
            return Err(StorageError::InvariantViolation(format!(
                "invalid request transition: expected {:?}, found {:?}",
                expected_from, record.status
            )));
        }

        record.status = to;
        record.updated_at = updated_at;
        Ok(record.clone())
    }

    async fn get_profile(&self, user_id: &UserId) -> StorageResult<Option<ProfileStats>> {
        let state = self.state.read().map_err(|_| poisoned("state"))?;
        Ok(state.profiles.get(user_id).cloned())
    }

    async fn record_like_received(&self, user_id: &UserId) -> StorageResult<ProfileStats> {
        let mut state = self.state.write().map_err(|_| poisoned("state"))?;
        let profile = state
            .profiles
            .entry(user_id.clone())
            .or_insert_with(|| ProfileStats::empty(user_id.clone()));
        profile.record_like();
        Ok(profile.clone())
    }

    async fn begin(&self, lock_timeout: Duration) -> StorageResult<Box<dyn CollaborationTx>> {
        Ok(Box::new(InMemoryTx {
            state: Arc::clone(&self.state),
            post_locks: Arc::clone(&self.post_locks),
            lock_timeout,
            held: HashMap::new(),
            staged_posts: HashMap::new(),
            staged_transitions: HashMap::new(),
            staged_collaborations: HashMap::new(),
        }))
    }
}

struct StagedTransition {
    /// Status the committed row must still have at commit time.
    committed_from: JoinRequestStatus,
    request: JoinRequest,
}

/// Unit of work over [`InMemoryCollaborationStore`].
pub struct InMemoryTx {
    state: Arc<RwLock<MemoryState>>,
    post_locks: Arc<PostLocks>,
    lock_timeout: Duration,
    held: HashMap<PostId, OwnedMutexGuard<()>>,
    staged_posts: HashMap<PostId, CollaborationPost>,
    staged_transitions: HashMap<RequestId, StagedTransition>,
    staged_collaborations: HashMap<UserId, u64>,
}

impl InMemoryTx {
    fn committed_post(&self, post_id: &PostId) -> StorageResult<Option<CollaborationPost>> {
        let state = self.state.read().map_err(|_| poisoned("state"))?;
        Ok(state.posts.get(post_id).cloned())
    }

    fn visible_request(&self, request_id: &RequestId) -> StorageResult<Option<JoinRequest>> {
        if let Some(staged) = self.staged_transitions.get(request_id) {
            return Ok(Some(staged.request.clone()));
        }
        let state = self.state.read().map_err(|_| poisoned("state"))?;
        Ok(state.requests.get(request_id).cloned())
    }
}

#[async_trait]
impl CollaborationTx for InMemoryTx {
    async fn get_request(&mut self, request_id: &RequestId) -> StorageResult<Option<JoinRequest>> {
        self.visible_request(request_id)
    }

    async fn lock_post_for_update(
        &mut self,
        post_id: &PostId,
    ) -> StorageResult<Option<CollaborationPost>> {
        if self.held.contains_key(post_id) {
            if let Some(staged) = self.staged_posts.get(post_id) {
                return Ok(Some(staged.clone()));
            }
            return self.committed_post(post_id);
        }

        // Posts are never deleted, so a missing row needs no lock.
        if self.committed_post(post_id)?.is_none() {
            return Ok(None);
        }

        let mutex = {
            let mut locks = self
                .post_locks
                .lock()
                .map_err(|_| poisoned("post lock registry"))?;
            Arc::clone(locks.entry(post_id.clone()).or_default())
        };
        let guard = tokio::time::timeout(self.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(post_id = %post_id, timeout = ?self.lock_timeout, "post lock wait timed out");
                StorageError::Timeout(format!(
                    "lock wait on post {post_id} exceeded {:?}",
                    self.lock_timeout
                ))
            })?;
        self.held.insert(post_id.clone(), guard);

        self.committed_post(post_id)
    }

    async fn transition_request(
        &mut self,
        request_id: &RequestId,
        expected_from: JoinRequestStatus,
        to: JoinRequestStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<JoinRequest> {
        check_transition(expected_from, to)?;
        let mut request = self
            .visible_request(request_id)?
            .ok_or_else(|| StorageError::NotFound(format!("request {request_id} not found")))?;

        if request.status != expected_from {
            return Err(StorageError::InvariantViolation(format!(
                "invalid request transition: expected {:?}, found {:?}",
                expected_from, request.status
            )));
        }

        let committed_from = self
            .staged_transitions
            .get(request_id)
            .map(|staged| staged.committed_from)
            .unwrap_or(expected_from);
        request.status = to;
        request.updated_at = updated_at;
        self.staged_transitions.insert(
            request_id.clone(),
            StagedTransition {
                committed_from,
                request: request.clone(),
            },
        );
        Ok(request)
    }

    async fn save_post(&mut self, post: &CollaborationPost) -> StorageResult<()> {
        if !self.held.contains_key(&post.id) {
            return Err(StorageError::InvariantViolation(format!(
                "post {} is not locked by this transaction",
                post.id
            )));
        }
        self.staged_posts.insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn increment_collaborations(&mut self, user_id: &UserId) -> StorageResult<ProfileStats> {
        let delta = self.staged_collaborations.entry(user_id.clone()).or_insert(0);
        *delta += 1;
        let delta = *delta;

        let state = self.state.read().map_err(|_| poisoned("state"))?;
        let mut preview = state
            .profiles
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| ProfileStats::empty(user_id.clone()));
        for _ in 0..delta {
            preview.record_collaboration();
        }
        Ok(preview)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let mut this = *self;
        {
            let mut state = this.state.write().map_err(|_| poisoned("state"))?;

            for (request_id, staged) in &this.staged_transitions {
                let current = state.requests.get(request_id).ok_or_else(|| {
                    StorageError::NotFound(format!("request {request_id} not found"))
                })?;
                if current.status != staged.committed_from {
                    return Err(StorageError::Conflict(format!(
                        "request {request_id} changed to {:?} during transaction",
                        current.status
                    )));
                }
            }

            for (request_id, staged) in this.staged_transitions.drain() {
                state.requests.insert(request_id, staged.request);
            }
            for (post_id, post) in this.staged_posts.drain() {
                state.posts.insert(post_id, post);
            }
            for (user_id, delta) in this.staged_collaborations.drain() {
                let profile = state
                    .profiles
                    .entry(user_id.clone())
                    .or_insert_with(|| ProfileStats::empty(user_id));
                for _ in 0..delta {
                    profile.record_collaboration();
                }
            }
        }
        // Row locks are released only after the writes are visible.
        drop(this);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        drop(self);
        Ok(())
    }
}

/// Sliding-window counter keyed by user and action.
#[derive(Default)]
pub struct InMemoryRateLimiter {
    events: Mutex<HashMap<(UserId, RateLimitAction), VecDeque<DateTime<Utc>>>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same as [`RateLimitStore::check_and_increment`] at an explicit instant.
    pub fn check_and_increment_at(
        &self,
        user_id: &UserId,
        action: RateLimitAction,
        policy: RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut guard = self.events.lock().map_err(|_| poisoned("rate limit"))?;
        let cutoff = now - policy.window;

        // Prune every history for this action and forget users whose window
        // has drained.
        guard.retain(|(_, tracked), history| {
            if *tracked == action {
                while history.front().is_some_and(|at| *at <= cutoff) {
                    history.pop_front();
                }
            }
            !history.is_empty()
        });

        let key = (user_id.clone(), action);
        let used = guard.get(&key).map_or(0, VecDeque::len);
        if used >= policy.limit as usize {
            return Ok(false);
        }
        guard.entry(key).or_default().push_back(now);
        Ok(true)
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimiter {
    async fn check_and_increment(
        &self,
        user_id: &UserId,
        action: RateLimitAction,
        policy: RateLimitPolicy,
    ) -> StorageResult<bool> {
        self.check_and_increment_at(user_id, action, policy, Utc::now())
    }
}

fn check_transition(from: JoinRequestStatus, to: JoinRequestStatus) -> StorageResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StorageError::InvalidInput(format!(
            "transition {:?} -> {:?} is not allowed",
            from, to
        )))
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
