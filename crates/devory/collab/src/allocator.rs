//! Collaboration slot allocator.
//!
//! Join requests are admitted without touching capacity. Acceptance is the
//! only capacity-changing decision: it runs in one unit of work that locks
//! the post row, re-validates against the locked values, fills the slot,
//! closes the post when the last slot goes, and credits the requester's
//! reputation. Notifications go out only after commit.

use crate::config::AllocatorConfig;
use crate::effects::PostCommitEffects;
use crate::error::{AllocationError, AllocationResult};
use crate::notify::{NotificationSink, TracingNotificationSink};
use chrono::Utc;
use devory_storage::memory::{InMemoryCollaborationStore, InMemoryRateLimiter};
use devory_storage::{
    CollaborationStore, CollaborationTx, QueryWindow, RateLimitStore, StorageError,
};
use devory_types::{
    CollaborationPost, JoinRequest, JoinRequestStatus, NewCollaborationPost, Notification,
    NotificationKind, PostId, PostKind, ProfileStats, RateLimitAction, RequestId, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Longest note a requester may attach to a join request.
pub const MAX_MESSAGE_LEN: usize = 1_000;

/// Result of a successful acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acceptance {
    pub request: JoinRequest,
    pub post: CollaborationPost,
    pub requester_profile: ProfileStats,
}

/// Capacity-safe coordinator for collaboration join requests.
pub struct CollaborationAllocator {
    store: Arc<dyn CollaborationStore>,
    rate_limiter: Arc<dyn RateLimitStore>,
    notifier: Arc<dyn NotificationSink>,
    config: AllocatorConfig,
}

impl CollaborationAllocator {
    pub fn new(
        store: Arc<dyn CollaborationStore>,
        rate_limiter: Arc<dyn RateLimitStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            rate_limiter,
            notifier,
            config: AllocatorConfig::default(),
        }
    }

    /// Allocator over in-memory storage that only logs notifications.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryCollaborationStore::new()),
            Arc::new(InMemoryRateLimiter::new()),
            Arc::new(TracingNotificationSink),
        )
    }

    pub fn with_config(mut self, config: AllocatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Access the underlying storage backend.
    pub fn store(&self) -> Arc<dyn CollaborationStore> {
        Arc::clone(&self.store)
    }

    pub async fn create_post(&self, post: NewCollaborationPost) -> AllocationResult<CollaborationPost> {
        if post.title.trim().is_empty() {
            return Err(AllocationError::InvalidInput(
                "title must not be empty".to_string(),
            ));
        }
        match (post.kind, post.required_slots) {
            (_, Some(0)) => {
                return Err(AllocationError::InvalidInput(
                    "required_slots must be positive".to_string(),
                ));
            }
            (PostKind::Idea, Some(_)) => {
                return Err(AllocationError::InvalidInput(
                    "idea posts do not take collaborators".to_string(),
                ));
            }
            _ => {}
        }

        let created = self.store.create_post(post, Utc::now()).await?;
        tracing::info!(
            post_id = %created.id,
            owner_id = %created.owner_id,
            required_slots = ?created.required_slots,
            "Created collaboration post"
        );
        Ok(created)
    }

    pub async fn get_post(&self, post_id: &PostId) -> AllocationResult<CollaborationPost> {
        self.store
            .get_post(post_id)
            .await?
            .ok_or_else(|| AllocationError::NotFound(format!("post {post_id}")))
    }

    pub async fn get_request(&self, request_id: &RequestId) -> AllocationResult<JoinRequest> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or_else(|| AllocationError::NotFound(format!("request {request_id}")))
    }

    /// Requests against a post, newest first. Only the owner may list them.
    pub async fn list_requests(
        &self,
        post_id: &PostId,
        viewer_id: &UserId,
        window: QueryWindow,
    ) -> AllocationResult<Vec<JoinRequest>> {
        let post = self.get_post(post_id).await?;
        if post.owner_id != *viewer_id {
            return Err(AllocationError::Unauthorized(format!(
                "user {viewer_id} does not own post {post_id}"
            )));
        }
        Ok(self.store.list_requests(post_id, window).await?)
    }

    /// Profile stats for a user; unknown users have zeroed stats.
    pub async fn get_profile(&self, user_id: &UserId) -> AllocationResult<ProfileStats> {
        Ok(self
            .store
            .get_profile(user_id)
            .await?
            .unwrap_or_else(|| ProfileStats::empty(user_id.clone())))
    }

    /// Submit a PENDING join request.
    ///
    /// Preconditions fail fast in this order: quota, post exists, post type,
    /// post open, not the owner, no earlier request, capacity. The post row
    /// is not locked; capacity is enforced again at acceptance.
    #[instrument(skip_all, fields(post_id = %post_id, requester_id = %requester_id))]
    pub async fn request_to_join(
        &self,
        post_id: &PostId,
        requester_id: &UserId,
        message: Option<String>,
    ) -> AllocationResult<JoinRequest> {
        let message = normalize_message(message)?;

        let allowed = self
            .rate_limiter
            .check_and_increment(
                requester_id,
                RateLimitAction::JoinRequest,
                self.config.join_policy(),
            )
            .await?;
        if !allowed {
            tracing::debug!("join request quota exhausted");
            return Err(AllocationError::RateLimited(requester_id.to_string()));
        }

        let post = self.get_post(post_id).await?;
        if !post.kind.supports_collaboration() {
            return Err(AllocationError::InvalidPostType(post_id.to_string()));
        }
        if !post.is_open() {
            return Err(AllocationError::Closed(post_id.to_string()));
        }
        if post.owner_id == *requester_id {
            return Err(AllocationError::SelfJoinForbidden(post_id.to_string()));
        }
        if self
            .store
            .find_request(post_id, requester_id)
            .await?
            .is_some()
        {
            return Err(AllocationError::DuplicateRequest(post_id.to_string()));
        }
        if !post.has_capacity() {
            return Err(AllocationError::Full(post_id.to_string()));
        }

        let request = JoinRequest::pending(post.id.clone(), requester_id.clone(), message, Utc::now());
        self.store
            .insert_request(request.clone())
            .await
            .map_err(|err| match err {
                // Lost the unique-constraint race against a concurrent submit.
                StorageError::Conflict(_) => AllocationError::DuplicateRequest(post_id.to_string()),
                other => other.into(),
            })?;

        tracing::info!(request_id = %request.id, "Join request submitted");

        let mut effects = PostCommitEffects::new();
        effects.notify(Notification {
            recipient_id: post.owner_id,
            kind: NotificationKind::CollabRequest,
            actor_id: requester_id.clone(),
            post_id: post.id,
            request_id: request.id.clone(),
            created_at: request.created_at,
        });
        effects.dispatch(self.notifier.as_ref()).await;

        Ok(request)
    }

    /// Accept a PENDING request, consuming one slot.
    ///
    /// All writes commit together or not at all. When two acceptances race
    /// for the last slot, the one that obtains the post lock second sees the
    /// filled counter and fails with `Full`.
    #[instrument(skip_all, fields(request_id = %request_id, owner_id = %owner_id))]
    pub async fn accept_request(
        &self,
        request_id: &RequestId,
        owner_id: &UserId,
    ) -> AllocationResult<Acceptance> {
        let mut tx = self.store.begin(self.config.lock_timeout()).await?;
        let outcome = self.accept_in(tx.as_mut(), request_id, owner_id).await;

        match outcome {
            Ok((acceptance, effects)) => {
                tx.commit().await?;
                tracing::info!(
                    post_id = %acceptance.post.id,
                    filled_slots = acceptance.post.filled_slots,
                    post_status = ?acceptance.post.status,
                    "Join request accepted"
                );
                effects.dispatch(self.notifier.as_ref()).await;
                Ok(acceptance)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback after rejected acceptance failed");
                }
                tracing::debug!(error = %err, "Acceptance aborted");
                Err(err)
            }
        }
    }

    async fn accept_in(
        &self,
        tx: &mut dyn CollaborationTx,
        request_id: &RequestId,
        owner_id: &UserId,
    ) -> AllocationResult<(Acceptance, PostCommitEffects)> {
        let post_id = tx
            .get_request(request_id)
            .await?
            .ok_or_else(|| AllocationError::NotFound(format!("request {request_id}")))?
            .post_id;

        let mut post = tx
            .lock_post_for_update(&post_id)
            .await?
            .ok_or_else(|| AllocationError::NotFound(format!("post {post_id}")))?;

        // Everything below reads values obtained under the lock.
        let request = tx
            .get_request(request_id)
            .await?
            .ok_or_else(|| AllocationError::NotFound(format!("request {request_id}")))?;

        if post.owner_id != *owner_id {
            return Err(AllocationError::Unauthorized(format!(
                "user {owner_id} does not own post {post_id}"
            )));
        }
        if request.status != JoinRequestStatus::Pending {
            return Err(AllocationError::InvalidState(format!(
                "request {request_id} is {:?}",
                request.status
            )));
        }
        // A post that closed because it filled reports Full to the loser of
        // a last-slot race.
        if !post.has_capacity() {
            return Err(AllocationError::Full(post_id.to_string()));
        }
        if !post.is_open() {
            return Err(AllocationError::Closed(post_id.to_string()));
        }

        let now = Utc::now();
        let request = tx
            .transition_request(
                request_id,
                JoinRequestStatus::Pending,
                JoinRequestStatus::Accepted,
                now,
            )
            .await?;
        post.fill_slot(now);
        tx.save_post(&post).await?;
        let requester_profile = tx.increment_collaborations(&request.requester_id).await?;

        let mut effects = PostCommitEffects::new();
        effects.notify(Notification {
            recipient_id: request.requester_id.clone(),
            kind: NotificationKind::CollabAccept,
            actor_id: owner_id.clone(),
            post_id: post.id.clone(),
            request_id: request.id.clone(),
            created_at: now,
        });

        Ok((
            Acceptance {
                request,
                post,
                requester_profile,
            },
            effects,
        ))
    }

    /// Reject a PENDING request. Capacity and reputation are untouched.
    #[instrument(skip_all, fields(request_id = %request_id, owner_id = %owner_id))]
    pub async fn reject_request(
        &self,
        request_id: &RequestId,
        owner_id: &UserId,
    ) -> AllocationResult<JoinRequest> {
        let request = self.get_request(request_id).await?;
        let post = self.get_post(&request.post_id).await?;

        if post.owner_id != *owner_id {
            return Err(AllocationError::Unauthorized(format!(
                "user {owner_id} does not own post {}",
                post.id
            )));
        }
        if request.status != JoinRequestStatus::Pending {
            return Err(AllocationError::InvalidState(format!(
                "request {request_id} is {:?}",
                request.status
            )));
        }

        // Compare-and-set; a decision that landed since the read surfaces
        // as InvalidState.
        let rejected = self
            .store
            .transition_request(
                request_id,
                JoinRequestStatus::Pending,
                JoinRequestStatus::Rejected,
                Utc::now(),
            )
            .await?;

        tracing::info!(post_id = %post.id, "Join request rejected");

        let mut effects = PostCommitEffects::new();
        effects.notify(Notification {
            recipient_id: rejected.requester_id.clone(),
            kind: NotificationKind::CollabReject,
            actor_id: owner_id.clone(),
            post_id: post.id,
            request_id: rejected.id.clone(),
            created_at: rejected.updated_at,
        });
        effects.dispatch(self.notifier.as_ref()).await;

        Ok(rejected)
    }
}

fn normalize_message(message: Option<String>) -> AllocationResult<Option<String>> {
    let Some(message) = message else {
        return Ok(None);
    };
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(AllocationError::InvalidInput(format!(
            "message exceeds {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}
