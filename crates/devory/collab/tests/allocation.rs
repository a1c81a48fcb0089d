use async_trait::async_trait;
use devory_collab::{
    AllocationError, AllocatorConfig, CollaborationAllocator, InMemoryNotificationFeed, NotificationSink,
    NotifyError,
};
use devory_storage::memory::{InMemoryCollaborationStore, InMemoryRateLimiter};
use devory_storage::{CollaborationStore, CollaborationTx, QueryWindow};
use devory_types::{
    CollaborationPost, JoinRequestStatus, NewCollaborationPost, Notification, NotificationKind,
    PostStatus, UserId,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Harness {
    allocator: Arc<CollaborationAllocator>,
    store: Arc<InMemoryCollaborationStore>,
    feed: Arc<InMemoryNotificationFeed>,
}

fn harness() -> Harness {
    harness_with(InMemoryCollaborationStore::new(), AllocatorConfig::default())
}

fn harness_with(store: InMemoryCollaborationStore, config: AllocatorConfig) -> Harness {
    let store = Arc::new(store);
    let feed = Arc::new(InMemoryNotificationFeed::new());
    let allocator = CollaborationAllocator::new(
        store.clone(),
        Arc::new(InMemoryRateLimiter::new()),
        feed.clone(),
    )
    .with_config(config);
    Harness {
        allocator: Arc::new(allocator),
        store,
        feed,
    }
}

fn owner() -> UserId {
    UserId::new("owner")
}

async fn open_post(allocator: &CollaborationAllocator, slots: Option<u32>) -> CollaborationPost {
    allocator
        .create_post(NewCollaborationPost::collaboration(
            owner(),
            "campus delivery robot",
            slots,
        ))
        .await
        .expect("post")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_slot_race_has_exactly_one_winner() {
    let h = harness();
    let post = open_post(&h.allocator, Some(1)).await;

    let first = h
        .allocator
        .request_to_join(&post.id, &UserId::new("alice"), None)
        .await
        .expect("alice joins");
    let second = h
        .allocator
        .request_to_join(&post.id, &UserId::new("bob"), None)
        .await
        .expect("bob joins");

    let a = {
        let allocator = h.allocator.clone();
        let id = first.id.clone();
        tokio::spawn(async move { allocator.accept_request(&id, &owner()).await })
    };
    let b = {
        let allocator = h.allocator.clone();
        let id = second.id.clone();
        tokio::spawn(async move { allocator.accept_request(&id, &owner()).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].post.filled_slots, 1);
    assert_eq!(winners[0].post.status, PostStatus::Closed);

    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser, AllocationError::Full(_)), "got {loser:?}");

    let stored = h.allocator.get_post(&post.id).await.unwrap();
    assert_eq!(stored.filled_slots, 1);
    assert_eq!(stored.status, PostStatus::Closed);

    let accepted = h
        .allocator
        .list_requests(&post.id, &owner(), QueryWindow::default())
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.status == JoinRequestStatus::Accepted)
        .count();
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn final_slot_closes_post_and_blocks_new_requests() {
    let h = harness();
    let post = open_post(&h.allocator, Some(3)).await;

    for name in ["ana", "ben", "cai"] {
        let request = h
            .allocator
            .request_to_join(&post.id, &UserId::new(name), None)
            .await
            .unwrap();
        let accepted = h.allocator.accept_request(&request.id, &owner()).await.unwrap();
        if name != "cai" {
            assert_eq!(accepted.post.status, PostStatus::Open);
        } else {
            assert_eq!(accepted.post.filled_slots, 3);
            assert_eq!(accepted.post.status, PostStatus::Closed);
        }
    }

    let late = h
        .allocator
        .request_to_join(&post.id, &UserId::new("dee"), None)
        .await;
    assert!(matches!(late, Err(AllocationError::Closed(_))));
}

#[tokio::test]
async fn non_owner_cannot_accept_or_reject() {
    let h = harness();
    let post = open_post(&h.allocator, Some(2)).await;
    let request = h
        .allocator
        .request_to_join(&post.id, &UserId::new("bob"), None)
        .await
        .unwrap();
    let intruder = UserId::new("mallory");

    let accept = h.allocator.accept_request(&request.id, &intruder).await;
    assert!(matches!(accept, Err(AllocationError::Unauthorized(_))));
    let reject = h.allocator.reject_request(&request.id, &intruder).await;
    assert!(matches!(reject, Err(AllocationError::Unauthorized(_))));

    let stored_request = h.allocator.get_request(&request.id).await.unwrap();
    assert_eq!(stored_request.status, JoinRequestStatus::Pending);
    let stored_post = h.allocator.get_post(&post.id).await.unwrap();
    assert_eq!(stored_post.filled_slots, 0);
    assert_eq!(
        h.allocator
            .get_profile(&UserId::new("bob"))
            .await
            .unwrap()
            .collaborations_accepted,
        0
    );
}

#[tokio::test]
async fn eleventh_request_in_window_is_rate_limited() {
    let h = harness();
    let spammer = UserId::new("spammer");

    for i in 0..10 {
        let post = h
            .allocator
            .create_post(NewCollaborationPost::collaboration(
                UserId::new(format!("owner-{i}")),
                format!("project {i}"),
                Some(2),
            ))
            .await
            .unwrap();
        h.allocator
            .request_to_join(&post.id, &spammer, None)
            .await
            .expect("within quota");
    }

    let post = open_post(&h.allocator, Some(2)).await;
    let eleventh = h.allocator.request_to_join(&post.id, &spammer, None).await;
    assert!(matches!(eleventh, Err(AllocationError::RateLimited(_))));
    assert!(h
        .store
        .find_request(&post.id, &spammer)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn rejected_request_cannot_be_accepted() {
    let h = harness();
    let post = open_post(&h.allocator, Some(2)).await;
    let request = h
        .allocator
        .request_to_join(&post.id, &UserId::new("bob"), None)
        .await
        .unwrap();

    h.allocator.reject_request(&request.id, &owner()).await.unwrap();
    let accept = h.allocator.accept_request(&request.id, &owner()).await;
    assert!(matches!(accept, Err(AllocationError::InvalidState(_))));

    let again = h.allocator.reject_request(&request.id, &owner()).await;
    assert!(matches!(again, Err(AllocationError::InvalidState(_))));
    assert_eq!(h.allocator.get_post(&post.id).await.unwrap().filled_slots, 0);
}

#[tokio::test]
async fn accepted_request_is_not_accepted_twice() {
    let h = harness();
    let post = open_post(&h.allocator, Some(3)).await;
    let bob = UserId::new("bob");
    let request = h.allocator.request_to_join(&post.id, &bob, None).await.unwrap();

    h.allocator.accept_request(&request.id, &owner()).await.unwrap();
    let twice = h.allocator.accept_request(&request.id, &owner()).await;
    assert!(matches!(twice, Err(AllocationError::InvalidState(_))));
    let reject = h.allocator.reject_request(&request.id, &owner()).await;
    assert!(matches!(reject, Err(AllocationError::InvalidState(_))));

    assert_eq!(h.allocator.get_post(&post.id).await.unwrap().filled_slots, 1);
    assert_eq!(h.allocator.get_profile(&bob).await.unwrap().reputation_score, 10);
}

#[tokio::test]
async fn owner_cannot_join_own_post_even_when_full() {
    let h = harness();
    let post = open_post(&h.allocator, Some(1)).await;
    let attempt = h.allocator.request_to_join(&post.id, &owner(), None).await;
    assert!(matches!(attempt, Err(AllocationError::SelfJoinForbidden(_))));

    let unlimited = open_post(&h.allocator, None).await;
    let attempt = h
        .allocator
        .request_to_join(&unlimited.id, &owner(), None)
        .await;
    assert!(matches!(attempt, Err(AllocationError::SelfJoinForbidden(_))));
}

#[tokio::test]
async fn duplicate_request_keeps_single_row() {
    let h = harness();
    let post = open_post(&h.allocator, Some(2)).await;
    let bob = UserId::new("bob");

    h.allocator.request_to_join(&post.id, &bob, None).await.unwrap();
    let second = h.allocator.request_to_join(&post.id, &bob, None).await;
    assert!(matches!(second, Err(AllocationError::DuplicateRequest(_))));

    let listed = h
        .allocator
        .list_requests(&post.id, &owner(), QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn rejected_requester_cannot_reapply() {
    let h = harness();
    let post = open_post(&h.allocator, Some(2)).await;
    let bob = UserId::new("bob");
    let request = h.allocator.request_to_join(&post.id, &bob, None).await.unwrap();
    h.allocator.reject_request(&request.id, &owner()).await.unwrap();

    let retry = h.allocator.request_to_join(&post.id, &bob, None).await;
    assert!(matches!(retry, Err(AllocationError::DuplicateRequest(_))));
}

#[tokio::test]
async fn unlimited_posts_never_fill() {
    let h = harness();
    let post = open_post(&h.allocator, None).await;

    for i in 0..5 {
        let request = h
            .allocator
            .request_to_join(&post.id, &UserId::new(format!("dev-{i}")), None)
            .await
            .unwrap();
        let accepted = h.allocator.accept_request(&request.id, &owner()).await.unwrap();
        assert_eq!(accepted.post.status, PostStatus::Open);
    }
    assert_eq!(h.allocator.get_post(&post.id).await.unwrap().filled_slots, 5);
}

#[tokio::test]
async fn lock_wait_times_out_without_side_effects() {
    let h = harness_with(
        InMemoryCollaborationStore::new(),
        AllocatorConfig {
            lock_timeout_ms: 50,
            ..AllocatorConfig::default()
        },
    );
    let post = open_post(&h.allocator, Some(1)).await;
    let bob = UserId::new("bob");
    let request = h.allocator.request_to_join(&post.id, &bob, None).await.unwrap();

    let mut holder = h.store.begin(Duration::from_secs(5)).await.unwrap();
    holder.lock_post_for_update(&post.id).await.unwrap();

    let blocked = h.allocator.accept_request(&request.id, &owner()).await;
    let err = blocked.unwrap_err();
    assert!(matches!(err, AllocationError::Timeout(_)));
    assert!(err.is_retryable());
    holder.rollback().await.unwrap();

    assert_eq!(
        h.allocator.get_request(&request.id).await.unwrap().status,
        JoinRequestStatus::Pending
    );
    assert!(h
        .feed
        .list_for(&bob)
        .iter()
        .all(|n| n.kind != NotificationKind::CollabAccept));

    // Retrying from scratch succeeds once the lock is free.
    let accepted = h.allocator.accept_request(&request.id, &owner()).await.unwrap();
    assert_eq!(accepted.post.status, PostStatus::Closed);
}

#[tokio::test]
async fn configured_lock_timeout_bounds_acceptance() {
    let allocator = CollaborationAllocator::in_memory().with_config(AllocatorConfig {
        lock_timeout_ms: 50,
        ..AllocatorConfig::default()
    });
    assert_eq!(allocator.config().lock_timeout(), Duration::from_millis(50));
    let post = open_post(&allocator, Some(2)).await;
    let request = allocator
        .request_to_join(&post.id, &UserId::new("bob"), None)
        .await
        .unwrap();

    let mut holder = allocator.store().begin(Duration::from_secs(5)).await.unwrap();
    holder.lock_post_for_update(&post.id).await.unwrap();

    let started = std::time::Instant::now();
    let err = allocator
        .accept_request(&request.id, &owner())
        .await
        .unwrap_err();
    let waited = started.elapsed();
    holder.rollback().await.unwrap();

    assert!(matches!(err, AllocationError::Timeout(_)));
    assert!(waited >= Duration::from_millis(50), "gave up early: {waited:?}");
    assert!(waited < Duration::from_secs(1), "ignored configured wait: {waited:?}");
}

/// Records the request status visible in storage at delivery time.
struct ObservingSink {
    store: Arc<dyn CollaborationStore>,
    observed: Mutex<Vec<(NotificationKind, JoinRequestStatus)>>,
}

#[async_trait]
impl NotificationSink for ObservingSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let request = self
            .store
            .get_request(&notification.request_id)
            .await
            .map_err(|err| NotifyError::Delivery(err.to_string()))?
            .ok_or_else(|| NotifyError::Delivery("request missing".to_string()))?;
        self.observed
            .lock()
            .unwrap()
            .push((notification.kind, request.status));
        Ok(())
    }
}

#[tokio::test]
async fn notifications_see_committed_state() {
    let store: Arc<dyn CollaborationStore> = Arc::new(InMemoryCollaborationStore::new());
    let sink = Arc::new(ObservingSink {
        store: store.clone(),
        observed: Mutex::new(Vec::new()),
    });
    let allocator = CollaborationAllocator::new(
        store,
        Arc::new(InMemoryRateLimiter::new()),
        sink.clone(),
    );
    let post = open_post(&allocator, Some(2)).await;

    let first = allocator
        .request_to_join(&post.id, &UserId::new("bob"), None)
        .await
        .unwrap();
    let second = allocator
        .request_to_join(&post.id, &UserId::new("cy"), None)
        .await
        .unwrap();
    allocator.accept_request(&first.id, &owner()).await.unwrap();
    allocator.reject_request(&second.id, &owner()).await.unwrap();

    let observed = sink.observed.lock().unwrap().clone();
    assert_eq!(
        observed,
        vec![
            (NotificationKind::CollabRequest, JoinRequestStatus::Pending),
            (NotificationKind::CollabRequest, JoinRequestStatus::Pending),
            (NotificationKind::CollabAccept, JoinRequestStatus::Accepted),
            (NotificationKind::CollabReject, JoinRequestStatus::Rejected),
        ]
    );
}

struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("push gateway down".to_string()))
    }
}

#[tokio::test]
async fn notification_failure_does_not_undo_acceptance() {
    let allocator = CollaborationAllocator::new(
        Arc::new(InMemoryCollaborationStore::new()),
        Arc::new(InMemoryRateLimiter::new()),
        Arc::new(FailingSink),
    );
    let post = open_post(&allocator, Some(1)).await;
    let request = allocator
        .request_to_join(&post.id, &UserId::new("bob"), None)
        .await
        .expect("request survives failed notification");

    let accepted = allocator.accept_request(&request.id, &owner()).await.unwrap();
    assert_eq!(accepted.request.status, JoinRequestStatus::Accepted);
    assert_eq!(
        allocator.get_request(&request.id).await.unwrap().status,
        JoinRequestStatus::Accepted
    );
}

#[tokio::test]
async fn failed_precondition_sends_nothing() {
    let h = harness();
    let post = open_post(&h.allocator, Some(1)).await;
    let _ = h.allocator.request_to_join(&post.id, &owner(), None).await;
    assert_eq!(h.feed.total(), 0);
}
