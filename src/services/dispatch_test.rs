use async_trait::async_trait;
use futures::future::join_all;
use time::macros::datetime;
use uuid::Uuid;

use super::*;
use crate::identity::{ExternalIdentity, Link};
use crate::store::LinkTable;
use crate::store::memory::MemoryStore;

fn identity(external_id: &str, email: &str) -> ExternalIdentity {
    ExternalIdentity {
        external_id: external_id.into(),
        email: email.into(),
        email_verified: true,
        created_at: datetime!(2026-03-01 12:00 UTC),
    }
}

fn dispatcher(workers: usize) -> (Arc<MemoryStore>, EventDispatcher) {
    let store = Arc::new(MemoryStore::new());
    let coordinator = Arc::new(SyncCoordinator::new(store.clone(), store.clone()));
    let (dispatcher, _handles) = EventDispatcher::spawn(coordinator, workers, 16);
    (store, dispatcher)
}

// =============================================================================
// shard_for
// =============================================================================

#[test]
fn shard_for_is_stable_and_in_range() {
    for shards in 1..10 {
        let a = shard_for("ext-1", shards);
        assert!(a < shards);
        assert_eq!(a, shard_for("ext-1", shards));
    }
}

#[test]
fn shard_for_zero_shards_does_not_panic() {
    assert_eq!(shard_for("ext-1", 0), 0);
}

// =============================================================================
// submit
// =============================================================================

#[tokio::test]
async fn submit_returns_handler_outcome() {
    let (store, dispatcher) = dispatcher(2);
    let outcome = dispatcher
        .submit(IdentityEvent::Created { identity: identity("ext-1", "a@x.com") })
        .await
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::Created { .. }));
    assert_eq!(store.link_count().await, 1);
}

#[tokio::test]
async fn submit_surfaces_store_errors() {
    let (store, dispatcher) = dispatcher(2);
    store.set_unavailable(true);
    let err = dispatcher
        .submit(IdentityEvent::Created { identity: identity("ext-1", "a@x.com") })
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Sync(StoreError::Unavailable(_))));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn same_identity_events_apply_in_submission_order() {
    let (store, dispatcher) = dispatcher(4);
    let a = identity("ext-42", "a@x.com");
    let b = identity("ext-42", "b@x.com");

    let results = join_all([
        dispatcher.submit(IdentityEvent::Created { identity: a.clone() }),
        dispatcher.submit(IdentityEvent::Updated { old: a, new: b.clone() }),
        dispatcher.submit(IdentityEvent::Deleted { identity: b }),
    ])
    .await;

    assert!(matches!(results[0], Ok(SyncOutcome::Created { .. })));
    assert!(matches!(results[1], Ok(SyncOutcome::EmailPatched { .. })));
    assert!(matches!(results[2], Ok(SyncOutcome::Deleted { .. })));
    assert_eq!(store.user_count().await, 0);
    assert_eq!(store.link_count().await, 0);
}

#[tokio::test]
async fn distinct_identities_each_get_one_user() {
    let (store, dispatcher) = dispatcher(4);
    let submissions = (0..32).map(|i| {
        let event = IdentityEvent::Created { identity: identity(&format!("ext-{i}"), &format!("u{i}@x.com")) };
        dispatcher.submit(event)
    });

    let results = join_all(submissions).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(store.user_count().await, 32);
    assert_eq!(store.link_count().await, 32);
}

#[tokio::test]
async fn redelivered_creates_do_not_duplicate() {
    let (store, dispatcher) = dispatcher(3);
    let id = identity("ext-7", "seven@x.com");
    let results = join_all((0..5).map(|_| dispatcher.submit(IdentityEvent::Created { identity: id.clone() }))).await;

    let created = results
        .iter()
        .filter(|r| matches!(r, Ok(SyncOutcome::Created { .. })))
        .count();
    assert_eq!(created, 1);
    assert_eq!(store.user_count().await, 1);
    assert_eq!(store.link_count().await, 1);
}

#[tokio::test]
async fn submit_after_workers_stop_is_closed() {
    let store = Arc::new(MemoryStore::new());
    let coordinator = Arc::new(SyncCoordinator::new(store.clone(), store));
    let (dispatcher, handles) = EventDispatcher::spawn(coordinator, 1, 4);
    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }

    let err = dispatcher
        .submit(IdentityEvent::Created { identity: identity("ext-1", "a@x.com") })
        .await
        .unwrap_err();
    assert_eq!(err, DispatchError::Closed);
}

// =============================================================================
// handler panics
// =============================================================================

/// Link table that panics on lookups for one identity and delegates otherwise.
struct PanicsOn {
    external_id: &'static str,
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl LinkTable for PanicsOn {
    async fn put(&self, external_id: &str, app_user_id: Uuid) -> Result<Link, StoreError> {
        self.inner.put(external_id, app_user_id).await
    }

    async fn get(&self, external_id: &str) -> Result<Option<Link>, StoreError> {
        assert_ne!(external_id, self.external_id, "link lookup blew up");
        self.inner.get(external_id).await
    }

    async fn remove(&self, external_id: &str) -> Result<bool, StoreError> {
        self.inner.remove(external_id).await
    }

    async fn repoint(&self, external_id: &str, app_user_id: Uuid) -> Result<Link, StoreError> {
        self.inner.repoint(external_id, app_user_id).await
    }
}

#[tokio::test]
async fn handler_panic_fails_one_event_and_shard_keeps_serving() {
    let store = Arc::new(MemoryStore::new());
    let links = Arc::new(PanicsOn { external_id: "ext-boom", inner: store.clone() });
    let coordinator = Arc::new(SyncCoordinator::new(store.clone(), links));
    let (dispatcher, handles) = EventDispatcher::spawn(coordinator, 1, 4);

    let err = dispatcher
        .submit(IdentityEvent::Created { identity: identity("ext-boom", "boom@x.com") })
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Sync(StoreError::Write(ref m)) if m.contains("panicked")));
    assert!(err.is_retryable());

    let outcome = dispatcher
        .submit(IdentityEvent::Created { identity: identity("ext-1", "a@x.com") })
        .await
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::Created { .. }));
    assert!(handles.iter().all(|h| !h.is_finished()));
    assert_eq!(store.link_count().await, 1);
}
