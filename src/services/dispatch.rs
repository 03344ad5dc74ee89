//! Event dispatcher: per-identity ordered delivery into the coordinator.
//!
//! ARCHITECTURE
//! ============
//! Events are sharded by a hash of their external id onto N worker tasks,
//! each draining its own bounded FIFO queue. Two events for the same identity
//! always land on the same worker and apply in submission order; events for
//! different identities run in parallel across workers.
//!
//! TRADE-OFFS
//! ==========
//! Sharding is static, so one slow identity delays the unrelated identities
//! that hash onto the same worker. Reads never go through the dispatcher,
//! so `resolve_current_user` is unaffected by queue depth.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::sync::{SyncCoordinator, SyncOutcome};
use crate::identity::IdentityEvent;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Sync(#[from] StoreError),
    #[error("event dispatcher is shut down")]
    Closed,
}

impl DispatchError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Sync(e) => e.is_retryable(),
            Self::Closed => true,
        }
    }
}

struct Job {
    event: IdentityEvent,
    reply: oneshot::Sender<Result<SyncOutcome, StoreError>>,
}

/// Handle for submitting lifecycle events. Cheap to clone.
#[derive(Clone)]
pub struct EventDispatcher {
    shards: Arc<Vec<mpsc::Sender<Job>>>,
}

impl EventDispatcher {
    /// Spawn `workers` shard tasks, each with a queue of `queue_capacity`.
    /// Returns the handle plus the worker join handles for shutdown.
    #[must_use]
    pub fn spawn(
        coordinator: Arc<SyncCoordinator>,
        workers: usize,
        queue_capacity: usize,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let workers = workers.max(1);
        let mut shards = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for shard in 0..workers {
            let (tx, rx) = mpsc::channel(queue_capacity.max(1));
            shards.push(tx);
            handles.push(tokio::spawn(run_shard(shard, coordinator.clone(), rx)));
        }

        info!(workers, queue_capacity, "event dispatcher started");
        (Self { shards: Arc::new(shards) }, handles)
    }

    /// Queue an event and wait for its handler to finish.
    ///
    /// # Errors
    ///
    /// The handler's store error, or `Closed` if the worker is gone.
    pub async fn submit(&self, event: IdentityEvent) -> Result<SyncOutcome, DispatchError> {
        let shard = shard_for(event.external_id(), self.shards.len());
        let (reply, rx) = oneshot::channel();

        self.shards[shard]
            .send(Job { event, reply })
            .await
            .map_err(|_| DispatchError::Closed)?;

        let outcome = rx.await.map_err(|_| DispatchError::Closed)??;
        Ok(outcome)
    }
}

pub(crate) fn shard_for(external_id: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    external_id.hash(&mut hasher);
    let shards = u64::try_from(shards.max(1)).unwrap_or(u64::MAX);
    usize::try_from(hasher.finish() % shards).unwrap_or(0)
}

/// Log each shard task's exit. Shards only stop once every dispatcher handle
/// is dropped; an exit while the server runs leaves its identities answering
/// `Closed` until restart.
pub fn watch_shards(handles: Vec<JoinHandle<()>>) {
    for (shard, handle) in handles.into_iter().enumerate() {
        tokio::spawn(async move {
            match handle.await {
                Ok(()) => warn!(shard, "dispatch shard exited"),
                Err(e) => error!(shard, error = %e, "dispatch shard crashed"),
            }
        });
    }
}

async fn run_shard(shard: usize, coordinator: Arc<SyncCoordinator>, mut rx: mpsc::Receiver<Job>) {
    while let Some(Job { event, reply }) = rx.recv().await {
        let external_id = event.external_id().to_owned();
        let kind = event.kind();

        // Each handler runs in its own task so a panic fails one event, not the shard.
        let handler = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.apply(&event).await })
        };
        let result = handler.await.unwrap_or_else(|e| {
            error!(shard, kind, %external_id, error = %e, "sync handler panicked");
            Err(StoreError::Write(format!("sync handler panicked: {e}")))
        });

        match &result {
            Ok(outcome) => debug!(shard, kind, %external_id, ?outcome, "event applied"),
            Err(e) => warn!(shard, kind, %external_id, error = %e, retryable = e.is_retryable(), "event failed"),
        }

        // Submitter may have gone away; the write already happened either way.
        let _ = reply.send(result);
    }
    debug!(shard, "dispatch shard stopped");
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
