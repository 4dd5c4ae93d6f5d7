//! `SharedRegistry`: the registry's single critical section.
//!
//! The scheduler loop and the management API both go through
//! [`SharedRegistry::lock`]. Every committed batch is saved to storage and
//! bumps a revision on a watch channel, which blocking start/stop
//! requests wait on without holding the lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::time::Instant;
use tracing::debug;

use crate::error::StateResult;
use crate::node::NodeState;
use crate::registry::Registry;
use crate::storage::{Storage, load_or_default};

#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<Registry>>,
    storage: Arc<dyn Storage>,
    revision: watch::Sender<u64>,
}

impl SharedRegistry {
    pub fn new(registry: Registry, storage: Arc<dyn Storage>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(registry)),
            storage,
            revision,
        }
    }

    /// Load from `storage` (empty if nothing stored yet).
    pub fn load(storage: Arc<dyn Storage>) -> StateResult<Self> {
        let registry = load_or_default(storage.as_ref())?;
        Ok(Self::new(registry, storage))
    }

    pub async fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().await
    }

    /// Persist a mutated registry and wake waiters. Call with the guard
    /// still held so the saved state is the one just produced.
    pub fn commit(&self, registry: &Registry) -> StateResult<()> {
        self.storage.save(registry)?;
        self.revision.send_modify(|rev| *rev += 1);
        debug!(revision = *self.revision.borrow(), "registry committed");
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Wait until every node in `ids` is in `target` (a removed node
    /// counts as arrived). Returns `false` if `timeout` expires first.
    pub async fn wait_for(&self, ids: &[String], target: NodeState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut changes = self.subscribe();

        loop {
            {
                let registry = self.lock().await;
                let arrived = ids
                    .iter()
                    .all(|id| registry.node(id).is_none_or(|n| n.state == target));
                if arrived {
                    return true;
                }
            }

            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return false,
            }
        }
    }
}
