//! In-memory store implementation.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{SubscriberId, Subscription, TaskKey, VigilError};
use crate::ports::SubscriptionStore;

/// In-memory store state.
///
/// A sorted set of (subscriber, task) pairs. The pair is the whole record,
/// so a set is the entire schema; the set's uniqueness is what makes `add`
/// idempotent.
#[derive(Default)]
struct InMemoryStoreState {
    pairs: BTreeSet<(SubscriberId, TaskKey)>,
}

/// In-memory `SubscriptionStore`.
///
/// Used by tests and volatile runs. Durability across restarts is the
/// sqlite store's job; this one only promises the same per-operation
/// atomicity.
pub struct InMemoryStore {
    state: Arc<Mutex<InMemoryStoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryStoreState::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn add(&self, subscriber: SubscriberId, task: &TaskKey) -> Result<(), VigilError> {
        let mut state = self.state.lock().await;
        state.pairs.insert((subscriber, task.clone()));
        Ok(())
    }

    async fn exists(
        &self,
        subscriber: SubscriberId,
        task: &TaskKey,
    ) -> Result<bool, VigilError> {
        let state = self.state.lock().await;
        Ok(state.pairs.contains(&(subscriber, task.clone())))
    }

    async fn remove(&self, subscriber: SubscriberId, task: &TaskKey) -> Result<(), VigilError> {
        let mut state = self.state.lock().await;
        state.pairs.remove(&(subscriber, task.clone()));
        Ok(())
    }

    async fn remove_all(&self, subscriber: SubscriberId) -> Result<(), VigilError> {
        let mut state = self.state.lock().await;
        state.pairs.retain(|(s, _)| *s != subscriber);
        Ok(())
    }

    async fn list_for(&self, subscriber: SubscriberId) -> Result<Vec<TaskKey>, VigilError> {
        let state = self.state.lock().await;
        Ok(state
            .pairs
            .iter()
            .filter(|(s, _)| *s == subscriber)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Subscription>, VigilError> {
        let state = self.state.lock().await;
        Ok(state
            .pairs
            .iter()
            .map(|(s, t)| Subscription::new(*s, t.clone()))
            .collect())
    }
}
