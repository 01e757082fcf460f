//! SubscriptionStore port: durable record of who waits for which task.

use async_trait::async_trait;

use crate::domain::{SubscriberId, Subscription, TaskKey, VigilError};

/// Durable mapping from (subscriber, task) to a pending subscription.
///
/// Design intent:
/// - Operations are independently atomic per key and durable before they
///   return; "notify once" in the reconciler depends on `remove` being
///   visible to the next tick.
/// - Insert and delete are idempotent. There is no update: a subscription
///   is created, then deleted, and nothing else ever happens to it.
/// - No multi-step transaction spans a command handler and the loop, so
///   per-operation atomicity is all the concurrency control the store owes
///   its callers.
/// - This trait is the seam for swapping implementations (sqlite in
///   production, memory in tests).
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Idempotent insert; adding an existing pair is a no-op.
    async fn add(&self, subscriber: SubscriberId, task: &TaskKey) -> Result<(), VigilError>;

    async fn exists(&self, subscriber: SubscriberId, task: &TaskKey)
    -> Result<bool, VigilError>;

    /// Idempotent delete.
    async fn remove(&self, subscriber: SubscriberId, task: &TaskKey) -> Result<(), VigilError>;

    /// Delete every subscription held by `subscriber`.
    async fn remove_all(&self, subscriber: SubscriberId) -> Result<(), VigilError>;

    /// Task keys `subscriber` is waiting on.
    async fn list_for(&self, subscriber: SubscriberId) -> Result<Vec<TaskKey>, VigilError>;

    /// Every pending subscription. Order is unspecified.
    async fn list_all(&self) -> Result<Vec<Subscription>, VigilError>;
}
