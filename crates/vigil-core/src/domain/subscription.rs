//! The unit of durable state: who waits for which task.

use serde::{Deserialize, Serialize};

use super::{SubscriberId, TaskKey};

/// One subscriber's pending wait for one task's completion.
///
/// Design:
/// - Existence means pending; deletion means resolved or cancelled.
/// - At most one record per (subscriber, task) pair; re-subscribing is a
///   no-op, not a duplicate.
/// - There is no status field, so the store never updates in place: records
///   are created, then deleted, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subscription {
    pub subscriber: SubscriberId,
    pub task: TaskKey,
}

impl Subscription {
    pub fn new(subscriber: SubscriberId, task: TaskKey) -> Self {
        Self { subscriber, task }
    }
}
