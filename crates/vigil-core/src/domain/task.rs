//! Task snapshots: what the remote source reports about one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskKey;

/// Remote task state.
///
/// Transitions happen on the server; vigil only observes them:
/// - Queued -> Running -> Success
/// - Queued -> Running -> Error
///
/// Once terminal, a task never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Accepted by the server, not yet running.
    Queued,

    /// In progress.
    Running,

    /// Finished successfully.
    Success,

    /// Finished with an error.
    Error,
}

impl TaskState {
    /// Terminal states are what subscriptions wait for.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error)
    }
}

/// Point-in-time view of one remote task.
///
/// Fetched per poll and discarded. Never persisted: the store holds only
/// pending subscriptions, and a stale snapshot is worthless next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub key: TaskKey,
    pub description: String,

    /// Name of the entity the task operates on (a VM, a host, ...).
    pub entity: String,

    /// Name of the user who initiated the task on the server.
    pub user: String,

    pub state: TaskState,

    /// Percent complete, 0..=100. The server may omit it while queued.
    pub progress: Option<u8>,

    pub started_at: DateTime<Utc>,

    /// Present only once the task is terminal.
    pub completed_at: Option<DateTime<Utc>>,

    /// Error detail, present only for `TaskState::Error`.
    pub error: Option<String>,
}
