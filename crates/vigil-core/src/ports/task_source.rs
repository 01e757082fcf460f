//! TaskSource port: read-only view of the remote management server.

use async_trait::async_trait;

use crate::domain::{AlarmSnapshot, TaskKey, TaskSnapshot, VigilError};

/// Query surface over the management server. Pure reads, no mutation.
///
/// Error contract (callers rely on the distinction):
/// - Network/auth trouble is `Err(RemoteUnavailable)`.
/// - A key the server does not know is `Ok(None)` from `get_task`. Task
///   history windows rotate on the server side, so this is a normal outcome
///   for an existing subscription, not a failure.
///
/// Calls may block for a network round trip; callers must not hold locks
/// across them. Reconnect-on-failure is the implementation's own concern;
/// the core only assumes any call can fail at any time.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Currently running (non-terminal) tasks. May be empty; entries are
    /// never partially filled.
    async fn list_running_tasks(&self) -> Result<Vec<TaskSnapshot>, VigilError>;

    /// One task by key, or `None` if the server does not know it.
    async fn get_task(&self, task: &TaskKey) -> Result<Option<TaskSnapshot>, VigilError>;

    /// Active alarms. May be empty.
    async fn list_active_alarms(&self) -> Result<Vec<AlarmSnapshot>, VigilError>;
}
