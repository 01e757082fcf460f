//! Crate error taxonomy.

use thiserror::Error;

/// Failures the core recovers from locally.
///
/// Not-found is deliberately absent: a task key the server no longer knows
/// is a normal outcome (`TaskSource::get_task` returns `None`) that each
/// caller handles with its own policy, not an error.
#[derive(Debug, Error)]
pub enum VigilError {
    /// The remote management source could not be reached (network or auth).
    /// Retried naturally on the next tick or the next user command; no
    /// state is mutated on this path.
    #[error("remote source unavailable: {0}")]
    RemoteUnavailable(String),

    /// The subscription store failed an operation.
    #[error("subscription store unavailable: {0}")]
    StorageUnavailable(String),

    /// A notification could not be delivered. The caller must not treat the
    /// subscription as resolved.
    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),
}
